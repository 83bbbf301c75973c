//! CLI conformance tests for the `convert` subcommand (spec.md §6, §8).
//!
//! Drives the actual `bridgecore` binary via `Command` rather than calling
//! `bridgecore::config` directly, so these exercise the process boundary:
//! argument parsing, exit codes, and stderr on failure.

use std::path::Path;
use std::process::Command;

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_bridgecore")
}

fn write(path: &Path, contents: &str) {
    std::fs::write(path, contents).unwrap();
}

#[test]
fn convert_json_to_yaml_succeeds_and_preserves_content() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("config.json");
    let dst = dir.path().join("config.yaml");
    write(&src, r#"{"webhook": {"main": {"url": "https://example.com/hook"}}}"#);

    let output = Command::new(bin())
        .args(["convert", src.to_str().unwrap(), dst.to_str().unwrap()])
        .output()
        .expect("failed to run bridgecore");

    assert_eq!(output.status.code(), Some(0));
    assert!(dst.is_file());
    let yaml = std::fs::read_to_string(&dst).unwrap();
    assert!(yaml.contains("url"));
    assert!(yaml.contains("example.com/hook"));
}

#[test]
fn convert_round_trip_json_yaml_json_preserves_values() {
    let dir = tempfile::tempdir().unwrap();
    let json_path = dir.path().join("config.json");
    let yaml_path = dir.path().join("config.yaml");
    let json2_path = dir.path().join("config2.json");
    write(&json_path, r#"{"discord": {"main": {"webhook_url": "https://hooks.example/abc", "max_file_size": 1000}}}"#);

    let status = |args: &[&str]| Command::new(bin()).args(args).status().unwrap().code().unwrap();

    assert_eq!(status(&["convert", json_path.to_str().unwrap(), yaml_path.to_str().unwrap()]), 0);
    assert_eq!(status(&["convert", yaml_path.to_str().unwrap(), json2_path.to_str().unwrap()]), 0);

    let original: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    let roundtripped: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&json2_path).unwrap()).unwrap();
    assert_eq!(original, roundtripped);
}

#[test]
fn convert_missing_source_file_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("nope.json");
    let dst = dir.path().join("out.yaml");

    let output = Command::new(bin())
        .args(["convert", src.to_str().unwrap(), dst.to_str().unwrap()])
        .output()
        .expect("failed to run bridgecore");

    assert_eq!(output.status.code(), Some(1));
    assert!(!dst.exists());
}

#[test]
fn convert_malformed_source_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("config.json");
    let dst = dir.path().join("config.yaml");
    write(&src, "{ this is not valid json");

    let output = Command::new(bin())
        .args(["convert", src.to_str().unwrap(), dst.to_str().unwrap()])
        .output()
        .expect("failed to run bridgecore");

    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn convert_destination_format_follows_extension_not_source() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("config.yaml");
    let dst = dir.path().join("config.toml");
    write(&src, "webhook:\n  main:\n    url: https://example.com/hook\n");

    let status = Command::new(bin())
        .args(["convert", src.to_str().unwrap(), dst.to_str().unwrap()])
        .status()
        .unwrap();

    assert!(status.success());
    let toml_text = std::fs::read_to_string(&dst).unwrap();
    assert!(toml_text.contains("url"));
}

#[test]
fn help_output_names_both_subcommands() {
    let output = Command::new(bin()).arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("convert"));
    assert!(stdout.contains("run"));
}
