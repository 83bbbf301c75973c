//! Integration tests for config discovery + per-driver schema validation
//! against the real built-in driver registry (spec.md §6, §7, §8 property 8).

use bridgecore::config;
use bridgecore::drivers::register_builtin_drivers;
use bridgecore::registry::DriverRegistry;

fn registry() -> DriverRegistry {
    let reg = DriverRegistry::new();
    register_builtin_drivers(&reg).unwrap();
    reg
}

#[test]
fn unknown_field_on_a_builtin_driver_is_a_hard_validation_error() {
    let reg = registry();
    let cfg = serde_json::json!({
        "webhook": {
            "main": { "url": "https://example.com/hook", "totally_not_a_field": true }
        }
    });
    let err = config::schema::validate_top_level(&cfg, &reg).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("webhook.main"), "error should name the platform.instance_id path: {message}");
}

#[test]
fn unknown_top_level_platform_is_ignored_not_fatal() {
    let reg = registry();
    let cfg = serde_json::json!({
        "some_future_platform_not_yet_registered": { "main": { "anything": true } }
    });
    assert!(config::schema::validate_top_level(&cfg, &reg).is_ok());
}

#[test]
fn declared_webhook_and_discord_configs_both_validate() {
    let reg = registry();
    let cfg = serde_json::json!({
        "webhook": { "a": { "url": "https://example.com/hook" } },
        "discord": { "b": { "webhook_url": "https://discord.example/hook" } }
    });
    assert!(config::schema::validate_top_level(&cfg, &reg).is_ok());
}

#[test]
fn find_config_discovers_in_documented_priority_order() {
    let dir = tempfile::tempdir().unwrap();
    // Only a .toml present: must still be found.
    std::fs::write(dir.path().join("config.toml"), "[webhook.a]\nurl = \"https://example.com\"\n").unwrap();
    let found = config::find_config(dir.path()).unwrap();
    assert_eq!(found.file_name().unwrap(), "config.toml");

    // Adding config.yml must now take priority over config.toml.
    std::fs::write(dir.path().join("config.yml"), "webhook:\n  a:\n    url: https://example.com\n").unwrap();
    let found = config::find_config(dir.path()).unwrap();
    assert_eq!(found.file_name().unwrap(), "config.yml");
}

#[test]
fn data_path_env_var_overrides_default() {
    // SAFETY: test runs single-threaded with respect to this var via serial
    // access pattern (no other test in this binary reads BRIDGE_DATA_PATH).
    unsafe {
        std::env::set_var("BRIDGE_DATA_PATH", "/tmp/bridgecore-test-data-dir");
    }
    assert_eq!(config::data_path(), std::path::PathBuf::from("/tmp/bridgecore-test-data-dir"));
    unsafe {
        std::env::remove_var("BRIDGE_DATA_PATH");
    }
}
