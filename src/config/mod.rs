//! Multi-format config loading and conversion (spec.md §6).
//!
//! Grounded on `examples/original_source/services/config_io.py`'s
//! `find_config`/`load_config`/`save_config` trio, rewritten with one
//! `serde_json::Value` as the common in-memory representation so
//! `convert` round-trips between formats without a per-format struct.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::ConfigError;

const CONFIG_NAMES: &[&str] = &["config.json", "config.yaml", "config.yml", "config.toml"];

/// Probe `dir` for the first config file that exists, in the fixed order
/// `config.json, config.yaml, config.yml, config.toml`.
pub fn find_config(dir: &Path) -> Option<PathBuf> {
    CONFIG_NAMES.iter().map(|name| dir.join(name)).find(|p| p.is_file())
}

/// `BRIDGE_DATA_PATH`, defaulting to `./data` (spec.md §6).
pub fn data_path() -> PathBuf {
    std::env::var_os("BRIDGE_DATA_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./data"))
}

fn format_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).as_deref() {
        Some("yaml") | Some("yml") => "yaml",
        Some("toml") => "toml",
        _ => "json",
    }
}

/// Loads `path`, inferring the format from its extension.
pub fn load(path: &Path) -> Result<Value, ConfigError> {
    let format = format_for(path);
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    let parsed = match format {
        "yaml" => serde_yaml::from_str(&text).map_err(|e| anyhow::anyhow!(e)),
        "toml" => toml::from_str(&text).map_err(|e| anyhow::anyhow!(e)),
        _ => serde_json::from_str(&text).map_err(|e| anyhow::anyhow!(e)),
    };
    parsed.map_err(|source| ConfigError::Parse { path: path.to_path_buf(), format, source })
}

/// Saves `value` to `path`, inferring the format from its extension.
pub fn save(value: &Value, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    }
    let format = format_for(path);
    let text = match format {
        "yaml" => serde_yaml::to_string(value).map_err(|e| anyhow::anyhow!(e)),
        "toml" => toml::to_string_pretty(value).map_err(|e| anyhow::anyhow!(e)),
        _ => serde_json::to_string_pretty(value).map_err(|e| anyhow::anyhow!(e)),
    }
    .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), format, source })?;
    std::fs::write(path, text).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })
}

/// `convert <src> <dst>` (spec.md §6 CLI). Reads `src`, writes the parsed
/// value to `dst` in the format implied by `dst`'s extension.
pub fn convert(src: &Path, dst: &Path) -> Result<(), ConfigError> {
    let value = load(src)?;
    save(&value, dst)
}

/// Loads the top-level config from `data_dir`, per spec.md §6's discovery
/// order. Fails if no candidate file exists.
pub fn load_from_data_dir(data_dir: &Path) -> Result<(PathBuf, Value), ConfigError> {
    let path = find_config(data_dir).ok_or_else(|| ConfigError::NotFound(data_dir.to_path_buf()))?;
    let value = load(&path)?;
    Ok((path, value))
}

pub mod schema;
