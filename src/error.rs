//! Error taxonomy for the bridge.
//!
//! `ConfigError` is matched on by config loading/validation call sites;
//! `BridgeError` names the non-fatal conditions spec.md §7 requires the
//! router and supervisor to log-and-continue on. Everything else flows
//! through `anyhow::Result` at call boundaries, matching how the rest of
//! the crate distinguishes "typed library error" from "opaque call-site
//! error".

use std::path::PathBuf;

/// Errors surfaced by configuration loading and validation.
///
/// Config errors are fatal at startup: the process refuses to run rather
/// than guess at a default for a malformed or unrecognized field.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("no config file found in {0} (tried config.json, config.yaml, config.yml, config.toml)")]
    NotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path} as {format}: {source}")]
    Parse {
        path: PathBuf,
        format: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("{path}: unknown field '{field}'")]
    UnknownField { path: String, field: String },

    #[error("{path}: {message}")]
    Invalid { path: String, message: String },

    #[error("rule references unknown instance_id '{0}'")]
    UnknownInstance(String),
}

/// Errors the bridge router and supervisor surface. Spec §7 requires that
/// none of these ever abort a fan-out or the process; `Router::on_message`
/// and `Supervisor::spawn` construct them only to log, never to propagate.
#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    #[error("no sender registered for instance '{0}'")]
    SenderNotRegistered(String),

    #[error("sensitive value leak blocked for target '{0}'")]
    SensitiveLeakBlocked(String),

    #[error("unknown template placeholder: {0}")]
    TemplateKey(String),

    #[error("driver '{0}' crashed: {1}")]
    DriverCrash(String, #[source] anyhow::Error),
}
