//! Structured logging configuration for bridgecore.
//!
//! Uses `tracing` with `tracing-subscriber` for configurable log levels and
//! structured output, with every emitted line passed through a masking
//! writer that redacts configured secrets before they reach a terminal or
//! log file.
//!
//! ## Environment Variables
//!
//! - `BRIDGECORE_LOG` or `RUST_LOG`: Set log level (e.g. `debug`,
//!   `bridgecore=debug,warn`)
//! - `BRIDGECORE_LOG_FORMAT`: Set output format (`pretty`, `compact`, `json`)

use std::io::{self, Write};
use std::sync::Arc;

use tracing_subscriber::{
    fmt::{self, MakeWriter},
    prelude::*,
    EnvFilter,
};

use crate::sensitive::SensitiveIndex;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl LogFormat {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "compact" => Self::Compact,
            _ => Self::Pretty,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub filter: String,
    pub format: LogFormat,
    pub with_file: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "bridgecore=info,warn".to_string(),
            format: LogFormat::Pretty,
            with_file: false,
        }
    }
}

impl LogConfig {
    pub fn from_env() -> Self {
        let filter = std::env::var("BRIDGECORE_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| "bridgecore=info,warn".to_string());

        let format = std::env::var("BRIDGECORE_LOG_FORMAT")
            .map(|s| LogFormat::from_str(&s))
            .unwrap_or_default();

        Self {
            filter,
            format,
            ..Default::default()
        }
    }
}

/// A writer that redacts every configured secret from the byte stream
/// before forwarding it to stdout.
///
/// Mirrors the original Python `MaskingFilter`, which rewrote
/// `record.msg` in place before formatting; here the redaction happens
/// after formatting (on the rendered line) so it applies uniformly
/// regardless of `LogFormat`.
#[derive(Clone)]
struct MaskingWriter {
    sensitive: Arc<SensitiveIndex>,
}

impl Write for MaskingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let len = buf.len();
        if self.sensitive.is_empty() {
            io::stdout().write_all(buf)?;
            return Ok(len);
        }
        let text = String::from_utf8_lossy(buf);
        let masked = self.sensitive.mask(&text);
        io::stdout().write_all(masked.as_bytes())?;
        Ok(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }
}

#[derive(Clone)]
struct MaskingMakeWriter {
    sensitive: Arc<SensitiveIndex>,
}

impl<'a> MakeWriter<'a> for MaskingMakeWriter {
    type Writer = MaskingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MaskingWriter {
            sensitive: self.sensitive.clone(),
        }
    }
}

/// Initialize the global tracing subscriber with secret masking.
///
/// `sensitive` may be an empty index at first-call time (e.g. logging is
/// initialized before config is loaded); swap in a populated index by
/// calling `init` again only once — subsequent calls after the first are a
/// no-op by `tracing`'s own global-default rule, so callers should load
/// config before calling `init`.
pub fn init(config: LogConfig, sensitive: Arc<SensitiveIndex>) {
    let env_filter =
        EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("bridgecore=info,warn"));
    let writer = MaskingMakeWriter { sensitive };

    match config.format {
        LogFormat::Json => {
            let subscriber = tracing_subscriber::registry().with(env_filter).with(
                fmt::layer()
                    .json()
                    .with_file(config.with_file)
                    .with_line_number(config.with_file)
                    .with_writer(writer),
            );
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
        LogFormat::Compact => {
            let subscriber = tracing_subscriber::registry().with(env_filter).with(
                fmt::layer()
                    .compact()
                    .with_file(config.with_file)
                    .with_line_number(config.with_file)
                    .with_writer(writer),
            );
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
        LogFormat::Pretty => {
            let subscriber = tracing_subscriber::registry().with(env_filter).with(
                fmt::layer()
                    .pretty()
                    .with_file(config.with_file)
                    .with_line_number(config.with_file)
                    .with_writer(writer),
            );
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
    }
}

/// Install a panic hook that logs the panic via `tracing::error!` before
/// the default hook runs, the closest Rust analogue of the original's
/// global `sys.excepthook` for uncaught exceptions.
pub fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!(panic = %info, "unhandled panic");
        default_hook(info);
    }));
}
