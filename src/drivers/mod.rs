//! Built-in driver implementations.
//!
//! Each module here mirrors one `examples/original_source/drivers/*.py`
//! file: a per-driver config struct with `#[serde(deny_unknown_fields)]`,
//! a `Driver` impl, and a `register(registry)` function the binary calls
//! once at startup (the Rust equivalent of the Python modules'
//! import-time `register("name", Config, DriverCls)` call — explicit
//! instead of relying on module import order).

pub mod discord;
pub mod webhook;

/// Registers every built-in driver. Call once before loading config.
pub fn register_builtin_drivers(registry: &crate::registry::DriverRegistry) -> anyhow::Result<()> {
    webhook::register(registry)?;
    discord::register(registry)?;
    Ok(())
}
