//! Driver registry (spec.md §4.2).
//!
//! A process-wide table of `(platform_name, schema validator, constructor)`
//! populated by each driver module's self-registration. Grounded on
//! `examples/original_source/drivers/registry.py`, generalized from its
//! `dict[str, tuple[type, type]]` to an explicit `Arc<Mutex<_>>` object per
//! SPEC_FULL.md §9 (the router/registry are passed as objects here, not
//! hidden process globals).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::driver::DriverConstructor;

/// Validates a per-driver config block before construction. Returning
/// `Err` for any field the driver doesn't recognize satisfies spec.md
/// §6's "unknown per-driver fields are a hard validation error".
pub type SchemaValidator = Arc<dyn Fn(&serde_json::Value) -> anyhow::Result<()> + Send + Sync>;

struct Entry {
    schema: SchemaValidator,
    ctor: DriverConstructor,
}

/// Read-after-init table mapping platform name to its schema validator and
/// constructor. Registration is expected to happen once at process
/// startup, before any config is validated.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a driver under `name`. Double-registration under the same
    /// name is an error (spec.md §4.2 invariant: exactly one entry per
    /// platform name).
    pub fn register(&self, name: &str, schema: SchemaValidator, ctor: DriverConstructor) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().expect("registry mutex poisoned");
        if entries.contains_key(name) {
            anyhow::bail!("driver '{name}' is already registered");
        }
        entries.insert(name.to_string(), Entry { schema, ctor });
        Ok(())
    }

    /// Validates `config` against `name`'s schema, if registered.
    pub fn validate(&self, name: &str, config: &serde_json::Value) -> anyhow::Result<()> {
        let entries = self.entries.lock().expect("registry mutex poisoned");
        match entries.get(name) {
            Some(entry) => (entry.schema)(config),
            None => anyhow::bail!("no driver registered for platform '{name}'"),
        }
    }

    /// Builds a driver instance for `name` from its validated config.
    pub fn construct(
        &self,
        name: &str,
        instance_id: String,
        config: serde_json::Value,
    ) -> anyhow::Result<Box<dyn crate::driver::Driver>> {
        let entries = self.entries.lock().expect("registry mutex poisoned");
        match entries.get(name) {
            Some(entry) => (entry.ctor)(instance_id, config),
            None => anyhow::bail!("no driver registered for platform '{name}'"),
        }
    }

    /// Snapshot of every registered platform name.
    pub fn names(&self) -> Vec<String> {
        let entries = self.entries.lock().expect("registry mutex poisoned");
        entries.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        let entries = self.entries.lock().expect("registry mutex poisoned");
        entries.contains_key(name)
    }
}
