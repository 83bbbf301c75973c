//! Cross-platform message-ID correlation store (spec.md §6 "Persisted
//! state", §9 "Reply threading").
//!
//! Optional: lets a driver record, after sending, the correspondence
//! between a synthetic bridge id and each target's platform-native
//! message id, so a later reply on any platform can be traced back to the
//! others. The router itself never consults this store.
//!
//! Grounded on `examples/original_source/services/db.py`'s `MessageDB`,
//! rewritten onto `rusqlite` with a `Mutex<Connection>` in place of the
//! Python implementation's thread-local connection pool (SQLite
//! connections aren't `Sync`; a single shared connection behind a mutex is
//! the idiomatic `rusqlite` equivalent for a process with no more
//! concurrent writers than the router's own dispatch loop).

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};

pub struct MessageStore {
    conn: Mutex<Connection>,
}

/// Generates a fresh synthetic bridge id for a newly-seen inbound message.
/// A driver calls this once per inbound message it wants reply-threading
/// for, then `save_mapping`s the same id against every target it sends to
/// (spec.md §9 "Reply threading").
pub fn new_bridge_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl MessageStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS message_mappings (
                bridge_id TEXT,
                instance_id TEXT,
                channel_id TEXT,
                platform_msg_id TEXT,
                PRIMARY KEY (instance_id, platform_msg_id)
            );
            CREATE INDEX IF NOT EXISTS idx_bridge_id ON message_mappings (bridge_id);",
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-memory store, mainly for tests.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS message_mappings (
                bridge_id TEXT,
                instance_id TEXT,
                channel_id TEXT,
                platform_msg_id TEXT,
                PRIMARY KEY (instance_id, platform_msg_id)
            );
            CREATE INDEX IF NOT EXISTS idx_bridge_id ON message_mappings (bridge_id);",
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn save_mapping(&self, bridge_id: &str, instance_id: &str, channel_id: &str, platform_msg_id: &str) {
        let conn = self.conn.lock().expect("message store mutex poisoned");
        let result = conn.execute(
            "INSERT OR REPLACE INTO message_mappings (bridge_id, instance_id, channel_id, platform_msg_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![bridge_id, instance_id, channel_id, platform_msg_id],
        );
        if let Err(e) = result {
            tracing::error!(error = %e, "failed to save message mapping");
        }
    }

    pub fn bridge_id_for(&self, instance_id: &str, platform_msg_id: &str) -> Option<String> {
        let conn = self.conn.lock().expect("message store mutex poisoned");
        conn.query_row(
            "SELECT bridge_id FROM message_mappings WHERE instance_id = ?1 AND platform_msg_id = ?2",
            params![instance_id, platform_msg_id],
            |row| row.get(0),
        )
        .ok()
    }

    pub fn platform_msg_id_for(&self, bridge_id: &str, instance_id: &str, channel_id: Option<&str>) -> Option<String> {
        let conn = self.conn.lock().expect("message store mutex poisoned");
        match channel_id {
            Some(channel_id) => conn
                .query_row(
                    "SELECT platform_msg_id FROM message_mappings
                     WHERE bridge_id = ?1 AND instance_id = ?2 AND channel_id = ?3",
                    params![bridge_id, instance_id, channel_id],
                    |row| row.get(0),
                )
                .ok(),
            None => conn
                .query_row(
                    "SELECT platform_msg_id FROM message_mappings WHERE bridge_id = ?1 AND instance_id = ?2",
                    params![bridge_id, instance_id],
                    |row| row.get(0),
                )
                .ok(),
        }
    }
}
