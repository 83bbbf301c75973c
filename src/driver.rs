//! Driver lifecycle contract (spec.md §4.1).
//!
//! Every platform adapter implements `Driver`. The supervisor owns the
//! `start` loop; the router owns the registered `SendFn`. The two only
//! meet through `Router::register_sender`, never directly.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::message::{Attachment, ChannelValue};
use crate::router::Router;

/// Outbound send callback registered by a driver once it is ready to
/// accept dispatches. May be invoked concurrently from many `on_message`
/// calls; implementations must be safe under concurrent invocation
/// (spec.md §4.1).
///
/// Returns the platform-native message id on success, if the platform
/// provides one (used for reply-threading lookups via the message store).
pub type SendFn = Arc<
    dyn Fn(
            BTreeMap<String, ChannelValue>,
            String,
            Vec<Attachment>,
            serde_json::Map<String, serde_json::Value>,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<String>>> + Send>>
        + Send
        + Sync,
>;

/// Per-platform adapter contract. A `Driver` owns its own connection state;
/// the router never reaches into it directly.
#[async_trait]
pub trait Driver: Send {
    /// Driver kind tag, e.g. `"webhook"`. Matches a registry entry name.
    fn platform(&self) -> &str;

    /// Configured instance identifier, matches a key under this platform
    /// in the config file.
    fn instance_id(&self) -> &str;

    /// Connects, authenticates, and runs the receive loop until `cancel`
    /// fires. Must call `router.register_sender` once ready to accept
    /// outbound dispatches. Must retry transient failures internally with
    /// backoff and return only on unrecoverable error or cancellation.
    async fn start(&mut self, router: Arc<Router>, cancel: CancellationToken) -> anyhow::Result<()>;
}

/// Constructs a configured `Driver` instance from its per-driver config
/// block. Stored in the registry alongside the schema used to validate
/// that block.
pub type DriverConstructor =
    Arc<dyn Fn(String, serde_json::Value) -> anyhow::Result<Box<dyn Driver>> + Send + Sync>;
