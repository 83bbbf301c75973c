//! Driver supervisor (spec.md §4.5).
//!
//! Spawns one task per configured driver instance, named
//! `"<platform>/<instance_id>"`, and waits for all of them. A driver task
//! that returns an error is logged and otherwise ignored — the supervisor
//! never auto-restarts it (spec.md §4.1 failure policy). Cancellation
//! propagates to every driver via a shared `CancellationToken`.
//!
//! Grounded on `examples/original_source/main.py`'s
//! `asyncio.gather(*driver_tasks, return_exceptions=True)` loop, adapted
//! onto the teacher's named-task-handle bookkeeping
//! (`crates/rustyclaw-core/src/gateway/concurrent.rs`'s `ActiveTasks`).

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::driver::Driver;
use crate::error::BridgeError;
use crate::router::Router;

struct Instance {
    name: String,
    handle: JoinHandle<anyhow::Result<()>>,
}

/// Owns the set of spawned driver tasks for one process lifetime.
pub struct Supervisor {
    router: Arc<Router>,
    cancel: CancellationToken,
    instances: Vec<Instance>,
}

impl Supervisor {
    pub fn new(router: Arc<Router>) -> Self {
        Self {
            router,
            cancel: CancellationToken::new(),
            instances: Vec::new(),
        }
    }

    /// Spawns `driver.start(...)` as a named task. The task name is
    /// `"<platform>/<instance_id>"`, used only for logging.
    pub fn spawn(&mut self, mut driver: Box<dyn Driver>) {
        let name = format!("{}/{}", driver.platform(), driver.instance_id());
        let router = self.router.clone();
        let cancel = self.cancel.clone();
        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            let result = driver.start(router, cancel).await;
            if let Err(e) = &result {
                let err = BridgeError::DriverCrash(task_name.clone(), anyhow::anyhow!(e.to_string()));
                tracing::error!(task = %task_name, error = %err, "driver exited with error");
            }
            result
        });
        tracing::info!(task = %name, "registered driver");
        self.instances.push(Instance { name, handle });
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Signals cancellation to every spawned driver. Does not itself wait
    /// for them to finish — call `join_all` afterward for a best-effort
    /// drain.
    pub fn cancel_all(&self) {
        self.cancel.cancel();
    }

    /// Awaits every spawned task to completion (or cancellation), logging
    /// any that panicked outright (distinct from returning an `Err`, which
    /// `spawn`'s wrapper already logs).
    pub async fn join_all(self) {
        for instance in self.instances {
            match instance.handle.await {
                Ok(_) => {}
                Err(join_err) => {
                    tracing::error!(task = %instance.name, error = %join_err, "driver task panicked");
                }
            }
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
