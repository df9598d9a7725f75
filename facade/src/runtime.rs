//! Background task runner: drives the fallback worker and the retention
//! sweeper on their own intervals, shut down cooperatively via a
//! `tokio::sync::watch` cancellation channel and `tokio::select!`, the
//! pattern the example pool's automations server uses to poll ready work
//! until signaled to stop.

use std::sync::Arc;
use std::time::Duration;

use chronos_core::{FallbackOp, FallbackWorker, ReplayOutcome, RetentionSweep};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::Xronox;

pub struct Runtime {
    fallback_handle: JoinHandle<()>,
    retention_handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl Runtime {
    /// Spawn the fallback worker and retention sweeper for every registered
    /// backend, ticking every `fallback_interval` / the per-collection
    /// `retention.sweep_interval_secs` respectively.
    pub fn spawn(xronox: Arc<Xronox>, fallback_interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let fallback_handle = tokio::spawn(run_fallback_loop(xronox.clone(), fallback_interval, shutdown_rx.clone()));
        let retention_handle = tokio::spawn(run_retention_loop(xronox, shutdown_rx));

        Self {
            fallback_handle,
            retention_handle,
            shutdown_tx,
        }
    }

    /// Signal both background tasks to stop and wait for them to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.fallback_handle.await;
        let _ = self.retention_handle.await;
    }
}

async fn run_fallback_loop(xronox: Arc<Xronox>, interval: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for (backend_id, store) in xronox.backends.document_stores() {
                    let policy = xronox.config.fallback.clone();
                    let now = now_ms();
                    let worker = FallbackWorker::new(store, policy, replay_via_runtime(xronox.clone()));
                    match worker.tick(now).await {
                        Ok(committed) => tracing::debug!(backend = %backend_id, committed, "fallback worker tick complete"),
                        Err(err) => tracing::warn!(backend = %backend_id, error = %err, "fallback worker tick failed"),
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::debug!("fallback worker loop shutting down");
                    break;
                }
            }
        }
    }
}

async fn run_retention_loop(xronox: Arc<Xronox>, mut shutdown_rx: watch::Receiver<bool>) {
    let interval = Duration::from_secs(xronox.config.retention.sweep_interval_secs.max(1));
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for (backend_id, store) in xronox.backends.document_stores() {
                    let sweep = RetentionSweep::new(store, xronox.config.clone());
                    for collection in xronox.tracked_collections() {
                        match sweep.sweep_collection(&collection, now_ms()).await {
                            Ok(report) => tracing::debug!(
                                backend = %backend_id,
                                collection = %collection,
                                versions_pruned = report.versions_pruned,
                                tombstones_purged = report.tombstones_purged,
                                "retention sweep complete"
                            ),
                            Err(err) => tracing::warn!(backend = %backend_id, collection = %collection, error = %err, "retention sweep failed"),
                        }
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::debug!("retention sweep loop shutting down");
                    break;
                }
            }
        }
    }
}

/// Bridges the fallback worker's synchronous replay callback to the async
/// write-path saga: `FallbackWorker::tick` calls `replay` without awaiting
/// it, so the saga call is driven to completion on a blocking thread via
/// `Handle::block_on`. Requires the multi-threaded tokio runtime.
fn replay_via_runtime(xronox: Arc<Xronox>) -> impl Fn(FallbackOp) -> ReplayOutcome + Send + Sync {
    move |op: FallbackOp| {
        let xronox = xronox.clone();
        let handle = tokio::runtime::Handle::current();
        tokio::task::block_in_place(|| handle.block_on(xronox.replay_fallback(op)))
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
