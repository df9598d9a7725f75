//! Fallback queue & worker (spec §4.7).
//!
//! A write that fails after the document-store transaction is durably
//! queued as a [`crate::model::FallbackOp`] rather than dropped. The
//! `Worker` drains ready ops on an interval, replaying each through a
//! caller-supplied closure (the write-path saga), backing off
//! exponentially between attempts on a per-op basis via the
//! `exponential-backoff` crate, and dead-lettering (logging + discarding)
//! ops that exceed `max_attempts`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use exponential_backoff::Backoff;

use crate::config::FallbackPolicy;
use crate::model::{CollectionName, FallbackOp, Timestamp};
use crate::store_trait::DocumentStore;

/// Compute the delay before the next attempt of a fallback op that has
/// already failed `attempts` times.
pub fn next_delay(attempts: u32, policy: &FallbackPolicy) -> Duration {
    let backoff = Backoff::new(
        u32::MAX,
        Duration::from_millis(policy.base_delay_ms),
        Some(Duration::from_millis(policy.max_delay_ms)),
    );
    backoff
        .next(attempts)
        .unwrap_or(Duration::from_millis(policy.max_delay_ms))
}

/// Group ready ops by collection and chunk each group to `batch_size`, so a
/// worker tick can replay several ops against the same collection's
/// backend without interleaving unrelated collections.
pub fn batch(ops: Vec<FallbackOp>, batch_size: usize) -> Vec<(CollectionName, Vec<FallbackOp>)> {
    let mut grouped: HashMap<CollectionName, Vec<FallbackOp>> = HashMap::new();
    for op in ops {
        grouped.entry(op.collection.clone()).or_default().push(op);
    }

    let mut batches = Vec::new();
    for (collection, mut ops) in grouped {
        ops.sort_by_key(|op| op.created_at);
        for chunk in ops.chunks(batch_size.max(1)) {
            batches.push((collection.clone(), chunk.to_vec()));
        }
    }
    batches
}

/// Outcome of replaying a single fallback op, reported by the caller's
/// replay closure.
pub enum ReplayOutcome {
    Committed,
    Failed(String),
}

/// Drains ready fallback ops from `store`, replaying each through
/// `replay`. Intended to be driven on an interval by the facade crate's
/// background task runner; exposed here as a single `tick` so tests (and
/// alternate schedulers) can call it directly without a timer.
pub struct Worker<R> {
    store: Arc<dyn DocumentStore>,
    policy: FallbackPolicy,
    replay: R,
}

impl<R> Worker<R>
where
    R: Fn(FallbackOp) -> ReplayOutcome + Send + Sync,
{
    pub fn new(store: Arc<dyn DocumentStore>, policy: FallbackPolicy, replay: R) -> Self {
        Self { store, policy, replay }
    }

    /// Run one drain cycle: fetch ready ops, replay them batch by batch,
    /// and persist the outcome of each. Returns the number of ops that
    /// committed successfully on this tick.
    pub async fn tick(&self, now: Timestamp) -> crate::error::Result<usize> {
        let ready = self.store.list_ready_fallback(now, self.policy.batch_size * 4).await?;
        let batches = batch(ready, self.policy.batch_size);

        let mut committed = 0;
        for (collection, ops) in batches {
            for op in ops {
                match (self.replay)(op.clone()) {
                    ReplayOutcome::Committed => {
                        tracing::debug!(collection = %collection, op_id = %op.id, "fallback op committed");
                        self.store.delete_fallback(op.id).await?;
                        committed += 1;
                    }
                    ReplayOutcome::Failed(reason) => {
                        self.handle_failure(op, reason, now).await?;
                    }
                }
            }
        }
        Ok(committed)
    }

    async fn handle_failure(&self, mut op: FallbackOp, reason: String, now: Timestamp) -> crate::error::Result<()> {
        op.attempts += 1;
        op.last_error = Some(reason.clone());

        if op.attempts >= self.policy.max_attempts {
            tracing::warn!(
                collection = %op.collection,
                op_id = %op.id,
                attempts = op.attempts,
                error = %reason,
                "fallback op exhausted retries, dead-lettering"
            );
            self.store.delete_fallback(op.id).await?;
            return Ok(());
        }

        let delay = next_delay(op.attempts, &self.policy);
        op.next_attempt_at = now + delay.as_millis() as i64;
        tracing::debug!(
            collection = %op.collection,
            op_id = %op.id,
            attempts = op.attempts,
            delay_ms = delay.as_millis(),
            "fallback op retry scheduled"
        );
        self.store.update_fallback(op).await
    }
}
