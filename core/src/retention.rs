//! Retention sweep (spec §4.9).
//!
//! Runs on an interval (driven by the facade crate's background task
//! runner) and does two independent things per collection: prunes old
//! [`crate::model::ItemVersion`] rows down to each item's configured
//! `max_versions`, and hard-deletes heads that have been tombstoned
//! (`deleted = true`) for longer than `tombstone_ttl_secs`.

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::model::{CollectionName, Timestamp};
use crate::store_trait::{DocumentStore, QueryFilter};

pub struct RetentionSweep {
    store: Arc<dyn DocumentStore>,
    config: Config,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub versions_pruned: u64,
    pub tombstones_purged: u64,
}

impl RetentionSweep {
    pub fn new(store: Arc<dyn DocumentStore>, config: Config) -> Self {
        Self { store, config }
    }

    /// Sweep a single collection: prune excess versions on every active
    /// item per its policy, then purge any tombstone past its TTL.
    pub async fn sweep_collection(&self, collection: &CollectionName, now: Timestamp) -> Result<SweepReport> {
        let policy = self.config.policy_for(collection);
        let mut report = SweepReport::default();

        let heads = self.store.query_latest(collection, &QueryFilter::default()).await?;
        for head in &heads {
            if let Some(keep) = policy.max_versions {
                report.versions_pruned += self.store.prune_versions(collection, head.id, keep).await?;
            }
        }

        if let Some(ttl) = self.config.retention.tombstone_ttl_secs {
            for head in heads.iter().filter(|h| h.deleted) {
                let age_secs = (now - head.updated_at).max(0) / 1000;
                if age_secs as u64 >= ttl {
                    self.store.prune_versions(collection, head.id, 0).await?;
                    report.tombstones_purged += 1;
                }
            }
        }

        Ok(report)
    }
}
