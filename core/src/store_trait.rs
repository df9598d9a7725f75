//! The `DocumentStore` adapter contract (spec §6.1).
//!
//! Implemented outside this crate (see the `chronos-postgres` crate) so the
//! write path, read path, fallback queue and analytics layer stay storage
//! agnostic. Every method is `async` because every method does IO; nothing
//! in this trait performs merge logic, routing or validation — that stays
//! in `chronos-core` above the trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::id::OpaqueId;
use crate::model::{CollectionCounter, CollectionName, CollectionVersion, FallbackOp, Head, ItemVersion, Timestamp, Version};

/// A simple equality/presence filter over a document's JSON payload, used
/// by `query_latest`. Kept intentionally minimal: the spec's Non-goals
/// exclude a general query language.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilter {
    pub equals: Vec<(String, serde_json::Value)>,
    pub limit: Option<usize>,
    /// When set, tombstoned heads are returned alongside active ones
    /// instead of being filtered out — P8's "strict superset" behavior, and
    /// a prerequisite for resolving as-of candidates past a delete.
    pub include_deleted: bool,
    /// As-of timestamp (spec §4.3 "As-of (`at=t`)"). When set, `ReadPath::query`
    /// resolves each matched item's version at `at <= t` instead of its
    /// current head, independent of `query_latest`'s own filtering.
    pub at: Option<crate::model::Timestamp>,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch the current head for an item, if it exists (deleted or not).
    async fn get_head(&self, collection: &str, id: OpaqueId) -> Result<Option<Head>>;

    /// Atomically replace the head for `id` iff its current `ov` equals
    /// `expected_ov`. Returns `Error::OptimisticLock` on mismatch and
    /// `Error::NotFound` if the head does not exist and `expected_ov` is
    /// not `0`.
    async fn cas_head(&self, collection: &str, expected_ov: Version, new_head: Head) -> Result<()>;

    /// Insert a new immutable version row.
    async fn put_version(&self, version: ItemVersion) -> Result<()>;

    /// Fetch a specific version by id.
    async fn get_version(&self, collection: &str, version_id: OpaqueId) -> Result<Option<ItemVersion>>;

    /// Fetch the version of `id` that was current at `as_of` (time travel).
    async fn get_version_at(&self, collection: &str, id: OpaqueId, as_of: Timestamp) -> Result<Option<ItemVersion>>;

    /// List all versions of an item, newest first.
    async fn list_versions(&self, collection: &str, id: OpaqueId) -> Result<Vec<ItemVersion>>;

    /// Delete all but the `keep_latest` most recent versions of an item.
    /// Returns the number of rows removed. Used by retention (§4.9).
    async fn prune_versions(&self, collection: &str, id: OpaqueId, keep_latest: u32) -> Result<u64>;

    /// Fetch heads in a collection matching `filter`. Tombstoned heads are
    /// excluded unless `filter.include_deleted` is set.
    async fn query_latest(&self, collection: &str, filter: &QueryFilter) -> Result<Vec<Head>>;

    /// Atomically increment and return the collection's `cv`.
    async fn next_cv(&self, collection: &str) -> Result<CollectionVersion>;

    /// Current `cv` for a collection without incrementing it.
    async fn get_counter(&self, collection: &str) -> Result<CollectionCounter>;

    /// Persist a write that could not be committed, for later retry.
    async fn enqueue_fallback(&self, op: FallbackOp) -> Result<()>;

    /// Fetch fallback ops whose `next_attempt_at <= now`, oldest first,
    /// capped at `limit`.
    async fn list_ready_fallback(&self, now: Timestamp, limit: usize) -> Result<Vec<FallbackOp>>;

    /// Persist a retried fallback op's updated attempt count/backoff.
    async fn update_fallback(&self, op: FallbackOp) -> Result<()>;

    /// Remove a fallback op after it succeeds or is dead-lettered.
    async fn delete_fallback(&self, id: OpaqueId) -> Result<()>;

    /// Record a delta against a collection's analytics totals.
    async fn record_analytics_delta(&self, collection: &str, delta: crate::model::CounterTotals) -> Result<()>;

    /// Current analytics totals for a collection.
    async fn get_analytics(&self, collection: &str) -> Result<crate::model::CounterTotals>;
}
