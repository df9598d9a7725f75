//! Configuration contract (spec §6.4).
//!
//! `Config` is a pure value: this crate never discovers or resolves it from
//! files or environment variables (that resolution is an explicit
//! Non-goal). Callers assemble one and pass it to
//! [`crate::bound_ops::BoundOps`] / the facade crate's `Xronox` builder.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{CollectionName, DomainId, TenantId};

/// Identifies a concrete backend pairing (one document store + one object
/// store) a route can resolve to.
pub type BackendId = String;

/// A single routing table entry: which backend(s) serve a tenant/domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteEntry {
    pub tenant: Option<TenantId>,
    pub domain: Option<DomainId>,
    pub collection: Option<CollectionName>,
    pub backends: Vec<BackendId>,
}

/// Per-collection versioning and retention policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionPolicy {
    /// Whether prior [`crate::model::ItemVersion`] rows are retained. When
    /// `false`, `cv` still advances on every write (Open Question b).
    pub versioning_enabled: bool,
    /// Maximum number of historical versions kept per item, `None` for
    /// unbounded.
    pub max_versions: Option<u32>,
    /// Base64 fields at these dot-paths are externalized into object
    /// storage instead of being stored inline.
    pub externalize_fields: Vec<String>,
    /// Size threshold (bytes) above which an externalizable field is
    /// actually moved out, even if not explicitly named.
    pub externalize_threshold_bytes: Option<u64>,
    /// Dot-paths (into the transformed payload) flattened into `metaIndexed`
    /// for doc-store indexing, queries, and `getItem`'s `_meta` projection
    /// (spec §4.5).
    pub indexed_props: Vec<String>,
}

impl Default for CollectionPolicy {
    fn default() -> Self {
        Self {
            versioning_enabled: true,
            max_versions: None,
            externalize_fields: Vec::new(),
            externalize_threshold_bytes: Some(256 * 1024),
            indexed_props: Vec::new(),
        }
    }
}

/// Fallback/retry tuning (spec §4.7).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
    pub batch_size: usize,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 250,
            max_delay_ms: 30_000,
            max_attempts: 8,
            batch_size: 50,
        }
    }
}

/// Retention sweep tuning (spec §4.9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicy {
    pub sweep_interval_secs: u64,
    pub tombstone_ttl_secs: Option<u64>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 300,
            tombstone_ttl_secs: None,
        }
    }
}

/// An analytics rule: increments a named counter when a predicate over the
/// document payload matches (spec §4.8).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsRule {
    pub name: String,
    pub collection: CollectionName,
    /// Dot-path into the payload whose presence/value is checked.
    pub field_path: String,
    /// If set, the rule only matches when the field equals this JSON value;
    /// otherwise it matches whenever the field is present.
    pub equals: Option<serde_json::Value>,
    /// When set, the field's distinct values are tracked (cardinality),
    /// not just a match count.
    pub track_unique: bool,
}

/// The full, pure configuration value the engine is constructed from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub routes: Vec<RouteEntry>,
    pub collection_policies: HashMap<CollectionName, CollectionPolicy>,
    pub fallback: FallbackPolicy,
    pub retention: RetentionPolicy,
    pub analytics_rules: Vec<AnalyticsRule>,
}

impl Config {
    pub fn policy_for(&self, collection: &str) -> CollectionPolicy {
        self.collection_policies
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}
