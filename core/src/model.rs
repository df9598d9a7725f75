//! Core data model: items, heads, versions and the supporting entities used
//! by the write path, fallback queue and analytics layer.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::OpaqueId;

pub type CollectionName = String;
pub type TenantId = String;
pub type DomainId = String;
pub type Timestamp = i64;

/// Optimistic version counter on a [`Head`]. Bumped on every successful
/// write to the item; compared-and-swapped to detect concurrent writers.
pub type Version = u64;

/// Collection-monotonic counter. Every write to any item in a collection
/// bumps the collection's `cv`, independent of whether versioning is
/// enabled for that collection (Open Question b, see DESIGN.md).
pub type CollectionVersion = u64;

/// Metadata every stored document carries under its `_system` key. Kept as
/// a first-class type (rather than folded loose fields into the payload)
/// so the write path can populate and validate it the same way regardless
/// of what the caller's payload contains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemEnvelope {
    pub ov: Version,
    pub cv: CollectionVersion,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted: bool,
}

impl SystemEnvelope {
    pub fn new(now: Timestamp) -> Self {
        Self {
            ov: 0,
            cv: 0,
            created_at: now,
            updated_at: now,
            deleted: false,
        }
    }
}

/// The row that owns an item's identity and current optimistic-concurrency
/// state. One `Head` per item per collection, CAS'd on `ov`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Head {
    pub collection: CollectionName,
    pub id: OpaqueId,
    pub ov: Version,
    pub cv: CollectionVersion,
    pub current_version_id: OpaqueId,
    pub deleted: bool,
    pub updated_at: Timestamp,
}

impl Head {
    pub fn new(collection: impl Into<CollectionName>, id: OpaqueId, version_id: OpaqueId, now: Timestamp) -> Self {
        Self {
            collection: collection.into(),
            id,
            ov: 0,
            cv: 0,
            current_version_id: version_id,
            deleted: false,
            updated_at: now,
        }
    }
}

/// An immutable, content-addressed snapshot of an item's payload at a given
/// `ov`. Versions accumulate over the item's lifetime unless retention (§4.9)
/// prunes them; the head always points at the newest one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemVersion {
    pub id: OpaqueId,
    pub item_id: OpaqueId,
    pub collection: CollectionName,
    pub ov: Version,
    pub payload: Value,
    pub hash: String,
    pub created_at: Timestamp,
    pub deleted: bool,
    /// Caller-supplied identity of whoever requested this write, if any.
    pub actor: Option<String>,
    /// Caller-supplied free-text reason for this write, if any.
    pub reason: Option<String>,
}

/// Whether a stored payload's out-of-band write has been durably
/// acknowledged by the document store yet. Every payload the commit step
/// writes observes `Synced` — a reader can never see `NewNotSynched`,
/// because a failed commit compensates (deletes) the write rather than
/// leaving a half-written payload behind. The variant still exists because
/// invariant I8 names it as part of the envelope's contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncState {
    NewNotSynched,
    Synced,
}

/// A `{id, collection}` pointer to another record, used by the `_system`
/// envelope's `parentId`/`parentCollection` and `originId`/`originCollection`
/// pairs. `system` names the external system a record originated from and
/// is only meaningful for `origin`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageRef {
    pub id: String,
    pub collection: CollectionName,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

impl LineageRef {
    pub fn new(id: impl Into<String>, collection: impl Into<CollectionName>) -> Self {
        Self {
            id: id.into(),
            collection: collection.into(),
            system: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// The internal envelope invariant I8 requires every stored payload to
/// carry under its `_system` key. Distinct from [`SystemEnvelope`]: that one
/// is the read-side view callers get back as `Item.system`; this one is the
/// bytes actually hashed and persisted, and is never surfaced to callers
/// directly (spec §4.2: `_meta` "never [carries] the `_system` internals").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadSystem {
    pub inserted_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub function_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_collection: Option<CollectionName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_collection: Option<CollectionName>,
    pub state: SyncState,
}

pub const SYSTEM_KEY: &str = "_system";

impl PayloadSystem {
    pub fn fresh(now: Timestamp, parent: Option<&LineageRef>, origin: Option<&LineageRef>) -> Self {
        Self {
            inserted_at: now,
            updated_at: now,
            deleted: false,
            deleted_at: None,
            function_ids: Vec::new(),
            parent_id: parent.map(|p| p.id.clone()),
            parent_collection: parent.map(|p| p.collection.clone()),
            origin_id: origin.map(|o| o.id.clone()),
            origin_collection: origin.map(|o| o.collection.clone()),
            state: SyncState::Synced,
        }
    }

    /// Carries lineage and `insertedAt` forward from a prior envelope (or
    /// starts fresh if this is the first version this crate has seen for
    /// the item, e.g. a doc written before this envelope existed).
    pub fn carry_forward(prior: Option<PayloadSystem>, now: Timestamp, deleted: bool) -> Self {
        match prior {
            Some(p) => Self {
                inserted_at: p.inserted_at,
                updated_at: now,
                deleted,
                deleted_at: if deleted { Some(p.deleted_at.unwrap_or(now)) } else { None },
                function_ids: p.function_ids,
                parent_id: p.parent_id,
                parent_collection: p.parent_collection,
                origin_id: p.origin_id,
                origin_collection: p.origin_collection,
                state: SyncState::Synced,
            },
            None => Self {
                inserted_at: now,
                updated_at: now,
                deleted,
                deleted_at: if deleted { Some(now) } else { None },
                function_ids: Vec::new(),
                parent_id: None,
                parent_collection: None,
                origin_id: None,
                origin_collection: None,
                state: SyncState::Synced,
            },
        }
    }

    /// Stamp `system` into `payload`'s `_system` key, overwriting whatever
    /// was there before. No-op if `payload` isn't a JSON object.
    pub fn inject(payload: &mut Value, system: &PayloadSystem) {
        if let Some(obj) = payload.as_object_mut() {
            obj.insert(SYSTEM_KEY.to_string(), serde_json::to_value(system).unwrap_or(Value::Null));
        }
    }

    /// Read the `_system` envelope back out of a stored payload, if present
    /// and well-formed.
    pub fn extract(payload: &Value) -> Option<PayloadSystem> {
        payload.get(SYSTEM_KEY).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Remove the `_system` key from a payload before handing it back to a
    /// caller — it is internal bookkeeping, never part of the public
    /// `ItemView` payload or `_meta` projection (spec §4.2).
    pub fn strip(mut payload: Value) -> Value {
        if let Some(obj) = payload.as_object_mut() {
            obj.remove(SYSTEM_KEY);
        }
        payload
    }
}

/// The fully materialized view of an item a caller reads: current payload
/// plus the envelope describing its version state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: OpaqueId,
    pub collection: CollectionName,
    pub payload: Value,
    pub system: SystemEnvelope,
}

impl Item {
    pub fn is_active(&self) -> bool {
        !self.system.deleted
    }
}

/// Per-collection write counter, tracked independently from any one item's
/// `ov` so the router and analytics layer can observe write volume without
/// scanning heads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionCounter {
    pub collection: CollectionName,
    pub cv: CollectionVersion,
}

/// Reference to a base64 field that has been externalized out of the
/// document payload and into object storage, keeping doc-store rows small.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalizedBlob {
    /// Dot-path of the field inside the original payload, e.g. `avatar.data`.
    pub field_path: String,
    pub object_key: String,
    pub content_type: Option<String>,
    pub size_bytes: u64,
}

/// The marker a payload's externalized field is replaced with in the
/// doc-store row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadObjectRef {
    #[serde(rename = "$externalized")]
    pub externalized: bool,
    pub object_key: String,
    pub content_type: Option<String>,
    pub size_bytes: u64,
}

/// Rolling totals an [`crate::analytics::Analytics`] instance keeps per
/// collection: write counts, deletes, and unique values observed for
/// configured tracked fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterTotals {
    pub creates: u64,
    pub updates: u64,
    pub deletes: u64,
    pub rule_matches: HashMap<String, u64>,
    /// Canonical JSON string per distinct value observed, keyed by rule
    /// name, for rules with `track_unique` set.
    pub unique_values: HashMap<String, HashSet<String>>,
}

impl CounterTotals {
    /// Merge another delta into this one, summing counts and unioning
    /// unique-value sets. Used by adapters to fold a write's delta into
    /// the collection's running totals.
    pub fn merge_delta(&mut self, delta: CounterTotals) {
        self.creates += delta.creates;
        self.updates += delta.updates;
        self.deletes += delta.deletes;
        for (rule, count) in delta.rule_matches {
            *self.rule_matches.entry(rule).or_insert(0) += count;
        }
        for (rule, values) in delta.unique_values {
            self.unique_values.entry(rule).or_default().extend(values);
        }
    }

    pub fn unique_count(&self, rule: &str) -> usize {
        self.unique_values.get(rule).map(|s| s.len()).unwrap_or(0)
    }
}

/// Kind of write-path operation a queued [`FallbackOp`] represents, used to
/// replay it against the same saga once the backend recovers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackOpKind {
    Create,
    Update,
    Delete,
    Enrich,
}

/// A write that could not be committed and was persisted for later retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackOp {
    pub id: OpaqueId,
    pub collection: CollectionName,
    pub item_id: OpaqueId,
    pub kind: FallbackOpKind,
    pub payload: Value,
    pub attempts: u32,
    pub next_attempt_at: Timestamp,
    pub created_at: Timestamp,
    pub last_error: Option<String>,
}

impl FallbackOp {
    pub fn new(
        collection: impl Into<CollectionName>,
        item_id: OpaqueId,
        kind: FallbackOpKind,
        payload: Value,
        now: Timestamp,
    ) -> Self {
        Self {
            id: OpaqueId::generate(),
            collection: collection.into(),
            item_id,
            kind,
            payload,
            attempts: 0,
            next_attempt_at: now,
            created_at: now,
            last_error: None,
        }
    }
}
