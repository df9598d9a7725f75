//! Write-path saga (spec §4.4).
//!
//! Every write — create, update, delete, enrich — goes through the same
//! state machine:
//!
//! ```text
//! INIT -> VALIDATED -> ROUTED -> HEAD_LOCKED -> TRANSFORMED -> OBJECT_WRITTEN -> COMMITTED
//!                                                                  \
//!                                                                   -> COMPENSATING -> FAILED
//! ```
//!
//! `COMPENSATING` only runs when the object-store write succeeded but the
//! document-store commit (the final CAS of the head plus the new version
//! row) did not: the externalized blobs just written are deleted so no
//! orphaned object-store data survives a failed write. If the commit
//! failure looks transient, the *original* request (before externalization
//! or merge) is durably queued on the fallback queue so a later retry
//! redoes the whole pipeline from scratch rather than replaying
//! partially-transformed state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::externalizer::Externalizer;
use crate::id::OpaqueId;
use crate::merger::deep_merge;
use crate::model::{FallbackOp, FallbackOpKind, Head, Item, ItemVersion, LineageRef, PayloadSystem, SystemEnvelope, Timestamp};
use crate::object_trait::ObjectStore;
use crate::router::{Router, RoutingContext};
use crate::store_trait::DocumentStore;

/// Observable states of the write-path saga, surfaced only through
/// `tracing` spans/events; callers interact with [`WritePath::execute`],
/// not with this enum directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaState {
    Init,
    Validated,
    Routed,
    HeadLocked,
    Transformed,
    ObjectWritten,
    Committed,
    Compensating,
    Failed,
}

/// A write request before routing, validation, or any transformation has
/// been applied. Also the shape persisted into the fallback queue, so a
/// retry can re-run the entire saga unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WriteOp {
    Create {
        collection: String,
        item_id: Option<OpaqueId>,
        payload: Value,
        actor: Option<String>,
        reason: Option<String>,
        parent: Option<LineageRef>,
        origin: Option<LineageRef>,
    },
    Update {
        collection: String,
        item_id: OpaqueId,
        expected_ov: u64,
        payload: Value,
    },
    Delete {
        collection: String,
        item_id: OpaqueId,
        expected_ov: u64,
    },
    /// Deep-merges `patch` into the current payload (spec's `enrich` /
    /// `smartInsert` operations), bypassing the CAS check on `ov` since the
    /// merge itself is commutative with concurrent enrich calls.
    Enrich {
        collection: String,
        item_id: OpaqueId,
        patch: Value,
    },
}

impl WriteOp {
    pub fn collection(&self) -> &str {
        match self {
            WriteOp::Create { collection, .. } => collection,
            WriteOp::Update { collection, .. } => collection,
            WriteOp::Delete { collection, .. } => collection,
            WriteOp::Enrich { collection, .. } => collection,
        }
    }

    fn fallback_kind(&self) -> FallbackOpKind {
        match self {
            WriteOp::Create { .. } => FallbackOpKind::Create,
            WriteOp::Update { .. } => FallbackOpKind::Update,
            WriteOp::Delete { .. } => FallbackOpKind::Delete,
            WriteOp::Enrich { .. } => FallbackOpKind::Enrich,
        }
    }
}

/// Resolves a backend id (from [`Router`]) to the concrete adapter pair
/// that serves it. Implemented by the facade crate, which owns the set of
/// configured backends; `chronos-core` only needs this narrow seam.
pub trait BackendResolver: Send + Sync {
    fn resolve(&self, backend_id: &str) -> Option<(Arc<dyn DocumentStore>, Arc<dyn ObjectStore>)>;
}

pub struct WritePath<'a> {
    router: &'a Router,
    backends: &'a dyn BackendResolver,
    config: &'a Config,
}

impl<'a> WritePath<'a> {
    pub fn new(router: &'a Router, backends: &'a dyn BackendResolver, config: &'a Config) -> Self {
        Self { router, backends, config }
    }

    pub async fn execute(&self, op: WriteOp, ctx: RoutingContext, now: Timestamp) -> Result<Item> {
        let mut state = SagaState::Init;
        tracing::debug!(collection = op.collection(), ?state, "saga started");

        validate(&op)?;
        state = SagaState::Validated;
        tracing::debug!(collection = op.collection(), ?state, "saga validated");

        let backend_id = self.router.resolve(&ctx, |_| true)?;
        let (doc_store, object_store) = self
            .backends
            .resolve(&backend_id)
            .ok_or_else(|| Error::ConfigRefMissing(format!("no adapter registered for backend '{backend_id}'")))?;
        state = SagaState::Routed;
        tracing::debug!(collection = op.collection(), backend = %backend_id, ?state, "saga routed");

        let existing_head = self.load_head(&op, doc_store.as_ref()).await?;
        state = SagaState::HeadLocked;
        tracing::debug!(collection = op.collection(), ?state, "saga head locked");

        let (item_id, new_payload, is_delete, actor, reason) = self.transform(&op, existing_head.as_ref(), doc_store.as_ref(), now).await?;
        state = SagaState::Transformed;
        tracing::debug!(collection = op.collection(), item_id = %item_id, ?state, "saga transformed");

        let policy = self.config.policy_for(op.collection());
        let externalizer = Externalizer::new(object_store.as_ref());
        let (stored_payload, _blobs) = externalizer.externalize(op.collection(), item_id, &new_payload, &policy).await?;
        state = SagaState::ObjectWritten;
        tracing::debug!(collection = op.collection(), item_id = %item_id, ?state, "saga object written");

        match self
            .commit(&op, item_id, existing_head, stored_payload.clone(), is_delete, actor, reason, doc_store.as_ref(), now)
            .await
        {
            Ok(item) => {
                state = SagaState::Committed;
                tracing::debug!(collection = op.collection(), item_id = %item_id, ?state, "saga committed");
                Ok(item)
            }
            Err(err) => {
                state = SagaState::Compensating;
                tracing::warn!(collection = op.collection(), item_id = %item_id, ?state, error = %err, "saga compensating after commit failure");
                self.compensate(op.collection(), item_id, &_blobs, object_store.as_ref()).await;

                if err.is_retryable() {
                    let fallback = FallbackOp::new(op.collection(), item_id, op.fallback_kind(), serde_json::to_value(&op).unwrap_or(Value::Null), now);
                    doc_store.enqueue_fallback(fallback).await?;
                    state = SagaState::Failed;
                    tracing::warn!(collection = op.collection(), item_id = %item_id, ?state, "saga queued for retry");
                    return Err(Error::Queued(format!("write to {} queued for retry: {err}", op.collection())));
                }

                state = SagaState::Failed;
                tracing::error!(collection = op.collection(), item_id = %item_id, ?state, error = %err, "saga failed permanently");
                Err(err)
            }
        }
    }

    async fn load_head(&self, op: &WriteOp, doc_store: &dyn DocumentStore) -> Result<Option<Head>> {
        match op {
            WriteOp::Create { collection, item_id, .. } => {
                if let Some(id) = item_id {
                    doc_store.get_head(collection, *id).await
                } else {
                    Ok(None)
                }
            }
            WriteOp::Update { collection, item_id, .. }
            | WriteOp::Delete { collection, item_id, .. }
            | WriteOp::Enrich { collection, item_id, .. } => doc_store.get_head(collection, *item_id).await,
        }
    }

    /// Builds the payload a commit will persist, stamping/carrying forward
    /// the `_system` envelope invariant I8 requires (§4.4 step 4, 7a-d).
    /// Returns `(item_id, stamped_payload, is_delete, actor, reason)`.
    async fn transform(
        &self,
        op: &WriteOp,
        existing_head: Option<&Head>,
        doc_store: &dyn DocumentStore,
        now: Timestamp,
    ) -> Result<(OpaqueId, Value, bool, Option<String>, Option<String>)> {
        match op {
            WriteOp::Create {
                collection,
                item_id,
                payload,
                actor,
                reason,
                parent,
                origin,
            } => {
                let id = item_id.unwrap_or_else(OpaqueId::generate);
                if existing_head.is_some() {
                    return Err(Error::ValidationError(format!("item {id} already exists in {collection}")));
                }
                let mut stamped = payload.clone();
                let system = PayloadSystem::fresh(now, parent.as_ref(), origin.as_ref());
                PayloadSystem::inject(&mut stamped, &system);
                Ok((id, stamped, false, actor.clone(), reason.clone()))
            }
            WriteOp::Update {
                collection,
                item_id,
                expected_ov,
                payload,
            } => {
                let head = existing_head.ok_or_else(|| Error::not_found(collection.clone(), item_id.to_string()))?;
                if head.ov != *expected_ov {
                    return Err(Error::OptimisticLock {
                        collection: collection.clone(),
                        id: item_id.to_string(),
                        expected: *expected_ov,
                        actual: head.ov,
                    });
                }
                let prior = doc_store
                    .get_version(collection, head.current_version_id)
                    .await?
                    .and_then(|v| PayloadSystem::extract(&v.payload));
                let mut stamped = payload.clone();
                let system = PayloadSystem::carry_forward(prior, now, false);
                PayloadSystem::inject(&mut stamped, &system);
                Ok((*item_id, stamped, false, None, None))
            }
            WriteOp::Delete {
                collection,
                item_id,
                expected_ov,
            } => {
                let head = existing_head.ok_or_else(|| Error::not_found(collection.clone(), item_id.to_string()))?;
                if head.ov != *expected_ov {
                    return Err(Error::OptimisticLock {
                        collection: collection.clone(),
                        id: item_id.to_string(),
                        expected: *expected_ov,
                        actual: head.ov,
                    });
                }
                let mut current = doc_store
                    .get_version(collection, head.current_version_id)
                    .await?
                    .map(|v| v.payload)
                    .unwrap_or(Value::Null);
                let prior = PayloadSystem::extract(&current);
                let system = PayloadSystem::carry_forward(prior, now, true);
                PayloadSystem::inject(&mut current, &system);
                Ok((*item_id, current, true, None, None))
            }
            WriteOp::Enrich { collection, item_id, patch } => {
                let head = existing_head.ok_or_else(|| Error::not_found(collection.clone(), item_id.to_string()))?;
                let current = doc_store
                    .get_version(collection, head.current_version_id)
                    .await?
                    .map(|v| v.payload)
                    .unwrap_or(Value::Null);
                let prior = PayloadSystem::extract(&current);
                let mut merged = deep_merge(&current, patch);
                let system = PayloadSystem::carry_forward(prior, now, false);
                PayloadSystem::inject(&mut merged, &system);
                Ok((*item_id, merged, false, None, None))
            }
        }
    }

    async fn commit(
        &self,
        op: &WriteOp,
        item_id: OpaqueId,
        existing_head: Option<Head>,
        payload: Value,
        is_delete: bool,
        actor: Option<String>,
        reason: Option<String>,
        doc_store: &dyn DocumentStore,
        now: Timestamp,
    ) -> Result<Item> {
        let collection = op.collection();
        let cv = doc_store.next_cv(collection).await?;
        let expected_ov = existing_head.as_ref().map(|h| h.ov).unwrap_or(0);
        // The first version of an item is ov=0; every subsequent write bumps
        // the existing head's ov by one. A bare `expected_ov + 1` would be
        // wrong for the create case, where there is no existing head to bump.
        let new_ov = match &existing_head {
            Some(head) => head.ov + 1,
            None => 0,
        };
        let version_id = OpaqueId::generate();

        let hash = content_hash(&payload);
        let version = ItemVersion {
            id: version_id,
            item_id,
            collection: collection.to_string(),
            ov: new_ov,
            payload: payload.clone(),
            hash,
            created_at: now,
            deleted: is_delete,
            actor,
            reason,
        };
        doc_store.put_version(version).await?;

        let created_at = existing_head.as_ref().map(|h| h.updated_at).unwrap_or(now);
        let new_head = Head {
            collection: collection.to_string(),
            id: item_id,
            ov: new_ov,
            cv,
            current_version_id: version_id,
            deleted: is_delete,
            updated_at: now,
        };
        doc_store.cas_head(collection, expected_ov, new_head).await?;

        Ok(Item {
            id: item_id,
            collection: collection.to_string(),
            payload: PayloadSystem::strip(payload),
            system: SystemEnvelope {
                ov: new_ov,
                cv,
                created_at,
                updated_at: now,
                deleted: is_delete,
            },
        })
    }

    async fn compensate(&self, collection: &str, item_id: OpaqueId, blobs: &[crate::model::ExternalizedBlob], object_store: &dyn ObjectStore) {
        for blob in blobs {
            if let Err(err) = object_store.del(&blob.object_key).await {
                tracing::error!(collection, item_id = %item_id, object_key = %blob.object_key, error = %err, "failed to roll back externalized blob");
            }
        }
    }
}

fn validate(op: &WriteOp) -> Result<()> {
    if op.collection().is_empty() {
        return Err(Error::ValidationError("collection name must not be empty".into()));
    }
    match op {
        WriteOp::Create { payload, .. } | WriteOp::Update { payload, .. } => {
            if !payload.is_object() {
                return Err(Error::ValidationError("payload must be a JSON object".into()));
            }
        }
        WriteOp::Enrich { patch, .. } => {
            if !patch.is_object() {
                return Err(Error::ValidationError("enrich patch must be a JSON object".into()));
            }
        }
        WriteOp::Delete { .. } => {}
    }
    Ok(())
}

fn content_hash(payload: &Value) -> String {
    let canonical = canonicalize(payload);
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex_encode(&hasher.finalize())
}

/// Recursively rebuild a `Value` with object keys in sorted order so the
/// hash is independent of the original field insertion order.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: Vec<_> = map.iter().collect();
            sorted.sort_by_key(|(k, _)| k.clone());
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k.clone(), canonicalize(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, RouteEntry};
    use crate::router::RoutingStrategy;
    use crate::testutil::{InMemoryDocumentStore, InMemoryObjectStore};
    use serde_json::json;
    use std::sync::Arc;

    struct SingleBackend {
        doc_store: Arc<dyn DocumentStore>,
        object_store: Arc<dyn ObjectStore>,
    }

    impl BackendResolver for SingleBackend {
        fn resolve(&self, backend_id: &str) -> Option<(Arc<dyn DocumentStore>, Arc<dyn ObjectStore>)> {
            if backend_id == "primary" {
                Some((self.doc_store.clone(), self.object_store.clone()))
            } else {
                None
            }
        }
    }

    fn harness() -> (Config, Router, SingleBackend) {
        let mut config = Config::default();
        config.routes.push(RouteEntry {
            tenant: None,
            domain: None,
            collection: Some("users".into()),
            backends: vec!["primary".into()],
        });
        let router = Router::new(config.clone(), RoutingStrategy::Tiered);
        let backends = SingleBackend {
            doc_store: Arc::new(InMemoryDocumentStore::new()),
            object_store: Arc::new(InMemoryObjectStore::new()),
        };
        (config, router, backends)
    }

    #[tokio::test]
    async fn create_then_update_then_delete_round_trip() {
        let (config, router, backends) = harness();
        let write_path = WritePath::new(&router, &backends, &config);
        let ctx = RoutingContext::new("users");

        let created = write_path
            .execute(
                WriteOp::Create {
                    collection: "users".into(),
                    item_id: None,
                    payload: json!({"name": "Alice"}),
                    actor: None,
                    reason: None,
                    parent: None,
                    origin: None,
                },
                ctx.clone(),
                1000,
            )
            .await
            .unwrap();
        assert_eq!(created.system.ov, 0);
        assert_eq!(created.system.cv, 1);

        let updated = write_path
            .execute(
                WriteOp::Update {
                    collection: "users".into(),
                    item_id: created.id,
                    expected_ov: created.system.ov,
                    payload: json!({"name": "Alice Smith"}),
                },
                ctx.clone(),
                1001,
            )
            .await
            .unwrap();
        assert_eq!(updated.system.ov, 1);
        assert_eq!(updated.payload["name"], json!("Alice Smith"));

        let deleted = write_path
            .execute(
                WriteOp::Delete {
                    collection: "users".into(),
                    item_id: created.id,
                    expected_ov: updated.system.ov,
                },
                ctx,
                1002,
            )
            .await
            .unwrap();
        assert!(deleted.system.deleted);
        assert_eq!(deleted.system.ov, 2);
    }

    #[tokio::test]
    async fn stale_ov_on_update_is_rejected() {
        let (config, router, backends) = harness();
        let write_path = WritePath::new(&router, &backends, &config);
        let ctx = RoutingContext::new("users");

        let created = write_path
            .execute(
                WriteOp::Create {
                    collection: "users".into(),
                    item_id: None,
                    payload: json!({"name": "Alice"}),
                    actor: None,
                    reason: None,
                    parent: None,
                    origin: None,
                },
                ctx.clone(),
                1000,
            )
            .await
            .unwrap();

        let result = write_path
            .execute(
                WriteOp::Update {
                    collection: "users".into(),
                    item_id: created.id,
                    expected_ov: created.system.ov + 5,
                    payload: json!({"name": "Nope"}),
                },
                ctx,
                1001,
            )
            .await;

        assert!(matches!(result, Err(Error::OptimisticLock { .. })));
    }

    #[tokio::test]
    async fn enrich_deep_merges_into_existing_payload() {
        let (config, router, backends) = harness();
        let write_path = WritePath::new(&router, &backends, &config);
        let ctx = RoutingContext::new("users");

        let created = write_path
            .execute(
                WriteOp::Create {
                    collection: "users".into(),
                    item_id: None,
                    payload: json!({"name": "Alice", "tags": [{"id": 1, "v": "a"}]}),
                    actor: None,
                    reason: None,
                    parent: None,
                    origin: None,
                },
                ctx.clone(),
                1000,
            )
            .await
            .unwrap();

        let enriched = write_path
            .execute(
                WriteOp::Enrich {
                    collection: "users".into(),
                    item_id: created.id,
                    patch: json!({"tags": [{"id": 2, "v": "b"}]}),
                },
                ctx,
                1001,
            )
            .await
            .unwrap();

        let tags = enriched.payload["tags"].as_array().unwrap();
        assert_eq!(tags.len(), 2);
    }

    #[tokio::test]
    async fn create_with_no_route_fails_before_any_io() {
        let config = Config::default();
        let router = Router::new(config.clone(), RoutingStrategy::Tiered);
        let backends = SingleBackend {
            doc_store: Arc::new(InMemoryDocumentStore::new()),
            object_store: Arc::new(InMemoryObjectStore::new()),
        };
        let write_path = WritePath::new(&router, &backends, &config);

        let result = write_path
            .execute(
                WriteOp::Create {
                    collection: "users".into(),
                    item_id: None,
                    payload: json!({"name": "Alice"}),
                    actor: None,
                    reason: None,
                    parent: None,
                    origin: None,
                },
                RoutingContext::new("users"),
                1000,
            )
            .await;
        assert!(matches!(result, Err(Error::RouteNotFound { .. })));
    }

    #[test]
    fn content_hash_is_stable_under_key_reordering() {
        let a = json!({"name": "Alice", "age": 30});
        let b = json!({"age": 30, "name": "Alice"});
        assert_eq!(content_hash(&a), content_hash(&b));
    }
}
