//! Read path (spec §4.3): point reads by version or time, latest/as-of
//! queries, and the tiered tenant/domain/generic fetch-and-merge used when
//! a collection's configuration spans more than one routing layer.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::id::OpaqueId;
use crate::merger::deep_merge;
use crate::model::{Item, PayloadSystem, SystemEnvelope, Timestamp, Version};
use crate::router::{Router, RoutingContext};
use crate::saga::BackendResolver;
use crate::store_trait::{DocumentStore, QueryFilter};

/// Which revision of an item to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSelector {
    Latest,
    AtVersion(Version),
    AtTime(Timestamp),
}

pub struct ReadPath<'a> {
    router: &'a Router,
    backends: &'a dyn BackendResolver,
}

impl<'a> ReadPath<'a> {
    pub fn new(router: &'a Router, backends: &'a dyn BackendResolver) -> Self {
        Self { router, backends }
    }

    fn resolve(&self, ctx: &RoutingContext) -> Result<Arc<dyn DocumentStore>> {
        let backend_id = self.router.resolve(ctx, |_| true)?;
        let (doc_store, _) = self
            .backends
            .resolve(&backend_id)
            .ok_or_else(|| Error::ConfigRefMissing(format!("no adapter registered for backend '{backend_id}'")))?;
        Ok(doc_store)
    }

    /// Single-context point read at the given selector. Unless
    /// `include_deleted` is set, a logically deleted item (invariant I5)
    /// is reported as not found regardless of selector.
    pub async fn get_item(
        &self,
        collection: &str,
        item_id: OpaqueId,
        selector: ReadSelector,
        ctx: &RoutingContext,
        include_deleted: bool,
    ) -> Result<Item> {
        let doc_store = self.resolve(ctx)?;
        self.get_item_from(doc_store.as_ref(), collection, item_id, selector, include_deleted).await
    }

    async fn get_item_from(
        &self,
        doc_store: &dyn DocumentStore,
        collection: &str,
        item_id: OpaqueId,
        selector: ReadSelector,
        include_deleted: bool,
    ) -> Result<Item> {
        let mut item = match selector {
            ReadSelector::Latest => {
                let head = doc_store
                    .get_head(collection, item_id)
                    .await?
                    .ok_or_else(|| Error::not_found(collection, item_id.to_string()))?;
                if head.deleted && !include_deleted {
                    return Err(Error::not_found(collection, item_id.to_string()));
                }
                let version = doc_store
                    .get_version(collection, head.current_version_id)
                    .await?
                    .ok_or_else(|| Error::not_found(collection, item_id.to_string()))?;
                Item {
                    id: item_id,
                    collection: collection.to_string(),
                    payload: version.payload,
                    system: SystemEnvelope {
                        ov: head.ov,
                        cv: head.cv,
                        created_at: version.created_at,
                        updated_at: head.updated_at,
                        deleted: head.deleted,
                    },
                }
            }
            ReadSelector::AtVersion(ov) => {
                let versions = doc_store.list_versions(collection, item_id).await?;
                let version = versions
                    .into_iter()
                    .find(|v| v.ov == ov)
                    .ok_or_else(|| Error::not_found(collection, item_id.to_string()))?;
                if version.deleted && !include_deleted {
                    return Err(Error::not_found(collection, item_id.to_string()));
                }
                version_to_item(item_id, collection, version)
            }
            ReadSelector::AtTime(as_of) => {
                let version = doc_store
                    .get_version_at(collection, item_id, as_of)
                    .await?
                    .ok_or_else(|| Error::not_found(collection, item_id.to_string()))?;
                if version.deleted && !include_deleted {
                    return Err(Error::not_found(collection, item_id.to_string()));
                }
                version_to_item(item_id, collection, version)
            }
        };
        item.payload = PayloadSystem::strip(item.payload);
        Ok(item)
    }

    /// Latest-matching-filter query within a single routing context,
    /// ordered deterministically by item id so repeated calls against an
    /// unchanged dataset return results in the same order. When
    /// `filter.at` is set, each matched item is resolved to its version as
    /// of that timestamp (spec §4.3 "as-of", invariant P8) instead of its
    /// current head.
    pub async fn query(&self, collection: &str, filter: &QueryFilter, ctx: &RoutingContext) -> Result<Vec<Item>> {
        let doc_store = self.resolve(ctx)?;

        if let Some(at) = filter.at {
            // `query_latest` only filters on the *current* payload, so a
            // candidate whose current head is deleted might still have had
            // a matching, non-deleted version at `at`. Gather with
            // tombstones included and let the as-of resolution below decide.
            let as_of_filter = QueryFilter { include_deleted: true, ..filter.clone() };
            let mut heads = doc_store.query_latest(collection, &as_of_filter).await?;
            heads.sort_by_key(|h| h.id);

            let mut items = Vec::with_capacity(heads.len());
            for head in heads {
                let Some(version) = doc_store.get_version_at(collection, head.id, at).await? else {
                    continue;
                };
                if version.deleted && !filter.include_deleted {
                    continue;
                }
                let mut item = version_to_item(head.id, collection, version);
                item.payload = PayloadSystem::strip(item.payload);
                items.push(item);
            }
            return Ok(items);
        }

        let mut heads = doc_store.query_latest(collection, filter).await?;
        heads.sort_by_key(|h| h.id);

        let mut items = Vec::with_capacity(heads.len());
        for head in heads {
            if let Some(version) = doc_store.get_version(collection, head.current_version_id).await? {
                items.push(Item {
                    id: head.id,
                    collection: collection.to_string(),
                    payload: PayloadSystem::strip(version.payload),
                    system: SystemEnvelope {
                        ov: head.ov,
                        cv: head.cv,
                        created_at: version.created_at,
                        updated_at: head.updated_at,
                        deleted: head.deleted,
                    },
                });
            }
        }
        Ok(items)
    }

    /// Tiered fetch: reads the item from the tenant-scoped context, the
    /// domain-scoped context, and the generic (unscoped) context, then
    /// deep-merges generic <- domain <- tenant (tenant fields win on
    /// conflict, array fields union by identity key). A tier that has no
    /// route configured or no matching item is silently skipped rather
    /// than failing the whole read — the item only needs to exist in one
    /// tier.
    pub async fn get_item_tiered(&self, collection: &str, item_id: OpaqueId, tenant: Option<&str>, domain: Option<&str>) -> Result<Item> {
        let mut layers = Vec::new();

        let generic_ctx = RoutingContext::new(collection);
        if let Ok(item) = self.get_item(collection, item_id, ReadSelector::Latest, &generic_ctx, false).await {
            layers.push(item);
        }

        if let Some(domain) = domain {
            let domain_ctx = RoutingContext::new(collection).with_domain(domain);
            if let Ok(item) = self.get_item(collection, item_id, ReadSelector::Latest, &domain_ctx, false).await {
                layers.push(item);
            }
        }

        if let Some(tenant) = tenant {
            let mut tenant_ctx = RoutingContext::new(collection).with_tenant(tenant);
            if let Some(domain) = domain {
                tenant_ctx = tenant_ctx.with_domain(domain);
            }
            if let Ok(item) = self.get_item(collection, item_id, ReadSelector::Latest, &tenant_ctx, false).await {
                layers.push(item);
            }
        }

        let mut iter = layers.into_iter();
        let Some(mut merged) = iter.next() else {
            return Err(Error::not_found(collection, item_id.to_string()));
        };
        for layer in iter {
            merged.payload = deep_merge(&merged.payload, &layer.payload);
            merged.system = layer.system;
        }
        Ok(merged)
    }
}

/// Historical reads resolve an [`crate::model::ItemVersion`] row directly,
/// which carries `ov` but not the collection-wide `cv` at the time it was
/// written (only the current `Head` tracks that) — `cv` is reported as `0`
/// for any non-latest read.
fn version_to_item(item_id: OpaqueId, collection: &str, version: crate::model::ItemVersion) -> Item {
    Item {
        id: item_id,
        collection: collection.to_string(),
        payload: version.payload,
        system: SystemEnvelope {
            ov: version.ov,
            cv: 0,
            created_at: version.created_at,
            updated_at: version.created_at,
            deleted: version.deleted,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, RouteEntry};
    use crate::object_trait::ObjectStore;
    use crate::router::RoutingStrategy;
    use crate::saga::{WriteOp, WritePath};
    use crate::testutil::{InMemoryDocumentStore, InMemoryObjectStore};
    use serde_json::json;

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

    fn harness(collection: &str) -> (Config, Router, SingleBackend) {
        let mut config = Config::default();
        config.routes.push(RouteEntry {
            tenant: None,
            domain: None,
            collection: Some(collection.to_string()),
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
    async fn reads_latest_after_writes() {
        let (config, router, backends) = harness("users");
        let write_path = WritePath::new(&router, &backends, &config);
        let ctx = RoutingContext::new("users");

        let created = write_path
            .execute(
                WriteOp::Create { collection: "users".into(), item_id: None, payload: json!({"name": "Alice"}), actor: None, reason: None, parent: None, origin: None },
                ctx.clone(),
                1000,
            )
            .await
            .unwrap();

        let read_path = ReadPath::new(&router, &backends);
        let item = read_path.get_item("users", created.id, ReadSelector::Latest, &ctx, false).await.unwrap();
        assert_eq!(item.payload["name"], json!("Alice"));
        assert_eq!(item.system.ov, 0);
    }

    #[tokio::test]
    async fn reads_historical_version_by_ov() {
        let (config, router, backends) = harness("users");
        let write_path = WritePath::new(&router, &backends, &config);
        let ctx = RoutingContext::new("users");

        let created = write_path
            .execute(
                WriteOp::Create { collection: "users".into(), item_id: None, payload: json!({"name": "Alice"}), actor: None, reason: None, parent: None, origin: None },
                ctx.clone(),
                1000,
            )
            .await
            .unwrap();
        write_path
            .execute(
                WriteOp::Update { collection: "users".into(), item_id: created.id, expected_ov: created.system.ov, payload: json!({"name": "Alice V2"}) },
                ctx.clone(),
                1001,
            )
            .await
            .unwrap();

        let read_path = ReadPath::new(&router, &backends);
        let v1 = read_path.get_item("users", created.id, ReadSelector::AtVersion(1), &ctx, false).await.unwrap();
        assert_eq!(v1.payload["name"], json!("Alice"));
    }

    #[tokio::test]
    async fn reads_as_of_a_timestamp() {
        let (config, router, backends) = harness("users");
        let write_path = WritePath::new(&router, &backends, &config);
        let ctx = RoutingContext::new("users");

        let created = write_path
            .execute(
                WriteOp::Create { collection: "users".into(), item_id: None, payload: json!({"name": "Alice"}), actor: None, reason: None, parent: None, origin: None },
                ctx.clone(),
                1000,
            )
            .await
            .unwrap();
        write_path
            .execute(
                WriteOp::Update { collection: "users".into(), item_id: created.id, expected_ov: created.system.ov, payload: json!({"name": "Alice V2"}) },
                ctx.clone(),
                2000,
            )
            .await
            .unwrap();

        let read_path = ReadPath::new(&router, &backends);
        let as_of_early = read_path.get_item("users", created.id, ReadSelector::AtTime(1500), &ctx, false).await.unwrap();
        assert_eq!(as_of_early.payload["name"], json!("Alice"));

        let as_of_late = read_path.get_item("users", created.id, ReadSelector::AtTime(2500), &ctx, false).await.unwrap();
        assert_eq!(as_of_late.payload["name"], json!("Alice V2"));
    }

    #[tokio::test]
    async fn missing_item_is_not_found() {
        let (_config, router, backends) = harness("users");
        let read_path = ReadPath::new(&router, &backends);
        let result = read_path.get_item("users", OpaqueId::generate(), ReadSelector::Latest, &RoutingContext::new("users"), false).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn tiered_fetch_merges_generic_and_tenant_layers() {
        let mut config = Config::default();
        config.routes.push(RouteEntry {
            tenant: None,
            domain: None,
            collection: Some("profiles".into()),
            backends: vec!["primary".into()],
        });
        config.routes.push(RouteEntry {
            tenant: Some("acme".into()),
            domain: None,
            collection: Some("profiles".into()),
            backends: vec!["primary".into()],
        });
        let router = Router::new(config.clone(), RoutingStrategy::Tiered);
        let backends = SingleBackend {
            doc_store: Arc::new(InMemoryDocumentStore::new()),
            object_store: Arc::new(InMemoryObjectStore::new()),
        };
        let write_path = WritePath::new(&router, &backends, &config);

        let item_id = OpaqueId::generate();
        write_path
            .execute(
                WriteOp::Create { collection: "profiles".into(), item_id: Some(item_id), payload: json!({"theme": "light", "locale": "en"}), actor: None, reason: None, parent: None, origin: None },
                RoutingContext::new("profiles"),
                1000,
            )
            .await
            .unwrap();
        write_path
            .execute(
                WriteOp::Create { collection: "profiles".into(), item_id: Some(item_id), payload: json!({"theme": "dark"}), actor: None, reason: None, parent: None, origin: None },
                RoutingContext::new("profiles").with_tenant("acme"),
                1001,
            )
            .await
            .unwrap();

        let read_path = ReadPath::new(&router, &backends);
        let merged = read_path.get_item_tiered("profiles", item_id, Some("acme"), None).await.unwrap();
        assert_eq!(merged.payload["theme"], json!("dark"));
        assert_eq!(merged.payload["locale"], json!("en"));
    }

    #[tokio::test]
    async fn deleted_item_is_hidden_unless_include_deleted() {
        let (config, router, backends) = harness("users");
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
        write_path
            .execute(
                WriteOp::Delete { collection: "users".into(), item_id: created.id, expected_ov: created.system.ov },
                ctx.clone(),
                1001,
            )
            .await
            .unwrap();

        let read_path = ReadPath::new(&router, &backends);
        let hidden = read_path.get_item("users", created.id, ReadSelector::Latest, &ctx, false).await;
        assert!(matches!(hidden, Err(Error::NotFound { .. })));

        let visible = read_path.get_item("users", created.id, ReadSelector::Latest, &ctx, true).await.unwrap();
        assert!(visible.system.deleted);
        assert!(visible.payload.get("_system").is_none());
    }

    #[tokio::test]
    async fn as_of_query_resolves_versions_across_a_delete() {
        let (config, router, backends) = harness("users");
        let write_path = WritePath::new(&router, &backends, &config);
        let ctx = RoutingContext::new("users");

        let created = write_path
            .execute(
                WriteOp::Create {
                    collection: "users".into(),
                    item_id: None,
                    payload: json!({"name": "Alice", "status": "active"}),
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
        write_path
            .execute(
                WriteOp::Update {
                    collection: "users".into(),
                    item_id: created.id,
                    expected_ov: created.system.ov,
                    payload: json!({"name": "Alice", "status": "active"}),
                },
                ctx.clone(),
                1500,
            )
            .await
            .unwrap();
        let updated_ov = 1;
        write_path
            .execute(WriteOp::Delete { collection: "users".into(), item_id: created.id, expected_ov: updated_ov }, ctx.clone(), 2000)
            .await
            .unwrap();

        let read_path = ReadPath::new(&router, &backends);

        let before_delete = read_path.query("users", &QueryFilter { at: Some(1600), ..Default::default() }, &ctx).await.unwrap();
        assert_eq!(before_delete.len(), 1);
        assert_eq!(before_delete[0].payload["status"], json!("active"));

        let after_delete = read_path.query("users", &QueryFilter { at: Some(2500), ..Default::default() }, &ctx).await.unwrap();
        assert!(after_delete.is_empty());

        let after_delete_with_tombstones = read_path
            .query("users", &QueryFilter { at: Some(2500), include_deleted: true, ..Default::default() }, &ctx)
            .await
            .unwrap();
        assert_eq!(after_delete_with_tombstones.len(), 1);
        assert!(after_delete_with_tombstones[0].system.deleted);
    }
}
