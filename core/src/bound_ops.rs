//! `BoundOps` (spec §4.2): the single public contract callers use once bound
//! to a tenant/domain context, composing the [`Router`], [`WritePath`],
//! [`ReadPath`], [`crate::analytics`], and [`crate::merger`] machinery into
//! the operations a caller actually invokes — `create`, `update`, `delete`,
//! `enrich`, `smartInsert`, `getItem`, `query`, `restoreObject`,
//! `restoreCollection`, `insertWithEntities`, `getWithEntities`.

use serde_json::Value;

use crate::analytics::{self, WriteKind};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::id::OpaqueId;
use crate::model::{CollectionName, CollectionVersion, DomainId, Item, LineageRef, TenantId, Timestamp, Version};
use crate::read_path::{ReadPath, ReadSelector};
use crate::router::{Router, RoutingContext};
use crate::saga::{BackendResolver, WriteOp, WritePath};
use crate::store_trait::QueryFilter;

/// Tenant/domain scope a `BoundOps` is bound to. Individual calls still name
/// the collection they touch, since `insertWithEntities` fans out across
/// more than one.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub tenant: Option<TenantId>,
    pub domain: Option<DomainId>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant(mut self, tenant: impl Into<TenantId>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<DomainId>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    fn routing_context(&self, collection: &str) -> RoutingContext {
        let mut ctx = RoutingContext::new(collection);
        if let Some(tenant) = &self.tenant {
            ctx = ctx.with_tenant(tenant.clone());
        }
        if let Some(domain) = &self.domain {
            ctx = ctx.with_domain(domain.clone());
        }
        ctx
    }
}

/// A target version to restore an item (or, for `{at}`, a whole collection)
/// to. `restoreCollection`'s `{cv}` form (spec §4.2) is not offered here —
/// `cv` is a collection-wide counter, not a per-item version, so the caller
/// resolves it to the wall-clock time that `cv` was reached before calling
/// `restore_collection` (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreTarget {
    Ov(crate::model::Version),
    At(Timestamp),
}

pub struct SmartInsertOptions {
    pub unique_keys: Vec<String>,
}

pub struct SmartInsertResult {
    pub item: Item,
    pub created: bool,
}

pub struct EntityMapping {
    pub property: String,
    pub collection: CollectionName,
    pub key_property: String,
}

pub struct InsertWithEntitiesResult {
    pub main: Item,
    pub entities: Vec<(String, Item)>,
}

pub struct RestoreCollectionOutcome {
    pub item_id: OpaqueId,
    pub result: std::result::Result<Item, String>,
}

/// Provenance options for `create` (spec §4.2, invariant I8): who/why a
/// record was written and, for records created as part of a larger entity
/// graph, where it came from.
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub item_id: Option<OpaqueId>,
    pub actor: Option<String>,
    pub reason: Option<String>,
    pub parent: Option<LineageRef>,
    pub origin: Option<LineageRef>,
}

/// `getItem` options (spec §4.2): which revision to read and what comes
/// back alongside its payload.
#[derive(Debug, Clone, Default)]
pub struct GetItemOptions {
    pub ov: Option<Version>,
    pub at: Option<Timestamp>,
    pub include_deleted: bool,
    pub include_meta: bool,
    /// Dot-paths to keep; `None` returns the full payload.
    pub projection: Option<Vec<String>>,
    /// Substitute presigned URLs for externalized fields in the result.
    /// Generating the URL itself is the object-store adapter's job
    /// (`ObjectStore::presign_get`) — this flag only decides whether to
    /// call it (spec Non-goal: no URL-signing subsystem here).
    pub presign: bool,
}

impl GetItemOptions {
    fn selector(&self) -> ReadSelector {
        if let Some(at) = self.at {
            ReadSelector::AtTime(at)
        } else if let Some(ov) = self.ov {
            ReadSelector::AtVersion(ov)
        } else {
            ReadSelector::Latest
        }
    }
}

/// The `_meta` block `getItem` attaches when `includeMeta` is set. Never
/// carries the `_system` internals (spec §4.2).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMeta {
    pub ov: Version,
    pub cv: CollectionVersion,
    pub at: Timestamp,
    pub meta_indexed: std::collections::HashMap<String, Value>,
}

/// `getItem`'s result: the item plus its optional `_meta` projection.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemView {
    pub item: Item,
    pub meta: Option<ItemMeta>,
}

pub struct BoundOps<'a> {
    router: &'a Router,
    backends: &'a dyn BackendResolver,
    config: &'a Config,
    ctx: CallContext,
}

impl<'a> BoundOps<'a> {
    pub fn new(router: &'a Router, backends: &'a dyn BackendResolver, config: &'a Config, ctx: CallContext) -> Self {
        Self { router, backends, config, ctx }
    }

    fn write_path(&self) -> WritePath<'a> {
        WritePath::new(self.router, self.backends, self.config)
    }

    fn read_path(&self) -> ReadPath<'a> {
        ReadPath::new(self.router, self.backends)
    }

    async fn record_analytics(&self, collection: &str, kind: WriteKind, payload: &Value) -> Result<()> {
        let delta = analytics::observe(collection, kind, payload, &self.config.analytics_rules);
        let backend_id = self.router.resolve(&self.ctx.routing_context(collection), |_| true)?;
        let (doc_store, _) = self
            .backends
            .resolve(&backend_id)
            .ok_or_else(|| Error::ConfigRefMissing(format!("no adapter registered for backend '{backend_id}'")))?;
        doc_store.record_analytics_delta(collection, delta).await
    }

    pub async fn create(&self, collection: &str, payload: Value, now: Timestamp) -> Result<Item> {
        self.create_with_options(collection, payload, CreateOptions::default(), now).await
    }

    /// Like [`Self::create`] but exposes `actor`/`reason` bookkeeping and
    /// `parent`/`origin` lineage, persisted into the `_system` envelope
    /// (spec §4.2, invariant I8).
    pub async fn create_with_options(&self, collection: &str, payload: Value, opts: CreateOptions, now: Timestamp) -> Result<Item> {
        let ctx = self.ctx.routing_context(collection);
        let item = self
            .write_path()
            .execute(
                WriteOp::Create {
                    collection: collection.to_string(),
                    item_id: opts.item_id,
                    payload: payload.clone(),
                    actor: opts.actor,
                    reason: opts.reason,
                    parent: opts.parent,
                    origin: opts.origin,
                },
                ctx,
                now,
            )
            .await?;
        self.record_analytics(collection, WriteKind::Create, &payload).await?;
        Ok(item)
    }

    /// Top-level replace of the supplied keys: fields named in `patch`
    /// overwrite the previous value (nested objects included) wholesale;
    /// fields not named in `patch` are untouched. Distinct from `enrich`,
    /// which deep-merges recursively.
    pub async fn update(&self, collection: &str, item_id: OpaqueId, expected_ov: Option<crate::model::Version>, patch: Value, now: Timestamp) -> Result<Item> {
        let ctx = self.ctx.routing_context(collection);
        let current = self.read_path().get_item(collection, item_id, ReadSelector::Latest, &ctx, true).await?;
        let expected_ov = expected_ov.unwrap_or(current.system.ov);

        let mut merged = current.payload.clone();
        if let (Some(merged_obj), Some(patch_obj)) = (merged.as_object_mut(), patch.as_object()) {
            for (key, value) in patch_obj {
                merged_obj.insert(key.clone(), value.clone());
            }
        } else {
            merged = patch.clone();
        }

        let item = self
            .write_path()
            .execute(WriteOp::Update { collection: collection.to_string(), item_id, expected_ov, payload: merged.clone() }, ctx, now)
            .await?;
        self.record_analytics(collection, WriteKind::Update, &merged).await?;
        Ok(item)
    }

    pub async fn delete(&self, collection: &str, item_id: OpaqueId, expected_ov: Option<crate::model::Version>, now: Timestamp) -> Result<Item> {
        let ctx = self.ctx.routing_context(collection);
        let current = self.read_path().get_item(collection, item_id, ReadSelector::Latest, &ctx, true).await?;
        let expected_ov = expected_ov.unwrap_or(current.system.ov);

        let item = self
            .write_path()
            .execute(WriteOp::Delete { collection: collection.to_string(), item_id, expected_ov }, ctx, now)
            .await?;
        self.record_analytics(collection, WriteKind::Delete, &current.payload).await?;
        Ok(item)
    }

    /// Deep-merges `enrichment` into the item's current payload via the
    /// Merger (spec §4.6).
    pub async fn enrich(&self, collection: &str, item_id: OpaqueId, enrichment: Value, now: Timestamp) -> Result<Item> {
        let ctx = self.ctx.routing_context(collection);
        let item = self
            .write_path()
            .execute(WriteOp::Enrich { collection: collection.to_string(), item_id, patch: enrichment.clone() }, ctx, now)
            .await?;
        self.record_analytics(collection, WriteKind::Update, &item.payload).await?;
        Ok(item)
    }

    /// Looks up an existing item by `opts.unique_keys`; enriches it if
    /// found, creates a fresh one otherwise.
    pub async fn smart_insert(&self, collection: &str, data: Value, opts: SmartInsertOptions, now: Timestamp) -> Result<SmartInsertResult> {
        if opts.unique_keys.is_empty() {
            return Err(Error::validation("smartInsert requires at least one unique key"));
        }

        let Some(data_obj) = data.as_object() else {
            return Err(Error::validation("smartInsert payload must be a JSON object"));
        };

        let mut equals = Vec::with_capacity(opts.unique_keys.len());
        for key in &opts.unique_keys {
            let value = data_obj
                .get(key)
                .ok_or_else(|| Error::validation(format!("smartInsert data is missing unique key '{key}'")))?;
            equals.push((key.clone(), value.clone()));
        }

        let ctx = self.ctx.routing_context(collection);
        let backend_id = self.router.resolve(&ctx, |_| true)?;
        let (doc_store, _) = self
            .backends
            .resolve(&backend_id)
            .ok_or_else(|| Error::ConfigRefMissing(format!("no adapter registered for backend '{backend_id}'")))?;

        let filter = QueryFilter { equals, limit: Some(1), ..Default::default() };
        let matches = doc_store.query_latest(collection, &filter).await?;

        if let Some(head) = matches.into_iter().next() {
            let item = self.enrich(collection, head.id, data, now).await?;
            Ok(SmartInsertResult { item, created: false })
        } else {
            let item = self.create(collection, data, now).await?;
            Ok(SmartInsertResult { item, created: true })
        }
    }

    /// Point read (spec §4.2/§4.3): resolves `opts.ov`/`opts.at` to a
    /// specific revision (latest otherwise), hides logically-deleted items
    /// unless `opts.include_deleted` is set, and optionally attaches a
    /// `_meta` projection, a field projection, and presigned URLs for
    /// externalized fields.
    pub async fn get_item(&self, collection: &str, item_id: OpaqueId, opts: GetItemOptions) -> Result<ItemView> {
        let ctx = self.ctx.routing_context(collection);
        let item = self
            .read_path()
            .get_item(collection, item_id, opts.selector(), &ctx, opts.include_deleted)
            .await?;

        let meta = opts.include_meta.then(|| self.build_meta(collection, &item));
        let item = self.apply_projection(item, opts.projection.as_deref());
        let item = if opts.presign { self.apply_presign(collection, item).await? } else { item };

        Ok(ItemView { item, meta })
    }

    fn build_meta(&self, collection: &str, item: &Item) -> ItemMeta {
        let policy = self.config.policy_for(collection);
        let mut meta_indexed = std::collections::HashMap::new();
        if let Some(obj) = item.payload.as_object() {
            for path in &policy.indexed_props {
                if let Some(value) = get_path(obj, path) {
                    meta_indexed.insert(path.clone(), value.clone());
                }
            }
        }
        ItemMeta { ov: item.system.ov, cv: item.system.cv, at: item.system.updated_at, meta_indexed }
    }

    fn apply_projection(&self, mut item: Item, projection: Option<&[String]>) -> Item {
        let Some(paths) = projection else { return item };
        if let Some(obj) = item.payload.as_object() {
            let mut projected = serde_json::Map::new();
            for path in paths {
                if let Some(value) = get_path(obj, path) {
                    set_path(&mut projected, path, value.clone());
                }
            }
            item.payload = Value::Object(projected);
        }
        item
    }

    async fn apply_presign(&self, collection: &str, mut item: Item) -> Result<Item> {
        let ctx = self.ctx.routing_context(collection);
        let backend_id = self.router.resolve(&ctx, |_| true)?;
        let (_, object_store) = self
            .backends
            .resolve(&backend_id)
            .ok_or_else(|| Error::ConfigRefMissing(format!("no adapter registered for backend '{backend_id}'")))?;
        item.payload = presign_value(&item.payload, object_store.as_ref()).await?;
        Ok(item)
    }

    pub async fn query(&self, collection: &str, filter: &QueryFilter) -> Result<Vec<Item>> {
        let ctx = self.ctx.routing_context(collection);
        self.read_path().query(collection, filter, &ctx).await
    }

    /// Writes a new version carrying the same payload as the target
    /// version. The new version is written through `update`, so a restore
    /// from a delete-tombstoned version clears `_system.deleted` (spec §9
    /// Open Question a).
    pub async fn restore_object(&self, collection: &str, item_id: OpaqueId, target: RestoreTarget, now: Timestamp) -> Result<Item> {
        let selector = match target {
            RestoreTarget::Ov(ov) => ReadSelector::AtVersion(ov),
            RestoreTarget::At(at) => ReadSelector::AtTime(at),
        };
        let ctx = self.ctx.routing_context(collection);
        let target_item = self.read_path().get_item(collection, item_id, selector, &ctx, true).await?;
        let current = self.read_path().get_item(collection, item_id, ReadSelector::Latest, &ctx, true).await?;
        self.write_path()
            .execute(
                WriteOp::Update { collection: collection.to_string(), item_id, expected_ov: current.system.ov, payload: target_item.payload },
                ctx,
                now,
            )
            .await
    }

    /// Restores every active item in `collection` to its state as of `at`,
    /// reporting per-item success or failure rather than aborting the
    /// whole batch on the first error (spec §4.2: "partial-failure reported
    /// per-item").
    pub async fn restore_collection(&self, collection: &str, at: Timestamp, now: Timestamp) -> Result<Vec<RestoreCollectionOutcome>> {
        let ctx = self.ctx.routing_context(collection);
        let heads = self.read_path().query(collection, &QueryFilter::default(), &ctx).await?;

        let mut outcomes = Vec::with_capacity(heads.len());
        for head in heads {
            let result = self.restore_object(collection, head.id, RestoreTarget::At(at), now).await.map_err(|e| e.to_string());
            outcomes.push(RestoreCollectionOutcome { item_id: head.id, result });
        }
        Ok(outcomes)
    }

    /// Creates the main record, then creates one record per embedded entity
    /// named in `mappings`, replacing the embedded object in the main
    /// record's payload with a reference to the entity's own id (keyed by
    /// `mapping.key_property`).
    pub async fn insert_with_entities(&self, collection: &str, mut data: Value, mappings: &[EntityMapping], now: Timestamp) -> Result<InsertWithEntitiesResult> {
        let mut entities = Vec::with_capacity(mappings.len());
        // Pre-generated so embedded entities can record it as their
        // `_system.parentId` before the main record itself is written.
        let main_id = OpaqueId::generate();

        let Some(data_obj) = data.as_object_mut() else {
            return Err(Error::validation("insertWithEntities payload must be a JSON object"));
        };

        for mapping in mappings {
            let Some(embedded) = data_obj.get(&mapping.property).cloned() else { continue };
            let entity_opts = CreateOptions {
                parent: Some(LineageRef::new(main_id.to_string(), collection.to_string())),
                ..Default::default()
            };
            let entity_item = self.create_with_options(&mapping.collection, embedded, entity_opts, now).await?;
            data_obj.insert(mapping.key_property.clone(), Value::String(entity_item.id.to_string()));
            entities.push((mapping.collection.clone(), entity_item));
        }

        let main_opts = CreateOptions { item_id: Some(main_id), ..Default::default() };
        let main = self.create_with_options(collection, data, main_opts, now).await?;
        Ok(InsertWithEntitiesResult { main, entities })
    }

    /// Fetches the main record and, for each mapping whose `key_property`
    /// is present, the referenced entity record.
    pub async fn get_with_entities(&self, collection: &str, item_id: OpaqueId, mappings: &[EntityMapping]) -> Result<InsertWithEntitiesResult> {
        let ctx = self.ctx.routing_context(collection);
        let main = self.read_path().get_item(collection, item_id, ReadSelector::Latest, &ctx, false).await?;

        let mut entities = Vec::new();
        for mapping in mappings {
            let Some(Value::String(ref_id)) = main.payload.get(&mapping.key_property) else { continue };
            let entity_id = OpaqueId::from_hex(ref_id).map_err(|e| Error::validation(e.to_string()))?;
            let entity_ctx = self.ctx.routing_context(&mapping.collection);
            let entity_item = self.read_path().get_item(&mapping.collection, entity_id, ReadSelector::Latest, &entity_ctx, false).await?;
            entities.push((mapping.collection.clone(), entity_item));
        }

        Ok(InsertWithEntitiesResult { main, entities })
    }
}

fn get_path<'a>(obj: &'a serde_json::Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = obj.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn set_path(map: &mut serde_json::Map<String, Value>, path: &str, value: Value) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let last = segments.pop().expect("path must have at least one segment");
    let mut current = map;
    for segment in segments {
        current = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()))
            .as_object_mut()
            .expect("projection path conflicts with a non-object field");
    }
    current.insert(last.to_string(), value);
}

/// Presigned-URL substitution for externalized fields (spec §4.2's
/// `presign` opt). Walks the payload replacing any `$externalized` marker
/// with `{url, contentType, sizeBytes}`; everything else passes through
/// unchanged. The URL itself always comes from the adapter's
/// `presign_get` — generating it is explicitly out of this crate's scope.
fn presign_value<'a>(
    value: &'a Value,
    object_store: &'a dyn crate::object_trait::ObjectStore,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value>> + 'a>> {
    Box::pin(async move {
        match value {
            Value::Object(map) => {
                if map.get("$externalized").and_then(Value::as_bool) == Some(true) {
                    if let Some(Value::String(key)) = map.get("objectKey") {
                        let url = object_store.presign_get(key, 3600).await?;
                        let mut out = serde_json::Map::new();
                        out.insert("url".to_string(), Value::String(url));
                        if let Some(content_type) = map.get("contentType") {
                            out.insert("contentType".to_string(), content_type.clone());
                        }
                        if let Some(size_bytes) = map.get("sizeBytes") {
                            out.insert("sizeBytes".to_string(), size_bytes.clone());
                        }
                        return Ok(Value::Object(out));
                    }
                }
                let mut out = serde_json::Map::new();
                for (key, v) in map {
                    out.insert(key.clone(), presign_value(v, object_store).await?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for v in items {
                    out.push(presign_value(v, object_store).await?);
                }
                Ok(Value::Array(out))
            }
            other => Ok(other.clone()),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteEntry;
    use crate::object_trait::ObjectStore;
    use crate::router::RoutingStrategy;
    use crate::store_trait::DocumentStore;
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

    fn harness(collections: &[&str]) -> (Config, Router, SingleBackend) {
        let mut config = Config::default();
        for collection in collections {
            config.routes.push(RouteEntry {
                tenant: None,
                domain: None,
                collection: Some((*collection).to_string()),
                backends: vec!["primary".into()],
            });
        }
        let router = Router::new(config.clone(), RoutingStrategy::Tiered);
        let backends = SingleBackend {
            doc_store: Arc::new(InMemoryDocumentStore::new()),
            object_store: Arc::new(InMemoryObjectStore::new()),
        };
        (config, router, backends)
    }

    #[tokio::test]
    async fn update_replaces_only_named_top_level_keys() {
        let (config, router, backends) = harness(&["users"]);
        let ops = BoundOps::new(&router, &backends, &config, CallContext::new());

        let created = ops.create("users", json!({"name": "Alice", "age": 30}), 1000).await.unwrap();
        let updated = ops.update("users", created.id, Some(created.system.ov), json!({"age": 31}), 1001).await.unwrap();

        assert_eq!(updated.payload["name"], json!("Alice"));
        assert_eq!(updated.payload["age"], json!(31));
    }

    #[tokio::test]
    async fn smart_insert_creates_on_first_call_and_enriches_on_second() {
        let (config, router, backends) = harness(&["users"]);
        let ops = BoundOps::new(&router, &backends, &config, CallContext::new());
        let opts = || SmartInsertOptions { unique_keys: vec!["email".into()] };

        let first = ops
            .smart_insert("users", json!({"email": "a@b.com", "name": "Alice"}), opts(), 1000)
            .await
            .unwrap();
        assert!(first.created);

        let second = ops
            .smart_insert("users", json!({"email": "a@b.com", "tags": [{"id": 1, "v": "x"}]}), opts(), 1001)
            .await
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.item.id, first.item.id);
        assert_eq!(second.item.payload["name"], json!("Alice"));
    }

    #[tokio::test]
    async fn restore_object_clears_deleted_flag_after_delete() {
        let (config, router, backends) = harness(&["users"]);
        let ops = BoundOps::new(&router, &backends, &config, CallContext::new());

        let created = ops.create("users", json!({"status": "pending"}), 1000).await.unwrap();
        let updated = ops.update("users", created.id, Some(created.system.ov), json!({"status": "done"}), 1001).await.unwrap();
        ops.delete("users", created.id, Some(updated.system.ov), 1002).await.unwrap();

        let restored = ops.restore_object("users", created.id, RestoreTarget::Ov(1), 1003).await.unwrap();
        assert!(!restored.system.deleted);
        assert_eq!(restored.payload["status"], json!("pending"));
    }

    #[tokio::test]
    async fn insert_with_entities_links_embedded_objects_by_id() {
        let (config, router, backends) = harness(&["orders", "line_items"]);
        let ops = BoundOps::new(&router, &backends, &config, CallContext::new());
        let mappings = vec![EntityMapping {
            property: "item".into(),
            collection: "line_items".into(),
            key_property: "itemId".into(),
        }];

        let result = ops
            .insert_with_entities("orders", json!({"total": 42, "item": {"sku": "abc"}}), &mappings, 1000)
            .await
            .unwrap();

        assert_eq!(result.entities.len(), 1);
        assert!(result.main.payload.get("itemId").is_some());

        let fetched = ops.get_with_entities("orders", result.main.id, &mappings).await.unwrap();
        assert_eq!(fetched.entities[0].1.payload["sku"], json!("abc"));
    }

    #[tokio::test]
    async fn restore_collection_reports_per_item_outcomes() {
        let (config, router, backends) = harness(&["users"]);
        let ops = BoundOps::new(&router, &backends, &config, CallContext::new());

        let a = ops.create("users", json!({"name": "Alice"}), 1000).await.unwrap();
        ops.update("users", a.id, Some(a.system.ov), json!({"name": "Alice V2"}), 1001).await.unwrap();

        let outcomes = ops.restore_collection("users", 1000, 1002).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].result.is_ok());
        assert_eq!(outcomes[0].result.as_ref().unwrap().payload["name"], json!("Alice"));
    }
}
