//! In-memory `DocumentStore` and `ObjectStore` fakes shared by this crate's
//! unit and integration tests. Not exported outside `#[cfg(test)]`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::id::OpaqueId;
use crate::model::{CollectionCounter, CollectionVersion, CounterTotals, FallbackOp, Head, ItemVersion, Timestamp, Version};
use crate::object_trait::{ObjectMeta, ObjectStore};
use crate::store_trait::{DocumentStore, QueryFilter};

#[derive(Default)]
pub struct InMemoryDocumentStore {
    heads: Mutex<HashMap<(String, OpaqueId), Head>>,
    versions: Mutex<HashMap<(String, OpaqueId), ItemVersion>>,
    versions_by_item: Mutex<HashMap<(String, OpaqueId), Vec<OpaqueId>>>,
    counters: Mutex<HashMap<String, CollectionVersion>>,
    fallback: Mutex<HashMap<OpaqueId, FallbackOp>>,
    analytics: Mutex<HashMap<String, CounterTotals>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get_head(&self, collection: &str, id: OpaqueId) -> Result<Option<Head>> {
        Ok(self.heads.lock().unwrap().get(&(collection.to_string(), id)).cloned())
    }

    async fn cas_head(&self, collection: &str, expected_ov: Version, new_head: Head) -> Result<()> {
        let mut heads = self.heads.lock().unwrap();
        let key = (collection.to_string(), new_head.id);
        match heads.get(&key) {
            Some(existing) if existing.ov != expected_ov => Err(Error::OptimisticLock {
                collection: collection.to_string(),
                id: new_head.id.to_string(),
                expected: expected_ov,
                actual: existing.ov,
            }),
            None if expected_ov != 0 => Err(Error::NotFound {
                collection: collection.to_string(),
                id: new_head.id.to_string(),
            }),
            _ => {
                heads.insert(key, new_head);
                Ok(())
            }
        }
    }

    async fn put_version(&self, version: ItemVersion) -> Result<()> {
        let key = (version.collection.clone(), version.id);
        let item_key = (version.collection.clone(), version.item_id);
        self.versions_by_item.lock().unwrap().entry(item_key).or_default().push(version.id);
        self.versions.lock().unwrap().insert(key, version);
        Ok(())
    }

    async fn get_version(&self, collection: &str, version_id: OpaqueId) -> Result<Option<ItemVersion>> {
        Ok(self.versions.lock().unwrap().get(&(collection.to_string(), version_id)).cloned())
    }

    async fn get_version_at(&self, collection: &str, id: OpaqueId, as_of: Timestamp) -> Result<Option<ItemVersion>> {
        let by_item = self.versions_by_item.lock().unwrap();
        let versions = self.versions.lock().unwrap();
        let Some(ids) = by_item.get(&(collection.to_string(), id)) else { return Ok(None) };

        let mut candidate: Option<ItemVersion> = None;
        for version_id in ids {
            if let Some(v) = versions.get(&(collection.to_string(), *version_id)) {
                if v.created_at <= as_of {
                    if candidate.as_ref().map(|c| c.created_at <= v.created_at).unwrap_or(true) {
                        candidate = Some(v.clone());
                    }
                }
            }
        }
        Ok(candidate)
    }

    async fn list_versions(&self, collection: &str, id: OpaqueId) -> Result<Vec<ItemVersion>> {
        let by_item = self.versions_by_item.lock().unwrap();
        let versions = self.versions.lock().unwrap();
        let Some(ids) = by_item.get(&(collection.to_string(), id)) else { return Ok(Vec::new()) };
        let mut result: Vec<ItemVersion> = ids
            .iter()
            .filter_map(|version_id| versions.get(&(collection.to_string(), *version_id)).cloned())
            .collect();
        result.sort_by_key(|v| std::cmp::Reverse(v.created_at));
        Ok(result)
    }

    async fn prune_versions(&self, collection: &str, id: OpaqueId, keep_latest: u32) -> Result<u64> {
        let mut by_item = self.versions_by_item.lock().unwrap();
        let mut versions = self.versions.lock().unwrap();
        let Some(ids) = by_item.get_mut(&(collection.to_string(), id)) else { return Ok(0) };

        let mut sorted: Vec<OpaqueId> = ids.clone();
        sorted.sort_by_key(|version_id| {
            versions
                .get(&(collection.to_string(), *version_id))
                .map(|v| std::cmp::Reverse(v.created_at))
        });

        let keep_latest = keep_latest as usize;
        if sorted.len() <= keep_latest {
            return Ok(0);
        }
        let to_remove = sorted.split_off(keep_latest);
        for version_id in &to_remove {
            versions.remove(&(collection.to_string(), *version_id));
        }
        *ids = sorted;
        Ok(to_remove.len() as u64)
    }

    async fn query_latest(&self, collection: &str, filter: &QueryFilter) -> Result<Vec<Head>> {
        let heads = self.heads.lock().unwrap();
        let versions = self.versions.lock().unwrap();
        let mut result: Vec<Head> = heads
            .values()
            .filter(|h| h.collection == collection && (filter.include_deleted || !h.deleted))
            .filter(|h| {
                filter.equals.iter().all(|(path, expected)| {
                    versions
                        .get(&(collection.to_string(), h.current_version_id))
                        .map(|v| get_path(&v.payload, path) == Some(expected))
                        .unwrap_or(false)
                })
            })
            .cloned()
            .collect();
        if let Some(limit) = filter.limit {
            result.truncate(limit);
        }
        Ok(result)
    }

    async fn next_cv(&self, collection: &str) -> Result<CollectionVersion> {
        let mut counters = self.counters.lock().unwrap();
        let entry = counters.entry(collection.to_string()).or_insert(0);
        *entry += 1;
        Ok(*entry)
    }

    async fn get_counter(&self, collection: &str) -> Result<CollectionCounter> {
        let counters = self.counters.lock().unwrap();
        Ok(CollectionCounter {
            collection: collection.to_string(),
            cv: counters.get(collection).copied().unwrap_or(0),
        })
    }

    async fn enqueue_fallback(&self, op: FallbackOp) -> Result<()> {
        self.fallback.lock().unwrap().insert(op.id, op);
        Ok(())
    }

    async fn list_ready_fallback(&self, now: Timestamp, limit: usize) -> Result<Vec<FallbackOp>> {
        let fallback = self.fallback.lock().unwrap();
        let mut ready: Vec<FallbackOp> = fallback.values().filter(|op| op.next_attempt_at <= now).cloned().collect();
        ready.sort_by_key(|op| op.created_at);
        ready.truncate(limit);
        Ok(ready)
    }

    async fn update_fallback(&self, op: FallbackOp) -> Result<()> {
        self.fallback.lock().unwrap().insert(op.id, op);
        Ok(())
    }

    async fn delete_fallback(&self, id: OpaqueId) -> Result<()> {
        self.fallback.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn record_analytics_delta(&self, collection: &str, delta: CounterTotals) -> Result<()> {
        self.analytics.lock().unwrap().entry(collection.to_string()).or_default().merge_delta(delta);
        Ok(())
    }

    async fn get_analytics(&self, collection: &str) -> Result<CounterTotals> {
        Ok(self.analytics.lock().unwrap().get(collection).cloned().unwrap_or_default())
    }
}

fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<String, (Vec<u8>, Option<String>)>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put_json(&self, key: &str, value: &Value) -> Result<ObjectMeta> {
        let bytes = serde_json::to_vec(value).map_err(|e| Error::ExternalizationError(e.to_string()))?;
        self.put_bytes(key, bytes, Some("application/json")).await
    }

    async fn put_bytes(&self, key: &str, bytes: Vec<u8>, content_type: Option<&str>) -> Result<ObjectMeta> {
        let size = bytes.len() as u64;
        self.objects.lock().unwrap().insert(key.to_string(), (bytes, content_type.map(String::from)));
        Ok(ObjectMeta { key: key.to_string(), size_bytes: size, content_type: content_type.map(String::from) })
    }

    async fn get_json(&self, key: &str) -> Result<Value> {
        let bytes = self.get_bytes(key).await?;
        serde_json::from_slice(&bytes).map_err(|e| Error::ExternalizationError(e.to_string()))
    }

    async fn get_bytes(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| Error::StorageError(format!("no such object: {key}")))
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, (bytes, content_type))| ObjectMeta {
                key: k.clone(),
                size_bytes: bytes.len() as u64,
                content_type: content_type.clone(),
            })
            .collect())
    }

    async fn copy(&self, from: &str, to: &str) -> Result<ObjectMeta> {
        let bytes = self.get_bytes(from).await?;
        self.put_bytes(to, bytes, None).await
    }

    async fn presign_get(&self, key: &str, _expires_in_secs: u64) -> Result<String> {
        Ok(format!("https://example.invalid/{}", key))
    }
}
