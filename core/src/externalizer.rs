//! Externalizer (spec §4.5): moves base64 payload fields out into object
//! storage, leaving a small reference behind in the document-store row, and
//! reverses the process on read.

use serde_json::{Map, Value};

use crate::config::CollectionPolicy;
use crate::error::Result;
use crate::id::OpaqueId;
use crate::model::ExternalizedBlob;
use crate::object_trait::ObjectStore;

const MARKER_KEY: &str = "$externalized";

pub struct Externalizer<'a> {
    object_store: &'a dyn ObjectStore,
}

impl<'a> Externalizer<'a> {
    pub fn new(object_store: &'a dyn ObjectStore) -> Self {
        Self { object_store }
    }

    /// Walk `payload`, replacing any field named in `policy.externalize_fields`
    /// (or any base64-looking string field exceeding
    /// `policy.externalize_threshold_bytes`) with a small object-store
    /// reference. Returns the rewritten payload and the list of blobs that
    /// were moved out, for the write-path saga to record alongside the
    /// version it writes.
    pub async fn externalize(
        &self,
        collection: &str,
        item_id: OpaqueId,
        payload: &Value,
        policy: &CollectionPolicy,
    ) -> Result<(Value, Vec<ExternalizedBlob>)> {
        let mut blobs = Vec::new();
        let rewritten = self
            .externalize_node(collection, item_id, payload, policy, "", &mut blobs)
            .await?;
        Ok((rewritten, blobs))
    }

    async fn externalize_node(
        &self,
        collection: &str,
        item_id: OpaqueId,
        node: &Value,
        policy: &CollectionPolicy,
        path: &str,
        blobs: &mut Vec<ExternalizedBlob>,
    ) -> Result<Value> {
        match node {
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, value) in map {
                    let field_path = join_path(path, key);
                    let should_externalize = policy.externalize_fields.iter().any(|f| f == &field_path)
                        || is_large_base64_string(value, policy.externalize_threshold_bytes);

                    if should_externalize {
                        if let Value::String(base64_data) = value {
                            let blob = self
                                .store_blob(collection, item_id, &field_path, base64_data)
                                .await?;
                            out.insert(key.clone(), blob_marker(&blob));
                            blobs.push(blob);
                            continue;
                        }
                    }

                    let rewritten = Box::pin(self.externalize_node(collection, item_id, value, policy, &field_path, blobs)).await?;
                    out.insert(key.clone(), rewritten);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let field_path = format!("{}[{}]", path, i);
                    out.push(Box::pin(self.externalize_node(collection, item_id, item, policy, &field_path, blobs)).await?);
                }
                Ok(Value::Array(out))
            }
            other => Ok(other.clone()),
        }
    }

    async fn store_blob(&self, collection: &str, item_id: OpaqueId, field_path: &str, base64_data: &str) -> Result<ExternalizedBlob> {
        let object_key = format!("externalized/{}/{}/{}", collection, item_id, field_path);
        let bytes = base64_decode(base64_data);
        let meta = self.object_store.put_bytes(&object_key, bytes, None).await?;
        Ok(ExternalizedBlob {
            field_path: field_path.to_string(),
            object_key,
            content_type: meta.content_type,
            size_bytes: meta.size_bytes,
        })
    }

    /// Reverse externalization: walk `payload` and replace any
    /// `$externalized` reference with the base64-encoded bytes fetched from
    /// object storage.
    pub async fn inline(&self, payload: &Value) -> Result<Value> {
        Box::pin(self.inline_node(payload)).await
    }

    async fn inline_node(&self, node: &Value) -> Result<Value> {
        match node {
            Value::Object(map) => {
                if map.get(MARKER_KEY).and_then(Value::as_bool) == Some(true) {
                    if let Some(Value::String(key)) = map.get("objectKey") {
                        let bytes = self.object_store.get_bytes(key).await?;
                        return Ok(Value::String(base64_encode(&bytes)));
                    }
                }
                let mut out = Map::with_capacity(map.len());
                for (key, value) in map {
                    out.insert(key.clone(), Box::pin(self.inline_node(value)).await?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(Box::pin(self.inline_node(item)).await?);
                }
                Ok(Value::Array(out))
            }
            other => Ok(other.clone()),
        }
    }
}

fn join_path(base: &str, key: &str) -> String {
    if base.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", base, key)
    }
}

fn blob_marker(blob: &ExternalizedBlob) -> Value {
    serde_json::json!({
        MARKER_KEY: true,
        "objectKey": blob.object_key,
        "contentType": blob.content_type,
        "sizeBytes": blob.size_bytes,
    })
}

fn is_large_base64_string(value: &Value, threshold: Option<u64>) -> bool {
    let Some(threshold) = threshold else { return false };
    match value {
        Value::String(s) => looks_like_base64(s) && (s.len() as u64) >= threshold,
        _ => false,
    }
}

fn looks_like_base64(s: &str) -> bool {
    s.len() >= 16
        && s.len() % 4 == 0
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=')
}

fn base64_encode(bytes: &[u8]) -> String {
    base64::encode(bytes)
}

fn base64_decode(input: &str) -> Vec<u8> {
    base64::decode(input).unwrap_or_default()
}
