//! The `ObjectStore` adapter contract (spec §6.2).
//!
//! A required local-filesystem implementation and an S3-compatible
//! implementation both live in the `chronos-objectstore` crate, built on
//! top of the `object_store` crate the way `MystenLabs-sui`'s
//! `sui-indexer-object-store` crate does.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    pub size_bytes: u64,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_json(&self, key: &str, value: &Value) -> Result<ObjectMeta>;

    async fn put_bytes(&self, key: &str, bytes: Vec<u8>, content_type: Option<&str>) -> Result<ObjectMeta>;

    async fn get_json(&self, key: &str) -> Result<Value>;

    async fn get_bytes(&self, key: &str) -> Result<Vec<u8>>;

    async fn del(&self, key: &str) -> Result<()>;

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>>;

    async fn copy(&self, from: &str, to: &str) -> Result<ObjectMeta>;

    /// Produce a time-limited, readable URL for `key`. Adapters that cannot
    /// support presigning (e.g. local filesystem) return
    /// `Error::ExternalizationError`.
    async fn presign_get(&self, key: &str, expires_in_secs: u64) -> Result<String>;
}
