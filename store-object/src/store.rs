//! [`Store`]: the `object_store`-backed implementation of [`chronos_core::ObjectStore`].
//!
//! A single wrapper backs both the required local-filesystem adapter (used
//! in development and tests) and the S3 adapter, the way `sui-indexer-object-store`
//! layers an indexer-facing trait over the `object_store` crate's backends.
//! Presigning only works against backends that implement `object_store`'s
//! `Signer` trait (S3); the local adapter has no such concept and reports
//! `Error::PresignUnsupported`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chronos_core::{Error as CoreError, ObjectMeta as CoreObjectMeta, Result as CoreResult};
use futures::StreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjPath;
use object_store::signer::Signer;
use object_store::{ObjectStore as ObjStoreBackend, PutPayload};

use crate::error::Error;

fn obj_err(e: object_store::Error) -> CoreError {
    CoreError::from(Error::from(e))
}

pub struct Store {
    backend: Arc<dyn ObjStoreBackend>,
    signer: Option<Arc<dyn Signer>>,
}

impl Store {
    /// Local-filesystem backend rooted at `root`, used in development and in
    /// tests. Never supports presigning.
    pub fn local(root: impl AsRef<std::path::Path>) -> crate::error::Result<Self> {
        let fs = LocalFileSystem::new_with_prefix(root).map_err(Error::from)?;
        Ok(Self {
            backend: Arc::new(fs),
            signer: None,
        })
    }

    /// S3-compatible backend. `endpoint` overrides the default AWS endpoint
    /// for S3-compatible services (MinIO, R2, ...).
    pub fn s3(bucket: &str, region: &str, access_key_id: &str, secret_access_key: &str, endpoint: Option<&str>) -> crate::error::Result<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(bucket)
            .with_region(region)
            .with_access_key_id(access_key_id)
            .with_secret_access_key(secret_access_key);
        if let Some(endpoint) = endpoint {
            builder = builder.with_endpoint(endpoint).with_allow_http(true);
        }
        let s3 = builder.build().map_err(Error::from)?;
        let s3 = Arc::new(s3);
        let backend: Arc<dyn ObjStoreBackend> = s3.clone();
        let signer: Arc<dyn Signer> = s3;
        Ok(Self {
            backend,
            signer: Some(signer),
        })
    }
}

#[async_trait]
impl chronos_core::ObjectStore for Store {
    async fn put_json(&self, key: &str, value: &serde_json::Value) -> CoreResult<CoreObjectMeta> {
        let bytes = serde_json::to_vec(value).map_err(|e| CoreError::ExternalizationError(e.to_string()))?;
        self.put_bytes(key, bytes, Some("application/json")).await
    }

    async fn put_bytes(&self, key: &str, bytes: Vec<u8>, content_type: Option<&str>) -> CoreResult<CoreObjectMeta> {
        let size_bytes = bytes.len() as u64;
        self.backend.put(&ObjPath::from(key), PutPayload::from(bytes)).await.map_err(obj_err)?;
        Ok(CoreObjectMeta {
            key: key.to_string(),
            size_bytes,
            content_type: content_type.map(String::from),
        })
    }

    async fn get_json(&self, key: &str) -> CoreResult<serde_json::Value> {
        let bytes = self.get_bytes(key).await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            CoreError::from(Error::Decode {
                key: key.to_string(),
                source: e,
            })
        })
    }

    async fn get_bytes(&self, key: &str) -> CoreResult<Vec<u8>> {
        let result = self.backend.get(&ObjPath::from(key)).await.map_err(obj_err)?;
        let bytes = result.bytes().await.map_err(obj_err)?;
        Ok(bytes.to_vec())
    }

    async fn del(&self, key: &str) -> CoreResult<()> {
        self.backend.delete(&ObjPath::from(key)).await.map_err(obj_err)?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> CoreResult<Vec<CoreObjectMeta>> {
        let path = ObjPath::from(prefix);
        let mut stream = self.backend.list(Some(&path));
        let mut out = Vec::new();
        while let Some(meta) = stream.next().await {
            let meta = meta.map_err(obj_err)?;
            out.push(CoreObjectMeta {
                key: meta.location.to_string(),
                size_bytes: meta.size as u64,
                content_type: None,
            });
        }
        Ok(out)
    }

    async fn copy(&self, from: &str, to: &str) -> CoreResult<CoreObjectMeta> {
        let from_path = ObjPath::from(from);
        let to_path = ObjPath::from(to);
        self.backend.copy(&from_path, &to_path).await.map_err(obj_err)?;
        let meta = self.backend.head(&to_path).await.map_err(obj_err)?;
        Ok(CoreObjectMeta {
            key: to.to_string(),
            size_bytes: meta.size as u64,
            content_type: None,
        })
    }

    async fn presign_get(&self, key: &str, expires_in_secs: u64) -> CoreResult<String> {
        let Some(signer) = &self.signer else {
            return Err(CoreError::from(Error::PresignUnsupported));
        };
        let url = signer
            .signed_url(http::Method::GET, &ObjPath::from(key), Duration::from_secs(expires_in_secs))
            .await
            .map_err(obj_err)?;
        Ok(url.to_string())
    }
}
