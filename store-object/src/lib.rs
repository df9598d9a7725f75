//! `object_store`-backed adapter for [`chronos_core::ObjectStore`].

pub mod error;
mod store;

pub use error::Error;
pub use store::Store;

#[cfg(test)]
mod tests {
    use super::*;
    use chronos_core::ObjectStore;
    use serde_json::json;

    fn temp_root(label: &str) -> std::path::PathBuf {
        let pid = std::process::id();
        let dir = std::env::temp_dir().join(format!("chronos-objectstore-test-{label}-{pid}"));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn put_and_get_json_round_trips() {
        let store = Store::local(temp_root("roundtrip")).unwrap();
        let value = json!({"name": "Alice"});
        store.put_json("users/1.json", &value).await.unwrap();
        let fetched = store.get_json("users/1.json").await.unwrap();
        assert_eq!(fetched, value);
    }

    #[tokio::test]
    async fn put_bytes_reports_size_and_content_type() {
        let store = Store::local(temp_root("bytes")).unwrap();
        let meta = store.put_bytes("blobs/a", vec![1, 2, 3, 4], Some("application/octet-stream")).await.unwrap();
        assert_eq!(meta.size_bytes, 4);
        assert_eq!(meta.content_type.as_deref(), Some("application/octet-stream"));
    }

    #[tokio::test]
    async fn list_returns_keys_under_prefix() {
        let store = Store::local(temp_root("list")).unwrap();
        store.put_bytes("avatars/1", vec![1], None).await.unwrap();
        store.put_bytes("avatars/2", vec![2], None).await.unwrap();
        store.put_bytes("other/3", vec![3], None).await.unwrap();

        let listed = store.list("avatars").await.unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn del_removes_the_object() {
        let store = Store::local(temp_root("del")).unwrap();
        store.put_bytes("x", vec![1], None).await.unwrap();
        store.del("x").await.unwrap();
        assert!(store.get_bytes("x").await.is_err());
    }

    #[tokio::test]
    async fn local_backend_rejects_presigning() {
        let store = Store::local(temp_root("presign")).unwrap();
        store.put_bytes("x", vec![1], None).await.unwrap();
        let result = store.presign_get("x", 60).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn copy_duplicates_the_object() {
        let store = Store::local(temp_root("copy")).unwrap();
        store.put_bytes("src", vec![9, 9], None).await.unwrap();
        let meta = store.copy("src", "dst").await.unwrap();
        assert_eq!(meta.size_bytes, 2);
        assert_eq!(store.get_bytes("dst").await.unwrap(), vec![9, 9]);
    }
}
