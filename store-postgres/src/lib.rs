//! Postgres adapter for [`chronos_core::DocumentStore`].
//!
//! Mirrors the reference server's `db` module: a pool, a migration runner,
//! and manual `FromRow` row types rather than a query builder.

pub mod error;
pub mod pool;
mod records;
mod store;

pub use error::Error;
pub use pool::{create_pool, run_migrations, Pool};
pub use store::PgDocumentStore;

#[cfg(test)]
mod tests {
    use super::*;
    use chronos_core::{DocumentStore, Head, OpaqueId};

    fn pg_url() -> Option<String> {
        std::env::var("CHRONOS_TEST_DATABASE_URL").ok()
    }

    #[tokio::test]
    #[ignore = "requires a running Postgres instance; set CHRONOS_TEST_DATABASE_URL"]
    async fn head_round_trips_through_cas() {
        let Some(url) = pg_url() else { return };
        let pool = create_pool(&url).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let store = PgDocumentStore::new(pool);

        let id = OpaqueId::generate();
        let version_id = OpaqueId::generate();
        let head = Head::new("users", id, version_id, 1_700_000_000);

        store.cas_head("users", 0, head.clone()).await.unwrap();
        let fetched = store.get_head("users", id).await.unwrap().unwrap();
        assert_eq!(fetched.ov, 0);

        let mut next = fetched.clone();
        next.ov = 1;
        store.cas_head("users", 0, next).await.unwrap();

        let stale = store.cas_head("users", 0, head).await;
        assert!(stale.is_err());
    }
}
