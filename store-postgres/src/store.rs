//! [`PgDocumentStore`]: the Postgres implementation of [`chronos_core::DocumentStore`].

use async_trait::async_trait;
use chronos_core::{
    CollectionCounter, CollectionVersion, CounterTotals, DocumentStore, Error as CoreError, FallbackOp, Head, ItemVersion, OpaqueId, QueryFilter,
    Result as CoreResult, Timestamp, Version,
};
use sqlx::Row;

use crate::pool::Pool;
use crate::records::{FallbackRow, HeadRow, VersionRow};

pub struct PgDocumentStore {
    pool: Pool,
}

fn db_err(e: sqlx::Error) -> CoreError {
    CoreError::from(crate::error::Error::from(e))
}

impl PgDocumentStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get_head(&self, collection: &str, id: OpaqueId) -> CoreResult<Option<Head>> {
        let row = sqlx::query_as::<_, HeadRow>("SELECT collection, id, ov, cv, current_version_id, deleted, updated_at FROM heads WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id.to_hex())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match row {
            Some(row) => Ok(Some(row.to_head().map_err(CoreError::from)?)),
            None => Ok(None),
        }
    }

    async fn cas_head(&self, collection: &str, expected_ov: Version, new_head: Head) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let current: Option<i64> = sqlx::query("SELECT ov FROM heads WHERE collection = $1 AND id = $2 FOR UPDATE")
            .bind(collection)
            .bind(new_head.id.to_hex())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?
            .map(|row| row.get("ov"));

        match current {
            None => {
                if expected_ov != 0 {
                    return Err(CoreError::not_found(collection, new_head.id.to_hex()));
                }
                let row = HeadRow::from_head(&new_head);
                sqlx::query(
                    "INSERT INTO heads (collection, id, ov, cv, current_version_id, deleted, updated_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $7)",
                )
                .bind(&row.collection)
                .bind(&row.id)
                .bind(row.ov)
                .bind(row.cv)
                .bind(&row.current_version_id)
                .bind(row.deleted)
                .bind(row.updated_at)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            }
            Some(actual_ov) => {
                if actual_ov as u64 != expected_ov {
                    return Err(CoreError::OptimisticLock {
                        collection: collection.to_string(),
                        id: new_head.id.to_hex(),
                        expected: expected_ov,
                        actual: actual_ov as u64,
                    });
                }
                let row = HeadRow::from_head(&new_head);
                sqlx::query(
                    "UPDATE heads SET ov = $1, cv = $2, current_version_id = $3, deleted = $4, updated_at = $5
                     WHERE collection = $6 AND id = $7",
                )
                .bind(row.ov)
                .bind(row.cv)
                .bind(&row.current_version_id)
                .bind(row.deleted)
                .bind(row.updated_at)
                .bind(&row.collection)
                .bind(&row.id)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            }
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn put_version(&self, version: ItemVersion) -> CoreResult<()> {
        let row = VersionRow::from_version(&version);
        sqlx::query(
            "INSERT INTO versions (id, collection, item_id, ov, payload, hash, created_at, deleted, actor, reason)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(&row.id)
        .bind(&row.collection)
        .bind(&row.item_id)
        .bind(row.ov)
        .bind(&row.payload)
        .bind(&row.hash)
        .bind(row.created_at)
        .bind(row.deleted)
        .bind(&row.actor)
        .bind(&row.reason)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_version(&self, collection: &str, version_id: OpaqueId) -> CoreResult<Option<ItemVersion>> {
        let row = sqlx::query_as::<_, VersionRow>(
            "SELECT id, collection, item_id, ov, payload, hash, created_at, deleted, actor, reason FROM versions WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(version_id.to_hex())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            Some(row) => Ok(Some(row.to_version().map_err(CoreError::from)?)),
            None => Ok(None),
        }
    }

    async fn get_version_at(&self, collection: &str, id: OpaqueId, as_of: Timestamp) -> CoreResult<Option<ItemVersion>> {
        let row = sqlx::query_as::<_, VersionRow>(
            "SELECT id, collection, item_id, ov, payload, hash, created_at, deleted, actor, reason FROM versions
             WHERE collection = $1 AND item_id = $2 AND created_at <= $3
             ORDER BY created_at DESC, ov DESC
             LIMIT 1",
        )
        .bind(collection)
        .bind(id.to_hex())
        .bind(as_of)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            Some(row) => Ok(Some(row.to_version().map_err(CoreError::from)?)),
            None => Ok(None),
        }
    }

    async fn list_versions(&self, collection: &str, id: OpaqueId) -> CoreResult<Vec<ItemVersion>> {
        let rows = sqlx::query_as::<_, VersionRow>(
            "SELECT id, collection, item_id, ov, payload, hash, created_at, deleted, actor, reason FROM versions
             WHERE collection = $1 AND item_id = $2
             ORDER BY created_at DESC, ov DESC",
        )
        .bind(collection)
        .bind(id.to_hex())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(|row| row.to_version().map_err(CoreError::from)).collect()
    }

    async fn prune_versions(&self, collection: &str, id: OpaqueId, keep_latest: u32) -> CoreResult<u64> {
        let result = sqlx::query(
            "DELETE FROM versions WHERE collection = $1 AND item_id = $2 AND id NOT IN (
                 SELECT id FROM versions WHERE collection = $1 AND item_id = $2
                 ORDER BY created_at DESC, ov DESC LIMIT $3
             )",
        )
        .bind(collection)
        .bind(id.to_hex())
        .bind(keep_latest as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected())
    }

    async fn query_latest(&self, collection: &str, filter: &QueryFilter) -> CoreResult<Vec<Head>> {
        let mut sql = String::from("SELECT collection, id, ov, cv, current_version_id, deleted, updated_at FROM heads WHERE collection = $1");
        if !filter.include_deleted {
            sql.push_str(" AND deleted = FALSE");
        }
        let mut binds: Vec<(String, serde_json::Value)> = Vec::new();
        for (idx, (path, value)) in filter.equals.iter().enumerate() {
            sql.push_str(&format!(
                " AND EXISTS (SELECT 1 FROM versions v WHERE v.collection = heads.collection AND v.id = heads.current_version_id AND v.payload #>> ${} = ${})",
                idx * 2 + 2,
                idx * 2 + 3
            ));
            binds.push((path.clone(), value.clone()));
        }
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut query = sqlx::query_as::<_, HeadRow>(&sql).bind(collection);
        for (path, value) in &binds {
            let pg_path: Vec<&str> = path.split('.').collect();
            query = query.bind(pg_path).bind(json_scalar_as_text(value));
        }

        let rows = query.fetch_all(&self.pool).await.map_err(db_err)?;
        rows.iter().map(|row| row.to_head().map_err(CoreError::from)).collect()
    }

    async fn next_cv(&self, collection: &str) -> CoreResult<CollectionVersion> {
        let row = sqlx::query(
            "INSERT INTO collection_counters (collection, cv) VALUES ($1, 1)
             ON CONFLICT (collection) DO UPDATE SET cv = collection_counters.cv + 1
             RETURNING cv",
        )
        .bind(collection)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        let cv: i64 = row.get("cv");
        Ok(cv as u64)
    }

    async fn get_counter(&self, collection: &str) -> CoreResult<CollectionCounter> {
        let row = sqlx::query("SELECT cv FROM collection_counters WHERE collection = $1")
            .bind(collection)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        let cv = row.map(|r| r.get::<i64, _>("cv")).unwrap_or(0);
        Ok(CollectionCounter {
            collection: collection.to_string(),
            cv: cv as u64,
        })
    }

    async fn enqueue_fallback(&self, op: FallbackOp) -> CoreResult<()> {
        let row = FallbackRow::from_op(&op);
        sqlx::query(
            "INSERT INTO fallback_ops (id, collection, item_id, kind, payload, attempts, next_attempt_at, created_at, last_error)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&row.id)
        .bind(&row.collection)
        .bind(&row.item_id)
        .bind(&row.kind)
        .bind(&row.payload)
        .bind(row.attempts)
        .bind(row.next_attempt_at)
        .bind(row.created_at)
        .bind(&row.last_error)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn list_ready_fallback(&self, now: Timestamp, limit: usize) -> CoreResult<Vec<FallbackOp>> {
        let rows = sqlx::query_as::<_, FallbackRow>(
            "SELECT id, collection, item_id, kind, payload, attempts, next_attempt_at, created_at, last_error
             FROM fallback_ops WHERE next_attempt_at <= $1
             ORDER BY next_attempt_at ASC LIMIT $2",
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(|row| row.to_op().map_err(CoreError::from)).collect()
    }

    async fn update_fallback(&self, op: FallbackOp) -> CoreResult<()> {
        let row = FallbackRow::from_op(&op);
        sqlx::query("UPDATE fallback_ops SET attempts = $1, next_attempt_at = $2, last_error = $3 WHERE id = $4")
            .bind(row.attempts)
            .bind(row.next_attempt_at)
            .bind(&row.last_error)
            .bind(&row.id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_fallback(&self, id: OpaqueId) -> CoreResult<()> {
        sqlx::query("DELETE FROM fallback_ops WHERE id = $1")
            .bind(id.to_hex())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    // Only scalar counters accumulate across conflicts here; rule_matches and
    // unique_values are stored but not merged in SQL (see DESIGN.md).
    async fn record_analytics_delta(&self, collection: &str, delta: CounterTotals) -> CoreResult<()> {
        let rule_matches = serde_json::to_value(&delta.rule_matches).map_err(|e| CoreError::StorageError(e.to_string()))?;
        let unique_values = serde_json::to_value(&delta.unique_values).map_err(|e| CoreError::StorageError(e.to_string()))?;

        sqlx::query(
            "INSERT INTO analytics_totals (collection, creates, updates, deletes, rule_matches, unique_values)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (collection) DO UPDATE SET
                 creates = analytics_totals.creates + EXCLUDED.creates,
                 updates = analytics_totals.updates + EXCLUDED.updates,
                 deletes = analytics_totals.deletes + EXCLUDED.deletes",
        )
        .bind(collection)
        .bind(delta.creates as i64)
        .bind(delta.updates as i64)
        .bind(delta.deletes as i64)
        .bind(rule_matches)
        .bind(unique_values)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_analytics(&self, collection: &str) -> CoreResult<CounterTotals> {
        let row = sqlx::query("SELECT creates, updates, deletes FROM analytics_totals WHERE collection = $1")
            .bind(collection)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match row {
            Some(row) => Ok(CounterTotals {
                creates: row.get::<i64, _>("creates") as u64,
                updates: row.get::<i64, _>("updates") as u64,
                deletes: row.get::<i64, _>("deletes") as u64,
                ..Default::default()
            }),
            None => Ok(CounterTotals::default()),
        }
    }
}

fn json_scalar_as_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
