//! Row shapes and manual `FromRow` impls, mirroring the reference server's
//! `db::records`/`db::operations` modules.

use chronos_core::{FallbackOp, FallbackOpKind, Head, ItemVersion, OpaqueId};
use sqlx::{postgres::PgRow, Row};

use crate::error::{Error, Result};

pub struct HeadRow {
    pub collection: String,
    pub id: String,
    pub ov: i64,
    pub cv: i64,
    pub current_version_id: String,
    pub deleted: bool,
    pub updated_at: i64,
}

impl<'r> sqlx::FromRow<'r, PgRow> for HeadRow {
    fn from_row(row: &'r PgRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(HeadRow {
            collection: row.try_get("collection")?,
            id: row.try_get("id")?,
            ov: row.try_get("ov")?,
            cv: row.try_get("cv")?,
            current_version_id: row.try_get("current_version_id")?,
            deleted: row.try_get("deleted")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl HeadRow {
    pub fn to_head(&self) -> Result<Head> {
        Ok(Head {
            collection: self.collection.clone(),
            id: OpaqueId::from_hex(&self.id).map_err(|e| Error::Decode(e.to_string()))?,
            ov: self.ov as u64,
            cv: self.cv as u64,
            current_version_id: OpaqueId::from_hex(&self.current_version_id).map_err(|e| Error::Decode(e.to_string()))?,
            deleted: self.deleted,
            updated_at: self.updated_at,
        })
    }

    pub fn from_head(head: &Head) -> Self {
        HeadRow {
            collection: head.collection.clone(),
            id: head.id.to_hex(),
            ov: head.ov as i64,
            cv: head.cv as i64,
            current_version_id: head.current_version_id.to_hex(),
            deleted: head.deleted,
            updated_at: head.updated_at,
        }
    }
}

pub struct VersionRow {
    pub id: String,
    pub collection: String,
    pub item_id: String,
    pub ov: i64,
    pub payload: serde_json::Value,
    pub hash: String,
    pub created_at: i64,
    pub deleted: bool,
    pub actor: Option<String>,
    pub reason: Option<String>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for VersionRow {
    fn from_row(row: &'r PgRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(VersionRow {
            id: row.try_get("id")?,
            collection: row.try_get("collection")?,
            item_id: row.try_get("item_id")?,
            ov: row.try_get("ov")?,
            payload: row.try_get("payload")?,
            hash: row.try_get("hash")?,
            created_at: row.try_get("created_at")?,
            deleted: row.try_get("deleted")?,
            actor: row.try_get("actor")?,
            reason: row.try_get("reason")?,
        })
    }
}

impl VersionRow {
    pub fn to_version(&self) -> Result<ItemVersion> {
        Ok(ItemVersion {
            id: OpaqueId::from_hex(&self.id).map_err(|e| Error::Decode(e.to_string()))?,
            item_id: OpaqueId::from_hex(&self.item_id).map_err(|e| Error::Decode(e.to_string()))?,
            collection: self.collection.clone(),
            ov: self.ov as u64,
            payload: self.payload.clone(),
            hash: self.hash.clone(),
            created_at: self.created_at,
            deleted: self.deleted,
            actor: self.actor.clone(),
            reason: self.reason.clone(),
        })
    }

    pub fn from_version(version: &ItemVersion) -> Self {
        VersionRow {
            id: version.id.to_hex(),
            collection: version.collection.clone(),
            item_id: version.item_id.to_hex(),
            ov: version.ov as i64,
            payload: version.payload.clone(),
            hash: version.hash.clone(),
            created_at: version.created_at,
            deleted: version.deleted,
            actor: version.actor.clone(),
            reason: version.reason.clone(),
        }
    }
}

pub struct FallbackRow {
    pub id: String,
    pub collection: String,
    pub item_id: String,
    pub kind: String,
    pub payload: serde_json::Value,
    pub attempts: i32,
    pub next_attempt_at: i64,
    pub created_at: i64,
    pub last_error: Option<String>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for FallbackRow {
    fn from_row(row: &'r PgRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(FallbackRow {
            id: row.try_get("id")?,
            collection: row.try_get("collection")?,
            item_id: row.try_get("item_id")?,
            kind: row.try_get("kind")?,
            payload: row.try_get("payload")?,
            attempts: row.try_get("attempts")?,
            next_attempt_at: row.try_get("next_attempt_at")?,
            created_at: row.try_get("created_at")?,
            last_error: row.try_get("last_error")?,
        })
    }
}

fn kind_to_str(kind: FallbackOpKind) -> &'static str {
    match kind {
        FallbackOpKind::Create => "create",
        FallbackOpKind::Update => "update",
        FallbackOpKind::Delete => "delete",
        FallbackOpKind::Enrich => "enrich",
    }
}

fn kind_from_str(kind: &str) -> Result<FallbackOpKind> {
    match kind {
        "create" => Ok(FallbackOpKind::Create),
        "update" => Ok(FallbackOpKind::Update),
        "delete" => Ok(FallbackOpKind::Delete),
        "enrich" => Ok(FallbackOpKind::Enrich),
        other => Err(Error::Decode(format!("unknown fallback op kind '{other}'"))),
    }
}

impl FallbackRow {
    pub fn to_op(&self) -> Result<FallbackOp> {
        Ok(FallbackOp {
            id: OpaqueId::from_hex(&self.id).map_err(|e| Error::Decode(e.to_string()))?,
            collection: self.collection.clone(),
            item_id: OpaqueId::from_hex(&self.item_id).map_err(|e| Error::Decode(e.to_string()))?,
            kind: kind_from_str(&self.kind)?,
            payload: self.payload.clone(),
            attempts: self.attempts as u32,
            next_attempt_at: self.next_attempt_at,
            created_at: self.created_at,
            last_error: self.last_error.clone(),
        })
    }

    pub fn from_op(op: &FallbackOp) -> Self {
        FallbackRow {
            id: op.id.to_hex(),
            collection: op.collection.clone(),
            item_id: op.item_id.to_hex(),
            kind: kind_to_str(op.kind).to_string(),
            payload: op.payload.clone(),
            attempts: op.attempts as i32,
            next_attempt_at: op.next_attempt_at,
            created_at: op.created_at,
            last_error: op.last_error.clone(),
        }
    }
}
