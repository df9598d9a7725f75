//! Error taxonomy for the persistence engine.

use thiserror::Error;

use crate::model::Version;

/// All errors the engine surfaces to callers of [`crate::bound_ops::BoundOps`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("optimistic lock failed on {collection}/{id}: expected ov {expected}, found {actual}")]
    OptimisticLock {
        collection: String,
        id: String,
        expected: Version,
        actual: Version,
    },

    #[error("no route for tenant={tenant:?} domain={domain:?} collection={collection}")]
    RouteNotFound {
        tenant: Option<String>,
        domain: Option<String>,
        collection: String,
    },

    #[error("config reference missing: {0}")]
    ConfigRefMissing(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("transaction error: {0}")]
    TxnError(String),

    #[error("externalization error: {0}")]
    ExternalizationError(String),

    #[error("operation queued for retry: {0}")]
    Queued(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::ValidationError(msg.into())
    }

    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Error::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Whether this error represents a condition a caller could usefully
    /// retry (as opposed to a permanent validation/not-found failure).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::StorageError(_) | Error::TxnError(_) | Error::ExternalizationError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
