//! Adapter-local error type, composed into [`chronos_core::error::Error`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("object store error: {0}")]
    Backend(#[from] object_store::Error),

    #[error("json decode error for key {key}: {source}")]
    Decode { key: String, source: serde_json::Error },

    #[error("presigned URLs are not supported by this backend")]
    PresignUnsupported,

    #[error("invalid object store url: {0}")]
    InvalidUrl(String),
}

impl From<Error> for chronos_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::PresignUnsupported => chronos_core::Error::ExternalizationError(err.to_string()),
            other => chronos_core::Error::ExternalizationError(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
