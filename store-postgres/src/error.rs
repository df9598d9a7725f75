//! Adapter-local error type, composed into [`chronos_core::error::Error`] at
//! the crate boundary the same way the reference server's `AppError` wraps
//! `sqlx::Error` and `carry_engine::Error`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("malformed stored row: {0}")]
    Decode(String),
}

impl From<Error> for chronos_core::Error {
    fn from(err: Error) -> Self {
        chronos_core::Error::StorageError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
