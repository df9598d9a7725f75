//! Top-level error type, composing every crate this facade wires together —
//! the same shape as the reference server's `AppError`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] chronos_core::Error),

    #[error(transparent)]
    Postgres(#[from] chronos_postgres::Error),

    #[error(transparent)]
    ObjectStore(#[from] chronos_objectstore::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
