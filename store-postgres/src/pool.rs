//! Connection pool setup, mirroring the reference server's `db::pool`.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::Result;

pub type Pool = PgPool;

pub async fn create_pool(database_url: &str) -> Result<Pool> {
    Ok(PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?)
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
