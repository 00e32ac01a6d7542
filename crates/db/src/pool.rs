//! Postgres connection pool and schema migrations.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::DbError;

/// Shared Postgres pool backing [`crate::PgRunSink`].
pub type DbPool = PgPool;

/// Open a pool against `database_url` with at most `max_connections`.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, DbError> {
    info!(max_connections, "connecting to run store");
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Apply the `runs` / `run_steps` schema from the workspace `migrations/`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), DbError> {
    info!("applying run store migrations");
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}

/// Open a pool and bring the schema up to date.
pub async fn connect_and_migrate(
    database_url: &str,
    max_connections: u32,
) -> Result<DbPool, DbError> {
    let pool = create_pool(database_url, max_connections).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}
