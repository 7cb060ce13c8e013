//! Database schema migrations.
//!
//! Every statement is idempotent; running `verity init` twice is safe.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Connect to the configured database and create the schema.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the schema on an already open pool.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    // One row per history partition; the payload is the serialized list.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS kv_partitions (
            key TEXT PRIMARY KEY,
            payload TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
