//! SQLite-backed [`KvStore`] implementation.
//!
//! Each history partition is one row in `kv_partitions`, keyed by the
//! category's storage key. The payload is stored verbatim; parsing and
//! corruption handling stay in the history store.
//!
//! [`KvStore::update`] runs inside a `BEGIN IMMEDIATE` transaction, which
//! takes the database write lock before the read. A second process saving
//! to the same partition waits for the lock (see [`db::BUSY_TIMEOUT`]) and
//! then reads the committed result, so no insert is lost.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;

use verity_core::store::{KvStore, PartitionUpdate};
use verity_core::AnalysisHistory;

use crate::config::Config;
use crate::{db, migrate};

const SELECT_PAYLOAD: &str = "SELECT payload FROM kv_partitions WHERE key = ?";

const UPSERT_PAYLOAD: &str = r#"
    INSERT INTO kv_partitions (key, payload, updated_at)
    VALUES (?, ?, ?)
    ON CONFLICT(key) DO UPDATE SET
        payload = excluded.payload,
        updated_at = excluded.updated_at
"#;

/// SQLite implementation of the [`KvStore`] trait.
pub struct SqliteKvStore {
    pool: SqlitePool,
}

impl SqliteKvStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let payload: Option<String> = sqlx::query_scalar(SELECT_PAYLOAD)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(payload)
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(UPSERT_PAYLOAD)
            .bind(key)
            .bind(value)
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update(&self, key: &str, apply: PartitionUpdate<'_>) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        match read_modify_write(&mut conn, key, apply).await {
            Ok(()) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(())
            }
            Err(e) => {
                let rollback = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                if let Err(rollback) = rollback {
                    log::error!("rollback of {} update failed: {}", key, rollback);
                    drop(conn.detach());
                }
                Err(e)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_partitions WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

async fn read_modify_write(
    conn: &mut SqliteConnection,
    key: &str,
    apply: PartitionUpdate<'_>,
) -> Result<()> {
    let current: Option<String> = sqlx::query_scalar(SELECT_PAYLOAD)
        .bind(key)
        .fetch_optional(&mut *conn)
        .await?;
    let next = apply(current)?;
    sqlx::query(UPSERT_PAYLOAD)
        .bind(key)
        .bind(next)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Open the durable history configured in `[db]`, creating the schema if
/// needed.
pub async fn open_history(config: &Config) -> Result<AnalysisHistory> {
    let pool = db::connect(config).await?;
    migrate::migrate_pool(&pool).await?;
    Ok(AnalysisHistory::new(Arc::new(SqliteKvStore::new(pool))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use verity_core::{Category, ResultFields, Scores};

    fn test_config(tmp: &TempDir) -> Config {
        let mut config = Config::default();
        config.db.path = tmp.path().join("data").join("verity.sqlite");
        config
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let tmp = TempDir::new().unwrap();
        let pool = db::connect(&test_config(&tmp)).await.unwrap();
        migrate::migrate_pool(&pool).await.unwrap();
        let store = SqliteKvStore::new(pool);

        assert_eq!(store.get("k").await.unwrap(), None);
        store.put("k", "[1]").await.unwrap();
        store.put("k", "[2]").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("[2]"));
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_update_is_applied_to_stored_value() {
        let tmp = TempDir::new().unwrap();
        let pool = db::connect(&test_config(&tmp)).await.unwrap();
        migrate::migrate_pool(&pool).await.unwrap();
        let store = SqliteKvStore::new(pool);

        store.put("k", "a").await.unwrap();
        store
            .update("k", Box::new(|current| Ok(format!("{}b", current.unwrap_or_default()))))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("ab"));

        let failed = store
            .update("k", Box::new(|_| Err(anyhow::anyhow!("rejected"))))
            .await;
        assert!(failed.is_err());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("ab"));

        // The connection went back to the pool outside any transaction.
        store.put("k", "c").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("c"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_two_handles_on_one_file_lose_no_saves() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        let server = Arc::new(open_history(&config).await.unwrap());
        let cli = Arc::new(open_history(&config).await.unwrap());

        let mut tasks = Vec::new();
        for i in 0..8 {
            let history = if i % 2 == 0 { server.clone() } else { cli.clone() };
            tasks.push(tokio::spawn(async move {
                let fields = ResultFields {
                    description: Some(format!("save {}", i)),
                    ..ResultFields::default()
                };
                history.save_to(Category::Image, fields).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let records = server.load(Category::Image).await;
        assert_eq!(records.len(), 8);
        for i in 0..8 {
            let description = format!("save {}", i);
            assert!(records
                .iter()
                .any(|r| r.description.as_deref() == Some(description.as_str())));
        }
        assert_eq!(cli.load(Category::Image).await.len(), 8);
    }

    #[tokio::test]
    async fn test_history_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);

        let history = open_history(&config).await.unwrap();
        let fields = ResultFields {
            scores: Scores {
                misinfo_confidence: Some(82.0),
                ..Scores::default()
            },
            source_text: Some("Drinking seawater cures every known disease".to_string()),
            ..ResultFields::default()
        };
        history.save_to(Category::Misinfo, fields).await.unwrap();
        drop(history);

        let reopened = open_history(&config).await.unwrap();
        let records = reopened.load(Category::Misinfo).await;
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].source_excerpt.as_deref(),
            Some("Drinking seawater cures every known disease")
        );
        assert_eq!(reopened.stats().await.total, 1);
    }
}
