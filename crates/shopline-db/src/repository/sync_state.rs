//! # Sync State Repository
//!
//! Small key/value table for singleton records: the persisted sync
//! configuration and the last successful sync time.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;

/// Repository for `sync_state` records.
#[derive(Debug, Clone)]
pub struct SyncStateRepository {
    pool: SqlitePool,
}

impl SyncStateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SyncStateRepository { pool }
    }

    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM sync_state WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value)
    }

    pub async fn put(&self, key: &str, value: &str) -> DbResult<()> {
        debug!(key = %key, "Writing sync state record");

        sqlx::query(
            r#"
            INSERT INTO sync_state (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_put_overwrites() {
        let repo = Database::new(DbConfig::in_memory()).await.unwrap().sync_state();

        assert!(repo.get("last_sync_time").await.unwrap().is_none());
        repo.put("last_sync_time", "a").await.unwrap();
        repo.put("last_sync_time", "b").await.unwrap();
        assert_eq!(repo.get("last_sync_time").await.unwrap().as_deref(), Some("b"));
    }
}
