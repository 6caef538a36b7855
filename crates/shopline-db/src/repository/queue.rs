//! # Queue Item Repository
//!
//! Persistence for [`QueueItem`] records.
//!
//! ## Row Layout
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │ queue_items                                                              │
//! │                                                                          │
//! │  id ─────────────── PRIMARY KEY (local-<uuid>)                           │
//! │  operation_type ─┐                                                       │
//! │  payload ────────┴─ Operation, split into tag + JSON payload             │
//! │  status ────────── indexed with (priority_rank, created_at)              │
//! │  conflict_data ─── JSON, NOT NULL exactly when status = 'conflict'       │
//! │  ...                                                                     │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Writes are upserts keyed by `id`: the same call stores a new item and
//! every later transition of it.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use shopline_core::{
    ConflictData, EntityType, ItemState, Operation, Priority, QueueItem, QueueStatus,
};

/// Raw `queue_items` row.
#[derive(Debug, FromRow)]
struct QueueItemRow {
    id: String,
    operation_type: String,
    entity_type: EntityType,
    payload: String,
    status: QueueStatus,
    priority: Priority,
    retry_count: i64,
    max_retries: i64,
    created_at: DateTime<Utc>,
    last_attempt_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    conflict_data: Option<String>,
    server_id: Option<String>,
    user_id: Option<String>,
}

impl QueueItemRow {
    fn into_item(self) -> DbResult<QueueItem> {
        let payload: Value =
            serde_json::from_str(&self.payload).map_err(|e| DbError::corrupt(&self.id, e))?;
        let operation = join_operation(&self.operation_type, payload)
            .map_err(|e| DbError::corrupt(&self.id, e))?;

        let conflict = match self.conflict_data.as_deref() {
            Some(json) => Some(
                serde_json::from_str::<ConflictData>(json)
                    .map_err(|e| DbError::corrupt(&self.id, e))?,
            ),
            None => None,
        };

        let state = ItemState {
            status: self.status,
            retry_count: self.retry_count.max(0) as u32,
            last_attempt_at: self.last_attempt_at,
            last_error: self.last_error,
            conflict,
            server_id: self.server_id,
        };

        let mut item = QueueItem::new(
            self.id.clone(),
            operation,
            self.entity_type,
            self.priority,
            self.max_retries.max(0) as u32,
            self.created_at,
        );
        item.user_id = self.user_id;
        item.restored(state).map_err(|e| DbError::corrupt(&self.id, e))
    }
}

/// Splits an operation into its tag and the JSON of its payload.
fn split_operation(operation: &Operation) -> DbResult<(String, String)> {
    let mut value = serde_json::to_value(operation)?;
    let payload = value
        .get_mut("payload")
        .map(Value::take)
        .unwrap_or(Value::Null);
    Ok((operation.kind().to_string(), payload.to_string()))
}

fn join_operation(operation_type: &str, payload: Value) -> Result<Operation, serde_json::Error> {
    serde_json::from_value(serde_json::json!({
        "operationType": operation_type,
        "payload": payload,
    }))
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, operation_type, entity_type, payload, status, priority,
           retry_count, max_retries, created_at, last_attempt_at, last_error,
           conflict_data, server_id, user_id
    FROM queue_items
"#;

/// Repository for queue items.
#[derive(Debug, Clone)]
pub struct QueueItemRepository {
    pool: SqlitePool,
}

impl QueueItemRepository {
    pub fn new(pool: SqlitePool) -> Self {
        QueueItemRepository { pool }
    }

    /// Inserts or overwrites the item with the same id.
    pub async fn upsert(&self, item: &QueueItem) -> DbResult<()> {
        let (operation_type, payload) = split_operation(&item.operation)?;
        let conflict_data = item
            .conflict()
            .map(serde_json::to_string)
            .transpose()?;

        debug!(id = %item.id, status = %item.status(), "Persisting queue item");

        sqlx::query(
            r#"
            INSERT INTO queue_items (
                id, operation_type, entity_type, payload, status, priority,
                priority_rank, retry_count, max_retries, created_at,
                last_attempt_at, last_error, conflict_data, server_id, user_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ON CONFLICT(id) DO UPDATE SET
                operation_type = excluded.operation_type,
                entity_type = excluded.entity_type,
                payload = excluded.payload,
                status = excluded.status,
                priority = excluded.priority,
                priority_rank = excluded.priority_rank,
                retry_count = excluded.retry_count,
                max_retries = excluded.max_retries,
                last_attempt_at = excluded.last_attempt_at,
                last_error = excluded.last_error,
                conflict_data = excluded.conflict_data,
                server_id = excluded.server_id,
                user_id = excluded.user_id
            "#,
        )
        .bind(&item.id)
        .bind(operation_type)
        .bind(item.entity_type)
        .bind(payload)
        .bind(item.status())
        .bind(item.priority)
        .bind(item.priority.rank() as i64)
        .bind(item.retry_count() as i64)
        .bind(item.max_retries as i64)
        .bind(item.created_at)
        .bind(item.last_attempt_at())
        .bind(item.last_error())
        .bind(conflict_data)
        .bind(item.server_id())
        .bind(&item.user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<QueueItem>> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
        let row: Option<QueueItemRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(QueueItemRow::into_item).transpose()
    }

    /// All items, in no particular order.
    pub async fn list_all(&self) -> DbResult<Vec<QueueItem>> {
        let rows: Vec<QueueItemRow> = sqlx::query_as(SELECT_COLUMNS)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(QueueItemRow::into_item).collect()
    }

    /// Items with `status`, served by the status index.
    pub async fn list_by_status(&self, status: QueueStatus) -> DbResult<Vec<QueueItem>> {
        let sql = format!("{SELECT_COLUMNS} WHERE status = ?1 ORDER BY priority_rank, created_at");
        let rows: Vec<QueueItemRow> = sqlx::query_as(&sql)
            .bind(status)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(QueueItemRow::into_item).collect()
    }

    /// Deletes one item. Returns whether a row was removed.
    pub async fn delete(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM queue_items WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes every item with `status`. Returns the number removed.
    pub async fn delete_by_status(&self, status: QueueStatus) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM queue_items WHERE status = ?1")
            .bind(status)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// `(status, count)` for every status present.
    pub async fn count_by_status(&self) -> DbResult<Vec<(QueueStatus, u32)>> {
        let rows: Vec<(QueueStatus, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM queue_items GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(status, n)| (status, n.max(0) as u32))
            .collect())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
