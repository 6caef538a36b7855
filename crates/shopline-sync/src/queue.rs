//! # Sync Queue Manager
//!
//! The only writer of queue items. Every status change goes through a
//! guarded transition from `shopline_core::state`, is persisted, and then
//! refreshes the aggregate counts.
//!
//! ## Mutation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  caller ──► mark_xxx(id) ──► lock ──► store.get(id) ──► transition      │
//! │                                                     │       │           │
//! │                         ItemNotFound ◄── absent ────┘       │           │
//! │                         InvalidTransition ◄── wrong state ──┤           │
//! │                                                             ▼           │
//! │                                        store.put(item) ──► unlock       │
//! │                                                             │           │
//! │                                   refresh_counts() ◄────────┘           │
//! │                                     │                                   │
//! │                                     ├──► watch::Sender<QueueCounts>     │
//! │                                     └──► emitter.emit_counts            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Transitions called from the wrong source state are rejected with
//! `CoreError::InvalidTransition`; nothing is written in that case.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shopline_core::state::sort_for_processing;
use shopline_core::validation::validate_operation;
use shopline_core::{
    ConflictData, ConflictType, CoreResult, EntityType, OfflineTransaction, Operation, Priority,
    QueueCounts, QueueItem, QueueStatus, LOCAL_ID_PREFIX,
};
use shopline_db::QueueStore;

use crate::config::SharedSettings;
use crate::error::{SyncError, SyncResult};
use crate::events::SyncEventEmitter;

/// Error recorded on items found mid-attempt at start-up.
pub const INTERRUPTED_ERROR: &str = "Interrupted before the server confirmed";

// =============================================================================
// Enqueue Request
// =============================================================================

/// What a producer hands to [`SyncQueueManager::enqueue`].
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub operation: Operation,
    pub entity_type: Option<EntityType>,
    pub priority: Priority,
    pub user_id: Option<String>,
}

impl EnqueueRequest {
    pub fn new(operation: Operation) -> Self {
        EnqueueRequest {
            operation,
            entity_type: None,
            priority: Priority::default(),
            user_id: None,
        }
    }

    /// Overrides the entity type derived from the operation.
    pub fn entity_type(mut self, entity_type: EntityType) -> Self {
        self.entity_type = Some(entity_type);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

impl From<Operation> for EnqueueRequest {
    fn from(operation: Operation) -> Self {
        EnqueueRequest::new(operation)
    }
}

// =============================================================================
// Sync Queue Manager
// =============================================================================

pub struct SyncQueueManager {
    store: QueueStore,
    settings: SharedSettings,
    emitter: Arc<dyn SyncEventEmitter>,
    counts_tx: watch::Sender<QueueCounts>,
    /// Serializes read-modify-write cycles on items.
    write_lock: Mutex<()>,
}

impl SyncQueueManager {
    pub fn new(store: QueueStore, settings: SharedSettings, emitter: Arc<dyn SyncEventEmitter>) -> Self {
        let (counts_tx, _) = watch::channel(QueueCounts::default());

        SyncQueueManager {
            store,
            settings,
            emitter,
            counts_tx,
            write_lock: Mutex::new(()),
        }
    }

    // =========================================================================
    // Producers
    // =========================================================================

    /// Validates and persists a new `pending` item.
    ///
    /// Not deduplicating: two calls with the same payload are two items.
    pub async fn enqueue(&self, request: impl Into<EnqueueRequest>) -> SyncResult<QueueItem> {
        let request = request.into();
        validate_operation(&request.operation)?;

        let max_retries = self.settings.read().await.max_retries;
        let entity_type = request
            .entity_type
            .unwrap_or_else(|| request.operation.kind().default_entity_type());
        let id = format!("{}{}", LOCAL_ID_PREFIX, Uuid::new_v4());

        let mut item = QueueItem::new(
            id,
            request.operation,
            entity_type,
            request.priority,
            max_retries,
            Utc::now(),
        );
        if let Some(user_id) = request.user_id {
            item = item.with_user(user_id);
        }

        self.store.put(&item).await?;
        info!(
            item_id = %item.id,
            operation = %item.operation_type(),
            priority = %item.priority,
            "Operation queued"
        );

        self.refresh_counts().await;
        Ok(item)
    }

    // =========================================================================
    // Guarded Transitions
    // =========================================================================

    async fn transition<F>(&self, id: &str, apply: F) -> SyncResult<QueueItem>
    where
        F: FnOnce(&mut QueueItem) -> CoreResult<()>,
    {
        let item = {
            let _guard = self.write_lock.lock().await;
            let mut item = self.load(id).await?;
            apply(&mut item)?;
            self.store.put(&item).await?;
            item
        };

        debug!(item_id = %item.id, status = %item.status(), "Queue item updated");
        self.refresh_counts().await;
        Ok(item)
    }

    async fn load(&self, id: &str) -> SyncResult<QueueItem> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| SyncError::ItemNotFound(id.to_string()))
    }

    /// `pending → syncing`.
    pub async fn mark_syncing(&self, id: &str) -> SyncResult<QueueItem> {
        self.transition(id, |item| item.begin_sync(Utc::now())).await
    }

    /// `syncing → synced`.
    pub async fn mark_synced(&self, id: &str, server_id: &str) -> SyncResult<QueueItem> {
        self.transition(id, |item| item.complete(server_id)).await
    }

    /// `syncing → pending | failed`, depending on the remaining budget.
    pub async fn mark_failed(&self, id: &str, error: &str) -> SyncResult<QueueItem> {
        let item = self
            .transition(id, |item| item.record_failure(error, Utc::now()).map(|_| ()))
            .await?;

        if item.status() == QueueStatus::Failed {
            warn!(
                item_id = %item.id,
                retries = item.retry_count(),
                error = %error,
                "Retry budget spent; waiting for manual retry"
            );
        }
        Ok(item)
    }

    /// `syncing → conflict`, snapshotting the local operation.
    pub async fn mark_conflict(
        &self,
        id: &str,
        conflict_type: ConflictType,
        description: &str,
        server_snapshot: Option<Value>,
    ) -> SyncResult<QueueItem> {
        let item = self
            .transition(id, |item| {
                let local = serde_json::to_value(&item.operation).unwrap_or(Value::Null);
                let conflict = ConflictData::new(
                    conflict_type,
                    description,
                    local,
                    server_snapshot,
                    Utc::now(),
                );
                item.flag_conflict(conflict)
            })
            .await?;

        warn!(item_id = %item.id, conflict = %conflict_type, "Business conflict recorded");
        Ok(item)
    }

    /// `failed → pending` with a fresh retry budget.
    pub async fn manual_retry(&self, id: &str) -> SyncResult<QueueItem> {
        self.transition(id, |item| item.manual_retry()).await
    }

    /// `conflict → pending`, optionally swapping in a replacement payload.
    pub async fn requeue_conflict(&self, id: &str, replacement: Option<Operation>) -> SyncResult<QueueItem> {
        if let Some(ref operation) = replacement {
            validate_operation(operation)?;
        }
        self.transition(id, |item| item.requeue_resolved(replacement)).await
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// Returns false if there was nothing to remove.
    pub async fn remove_item(&self, id: &str) -> SyncResult<bool> {
        let removed = {
            let _guard = self.write_lock.lock().await;
            self.store.delete(id).await?
        };

        if removed {
            info!(item_id = %id, "Queue item removed");
            self.refresh_counts().await;
        }
        Ok(removed)
    }

    /// Deletes a `conflict` item and returns it.
    ///
    /// The status check and the delete share one write-lock hold, so an item
    /// re-queued in between is never dropped.
    pub async fn discard_conflict(&self, id: &str) -> SyncResult<QueueItem> {
        let item = {
            let _guard = self.write_lock.lock().await;
            let item = self.load(id).await?;
            if item.status() != QueueStatus::Conflict {
                return Err(SyncError::NotInConflict {
                    id: id.to_string(),
                    status: item.status(),
                });
            }
            self.store.delete(id).await?;
            item
        };

        info!(item_id = %id, "Conflicted item discarded");
        self.refresh_counts().await;
        Ok(item)
    }

    /// Removes every `synced` item. Other statuses are never touched.
    pub async fn prune_synced(&self) -> SyncResult<u64> {
        let pruned = {
            let _guard = self.write_lock.lock().await;
            self.store.delete_synced().await?
        };

        if pruned > 0 {
            debug!(pruned, "Pruned synced items");
            self.refresh_counts().await;
        }
        Ok(pruned)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get(&self, id: &str) -> SyncResult<Option<QueueItem>> {
        Ok(self.store.get(id).await?)
    }

    /// `pending` ∪ `failed`, high priority first, oldest first.
    pub async fn get_pending(&self) -> SyncResult<Vec<QueueItem>> {
        let mut items = self.store.get_by_status(QueueStatus::Pending).await?;
        items.extend(self.store.get_by_status(QueueStatus::Failed).await?);
        sort_for_processing(&mut items);
        Ok(items)
    }

    pub async fn get_conflicts(&self) -> SyncResult<Vec<QueueItem>> {
        Ok(self.store.get_by_status(QueueStatus::Conflict).await?)
    }

    /// Every item, oldest first.
    pub async fn get_all(&self) -> SyncResult<Vec<QueueItem>> {
        let mut items = self.store.get_all().await?;
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(items)
    }

    /// Display projection of every item not yet synced, newest first.
    pub async fn get_offline_transactions(&self) -> SyncResult<Vec<OfflineTransaction>> {
        let mut items: Vec<QueueItem> = self
            .store
            .get_all()
            .await?
            .into_iter()
            .filter(|item| item.status() != QueueStatus::Synced)
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(items.iter().map(OfflineTransaction::from).collect())
    }

    // =========================================================================
    // Aggregate Counts
    // =========================================================================

    /// Recomputes the counts from the store and publishes them.
    pub async fn counts(&self) -> SyncResult<QueueCounts> {
        let counts = QueueCounts::from_pairs(self.store.count_by_status().await?);
        self.counts_tx.send_replace(counts);
        self.emitter.emit_counts(&counts);
        Ok(counts)
    }

    /// Last published counts, without touching the store.
    pub fn current_counts(&self) -> QueueCounts {
        *self.counts_tx.borrow()
    }

    pub fn subscribe_counts(&self) -> watch::Receiver<QueueCounts> {
        self.counts_tx.subscribe()
    }

    /// Like [`SyncQueueManager::counts`], but a store failure only logs.
    pub async fn refresh_counts(&self) {
        if let Err(e) = self.counts().await {
            warn!(error = %e, "Failed to refresh queue counts");
        }
    }

    // =========================================================================
    // Recovery and Bookkeeping
    // =========================================================================

    /// Routes items left in `syncing` by a crash through `mark_failed`.
    ///
    /// Returns how many items were recovered.
    pub async fn recover_interrupted(&self) -> SyncResult<usize> {
        let stuck = self.store.get_by_status(QueueStatus::Syncing).await?;
        for item in &stuck {
            self.mark_failed(&item.id, INTERRUPTED_ERROR).await?;
        }

        if !stuck.is_empty() {
            info!(count = stuck.len(), "Recovered interrupted queue items");
        }
        Ok(stuck.len())
    }

    pub async fn last_sync_time(&self) -> SyncResult<Option<DateTime<Utc>>> {
        Ok(self.store.get_last_sync_time().await?)
    }

    pub async fn record_sync_time(&self, ts: DateTime<Utc>) -> SyncResult<()> {
        Ok(self.store.put_last_sync_time(ts).await?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
