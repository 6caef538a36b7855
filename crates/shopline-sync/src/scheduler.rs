//! # Sync Scheduler
//!
//! Decides when a sync pass runs and drives it to completion. Passes never
//! overlap.
//!
//! ## Trigger Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  reconnect edge ──┐                                                     │
//! │                   ├──► request_sync() ──► (abort previous timer)        │
//! │  manual trigger ──┘          │                                          │
//! │                              ▼                                          │
//! │                    sleep(auto_sync_delay)                               │
//! │                              │                                          │
//! │              auto-sync off or offline? ──► drop                         │
//! │                              │                                          │
//! │                              ▼                                          │
//! │  operator ───────────► sync_now() ──► in-flight? ──► SyncInProgress     │
//! │                              │                                          │
//! │                              ▼                                          │
//! │   ┌──────────────────────────────────────────────────────────────┐      │
//! │   │ PASS: snapshot pending items (priority, then age)            │      │
//! │   │   for batch in chunks(sync_batch_size):                      │      │
//! │   │     for item in batch:            (strictly sequential)      │      │
//! │   │       offline? ──► stop, ConnectionLost, rest stay pending   │      │
//! │   │       mark_syncing ─► dispatch ─► synced | conflict | failed │      │
//! │   │       store unreachable? ──► stop the same way               │      │
//! │   │     sleep(batch_delay)                                       │      │
//! │   │ record last sync time, prune synced, publish BatchResult     │      │
//! │   └──────────────────────────────────────────────────────────────┘      │
//! │                              │                                          │
//! │                  in-flight flag cleared by guard drop                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Items parked in `failed` are left out of the pass; they go back to
//! `pending` through [`SyncScheduler::retry_item`].

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use shopline_core::{ConflictType, CoreError, QueueStatus};

use crate::config::SharedSettings;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{SyncError, SyncResult};
use crate::events::SyncEventEmitter;
use crate::handlers::{self, HandlerOutcome};
use crate::queue::SyncQueueManager;
use crate::remote::RemoteStore;

// =============================================================================
// Pass Reporting
// =============================================================================

/// What asked for a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// Connectivity came back.
    Reconnect,
    /// The operator or a producer asked for one.
    Manual,
}

/// Position within the running pass. All zero when idle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgress {
    pub current: u32,
    pub total: u32,
    pub item_id: Option<String>,
}

/// Summary of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub total_items: u32,
    pub synced_items: u32,
    pub failed_items: u32,
    pub conflict_items: u32,
    /// `"<item id>: <error>"` per failed item, plus pass-level errors.
    pub errors: Vec<String>,
    /// `"<item id>: <conflict type>"` per new conflict.
    pub conflicts: Vec<String>,
}

impl BatchResult {
    /// Returns true if every attempted item synced.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.failed_items == 0 && self.conflict_items == 0
    }
}

/// Result of processing one item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Synced {
        server_id: String,
    },
    Conflict {
        conflict_type: ConflictType,
    },
    Failed {
        /// `pending` while retries remain, `failed` once spent.
        status: QueueStatus,
        message: String,
        unreachable: bool,
    },
    /// Not attempted now (offline, a pass is running, or the item moved on).
    Deferred,
}

/// Clears the in-flight flag on every exit path.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// =============================================================================
// Sync Scheduler
// =============================================================================

pub struct SyncScheduler {
    queue: Arc<SyncQueueManager>,
    remote: Arc<dyn RemoteStore>,
    connectivity: Arc<ConnectivityMonitor>,
    settings: SharedSettings,
    emitter: Arc<dyn SyncEventEmitter>,
    in_flight: AtomicBool,
    /// The debounce timer of the latest trigger.
    pending_trigger: Mutex<Option<JoinHandle<()>>>,
    progress_tx: watch::Sender<SyncProgress>,
    last_result: Mutex<Option<BatchResult>>,
}

impl SyncScheduler {
    pub fn new(
        queue: Arc<SyncQueueManager>,
        remote: Arc<dyn RemoteStore>,
        connectivity: Arc<ConnectivityMonitor>,
        settings: SharedSettings,
        emitter: Arc<dyn SyncEventEmitter>,
    ) -> Self {
        let (progress_tx, _) = watch::channel(SyncProgress::default());

        SyncScheduler {
            queue,
            remote,
            connectivity,
            settings,
            emitter,
            in_flight: AtomicBool::new(false),
            pending_trigger: Mutex::new(None),
            progress_tx,
            last_result: Mutex::new(None),
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<SyncProgress> {
        self.progress_tx.subscribe()
    }

    /// Summary of the most recent completed pass.
    pub fn last_result(&self) -> Option<BatchResult> {
        self.last_result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn try_begin(&self) -> Option<PassGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| PassGuard(&self.in_flight))
    }

    // =========================================================================
    // Triggers
    // =========================================================================

    /// Schedules a pass after `auto_sync_delay`, replacing any pending one.
    ///
    /// At fire time the pass is dropped if auto-sync is off or the monitor
    /// reports offline. A pass already running is never cancelled here.
    pub fn request_sync(self: &Arc<Self>, trigger: SyncTrigger) {
        let scheduler = Arc::clone(self);

        let timer = tokio::spawn(async move {
            let delay = scheduler.settings.read().await.auto_sync_delay();
            tokio::time::sleep(delay).await;

            if !scheduler.settings.read().await.auto_sync_enabled {
                debug!(?trigger, "Auto-sync disabled, trigger dropped");
                return;
            }
            if !scheduler.connectivity.is_online() {
                debug!(?trigger, "Offline at fire time, trigger dropped");
                return;
            }

            // Detached so aborting a later timer cannot cancel the pass
            let pass = Arc::clone(&scheduler);
            tokio::spawn(async move {
                match pass.sync_now().await {
                    Ok(_) => {}
                    Err(SyncError::SyncInProgress) => {
                        debug!(?trigger, "Pass already running");
                    }
                    Err(e) => {
                        warn!(?trigger, error = %e, "Triggered sync failed");
                    }
                }
            });
        });

        let mut pending = self
            .pending_trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.replace(timer) {
            previous.abort();
        }
        debug!(?trigger, "Sync scheduled");
    }

    /// Drops a scheduled but not yet fired trigger.
    pub fn cancel_pending_trigger(&self) {
        let pending = self
            .pending_trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(timer) = pending {
            timer.abort();
        }
    }

    // =========================================================================
    // Sync Pass
    // =========================================================================

    /// Runs a pass now, ignoring the auto-sync setting.
    ///
    /// ## Errors
    /// - [`SyncError::SyncInProgress`] if a pass is already running
    /// - [`SyncError::Offline`] if the monitor reports offline
    /// - storage errors reading the snapshot
    pub async fn sync_now(&self) -> SyncResult<BatchResult> {
        let Some(_guard) = self.try_begin() else {
            return Err(SyncError::SyncInProgress);
        };
        if !self.connectivity.is_online() {
            return Err(SyncError::Offline);
        }

        let result = self.run_pass().await;
        self.progress_tx.send_replace(SyncProgress::default());

        match &result {
            Ok(batch) => {
                *self
                    .last_result
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(batch.clone());
                self.emitter.emit_batch_result(batch);
            }
            Err(e) => {
                warn!(error = %e, "Sync pass aborted");
                self.emitter.emit_error(&e.to_string(), e.is_retryable());
            }
        }
        result
    }

    async fn run_pass(&self) -> SyncResult<BatchResult> {
        let settings = self.settings.read().await.clone();
        let items: Vec<String> = self
            .queue
            .get_pending()
            .await?
            .into_iter()
            // Failed items have no syncing edge; retry_item brings them back
            // through manual_retry.
            .filter(|item| item.status() == QueueStatus::Pending)
            .map(|item| item.id)
            .collect();

        let total = items.len() as u32;
        let mut result = BatchResult {
            total_items: total,
            ..Default::default()
        };

        if items.is_empty() {
            debug!("Nothing to sync");
            self.queue.record_sync_time(Utc::now()).await?;
            return Ok(result);
        }

        info!(items = total, batch_size = settings.sync_batch_size, "Sync pass starting");

        let mut position = 0u32;
        let mut connection_lost = false;

        'batches: for (index, batch) in items.chunks(settings.batch_len()).enumerate() {
            if index > 0 && !settings.batch_delay().is_zero() {
                tokio::time::sleep(settings.batch_delay()).await;
            }

            for id in batch {
                if !self.connectivity.is_online() {
                    connection_lost = true;
                    break 'batches;
                }

                position += 1;
                let progress = SyncProgress {
                    current: position,
                    total,
                    item_id: Some(id.clone()),
                };
                self.emitter.emit_progress(&progress);
                self.progress_tx.send_replace(progress);

                match self.process(id).await {
                    Ok(ItemOutcome::Synced { .. }) => result.synced_items += 1,
                    Ok(ItemOutcome::Conflict { conflict_type }) => {
                        result.conflict_items += 1;
                        result.conflicts.push(format!("{}: {}", id, conflict_type));
                    }
                    Ok(ItemOutcome::Failed {
                        message,
                        unreachable,
                        ..
                    }) => {
                        result.failed_items += 1;
                        result.errors.push(format!("{}: {}", id, message));
                        // The monitor may stay online below its failure
                        // threshold; the pass stops either way.
                        if unreachable {
                            connection_lost = true;
                            break 'batches;
                        }
                    }
                    Ok(ItemOutcome::Deferred) => {}
                    Err(e) => {
                        warn!(item_id = %id, error = %e, "Failed to process queue item");
                        result.errors.push(format!("{}: {}", id, e));
                    }
                }
            }
        }

        if connection_lost {
            warn!(processed = position, total, "Connection lost, stopping sync pass");
            result.errors.push(SyncError::ConnectionLost.to_string());
        } else {
            self.queue.record_sync_time(Utc::now()).await?;
        }

        if let Err(e) = self.queue.prune_synced().await {
            warn!(error = %e, "Failed to prune synced items");
        }

        info!(
            synced = result.synced_items,
            failed = result.failed_items,
            conflicts = result.conflict_items,
            "Sync pass complete"
        );
        Ok(result)
    }

    /// `pending → syncing → (synced | conflict | pending | failed)` for one item.
    async fn process(&self, id: &str) -> SyncResult<ItemOutcome> {
        let item = match self.queue.mark_syncing(id).await {
            Ok(item) => item,
            // Changed or removed since the snapshot
            Err(SyncError::Core(CoreError::InvalidTransition { .. })) | Err(SyncError::ItemNotFound(_)) => {
                debug!(item_id = %id, "Item no longer pending, skipped");
                return Ok(ItemOutcome::Deferred);
            }
            Err(e) => return Err(e),
        };

        match handlers::dispatch(self.remote.as_ref(), &item).await {
            HandlerOutcome::Synced { server_id } => {
                self.connectivity.reset_failure_count();
                self.queue.mark_synced(id, &server_id).await?;
                Ok(ItemOutcome::Synced { server_id })
            }
            HandlerOutcome::Conflict {
                conflict_type,
                description,
                server_data,
            } => {
                self.connectivity.reset_failure_count();
                self.queue
                    .mark_conflict(id, conflict_type, &description, server_data)
                    .await?;
                Ok(ItemOutcome::Conflict { conflict_type })
            }
            HandlerOutcome::Failed {
                message,
                unreachable,
            } => {
                let updated = self.queue.mark_failed(id, &message).await?;
                if unreachable {
                    self.connectivity.report_failure().await;
                } else {
                    self.connectivity.reset_failure_count();
                }
                Ok(ItemOutcome::Failed {
                    status: updated.status(),
                    message,
                    unreachable,
                })
            }
        }
    }

    // =========================================================================
    // Single-item Retry
    // =========================================================================

    /// Re-dispatches one item outside the batch pass.
    ///
    /// A `failed` item is first moved back to `pending` with a fresh budget.
    /// Returns [`ItemOutcome::Deferred`] when offline or while a pass is
    /// running; the item then waits for the next pass.
    pub async fn retry_item(&self, id: &str) -> SyncResult<ItemOutcome> {
        let item = self
            .queue
            .get(id)
            .await?
            .ok_or_else(|| SyncError::ItemNotFound(id.to_string()))?;

        match item.status() {
            QueueStatus::Failed => {
                self.queue.manual_retry(id).await?;
            }
            QueueStatus::Pending => {}
            other => {
                return Err(CoreError::InvalidTransition {
                    id: id.to_string(),
                    from: other,
                    to: QueueStatus::Syncing,
                }
                .into());
            }
        }

        if !self.connectivity.is_online() {
            debug!(item_id = %id, "Offline, retry deferred");
            return Ok(ItemOutcome::Deferred);
        }
        let Some(_guard) = self.try_begin() else {
            debug!(item_id = %id, "Pass running, retry deferred");
            return Ok(ItemOutcome::Deferred);
        };

        let outcome = self.process(id).await?;
        if matches!(outcome, ItemOutcome::Synced { .. }) {
            if let Err(e) = self.queue.prune_synced().await {
                warn!(error = %e, "Failed to prune synced items");
            }
        }

        info!(item_id = %id, ?outcome, "Item retried");
        Ok(outcome)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
