//! # Sync Events
//!
//! The seam between the engine and whatever renders it (a desktop shell,
//! a daemon log, a test recorder).
//!
//! ```text
//! ┌──────────────────────┐     emit_counts        ┌──────────────────────┐
//! │  SyncQueueManager    │ ─────────────────────► │                      │
//! ├──────────────────────┤     emit_progress      │                      │
//! │  SyncScheduler       │ ─────────────────────► │  SyncEventEmitter    │
//! │                      │     emit_batch_result  │  (UI bridge, logs)   │
//! ├──────────────────────┤     emit_connectivity  │                      │
//! │  ConnectivityMonitor │ ─────────────────────► │                      │
//! │                      │     emit_offline       │                      │
//! └──────────────────────┘ ─────────────────────► └──────────────────────┘
//! ```

use tracing::{info, warn};

use shopline_core::QueueCounts;

use crate::scheduler::{BatchResult, SyncProgress};

/// Receives engine events. Implementations must not block.
pub trait SyncEventEmitter: Send + Sync {
    /// Aggregate counts changed.
    fn emit_counts(&self, counts: &QueueCounts);

    /// A pass moved on to the next item.
    fn emit_progress(&self, progress: &SyncProgress);

    /// A pass finished.
    fn emit_batch_result(&self, result: &BatchResult);

    /// Connectivity flipped.
    fn emit_connectivity(&self, online: bool);

    /// The monitor went offline; switch the UI to its degraded mode.
    fn emit_offline(&self, reason: &str);

    /// Something the operator should know about.
    fn emit_error(&self, message: &str, retryable: bool);
}

/// No-op event emitter.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit_counts(&self, _counts: &QueueCounts) {}
    fn emit_progress(&self, _progress: &SyncProgress) {}
    fn emit_batch_result(&self, _result: &BatchResult) {}
    fn emit_connectivity(&self, _online: bool) {}
    fn emit_offline(&self, _reason: &str) {}
    fn emit_error(&self, _message: &str, _retryable: bool) {}
}

/// Writes events to the tracing log. Used by the headless daemon.
pub struct TracingEmitter;

impl SyncEventEmitter for TracingEmitter {
    fn emit_counts(&self, counts: &QueueCounts) {
        info!(
            pending = counts.pending,
            syncing = counts.syncing,
            conflict = counts.conflict,
            failed = counts.failed,
            "Queue counts"
        );
    }

    fn emit_progress(&self, progress: &SyncProgress) {
        if let Some(ref item_id) = progress.item_id {
            info!(current = progress.current, total = progress.total, item_id = %item_id, "Sync progress");
        }
    }

    fn emit_batch_result(&self, result: &BatchResult) {
        info!(
            total = result.total_items,
            synced = result.synced_items,
            failed = result.failed_items,
            conflicts = result.conflict_items,
            "Sync pass finished"
        );
        for error in &result.errors {
            warn!(error = %error, "Sync pass error");
        }
    }

    fn emit_connectivity(&self, online: bool) {
        info!(online, "Connectivity changed");
    }

    fn emit_offline(&self, reason: &str) {
        warn!(reason = %reason, "Working offline; sales are queued locally");
    }

    fn emit_error(&self, message: &str, retryable: bool) {
        warn!(message = %message, retryable, "Sync error");
    }
}
