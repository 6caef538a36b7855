//! # Queue State Machine
//!
//! Guarded status transitions on [`QueueItem`]. Every transition checks its
//! source state and returns [`CoreError::InvalidTransition`] otherwise; the
//! queue manager persists the item only when the transition succeeded.
//!
//! ```text
//! pending  ──begin_sync──────────► syncing
//! syncing  ──complete────────────► synced
//! syncing  ──flag_conflict───────► conflict
//! syncing  ──record_failure──────► pending   (retries remain, retry_count += 1)
//! syncing  ──record_failure──────► failed    (budget spent,   retry_count += 1)
//! failed   ──manual_retry────────► pending   (retry_count = 0, last_error cleared)
//! conflict ──requeue_resolved────► pending   (retry_count = 0, conflict cleared)
//! ```

use chrono::{DateTime, Utc};

use crate::conflict::ConflictData;
use crate::error::{CoreError, CoreResult};
use crate::operation::Operation;
use crate::types::{QueueItem, QueueStatus};

impl QueueItem {
    fn require(&self, expected: QueueStatus, to: QueueStatus) -> CoreResult<()> {
        if self.status == expected {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to,
            })
        }
    }

    /// `pending → syncing`, stamping the attempt time.
    pub fn begin_sync(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        self.require(QueueStatus::Pending, QueueStatus::Syncing)?;
        self.status = QueueStatus::Syncing;
        self.last_attempt_at = Some(now);
        Ok(())
    }

    /// `syncing → synced`.
    pub fn complete(&mut self, server_id: impl Into<String>) -> CoreResult<()> {
        self.require(QueueStatus::Syncing, QueueStatus::Synced)?;
        self.status = QueueStatus::Synced;
        self.server_id = Some(server_id.into());
        self.last_error = None;
        Ok(())
    }

    /// `syncing → pending | failed` after a transient error.
    ///
    /// Returns the status the item ended in.
    pub fn record_failure(
        &mut self,
        error: impl Into<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<QueueStatus> {
        self.require(QueueStatus::Syncing, QueueStatus::Failed)?;
        self.retry_count += 1;
        self.last_error = Some(error.into());
        self.last_attempt_at = Some(now);
        self.status = if self.retry_count >= self.max_retries {
            QueueStatus::Failed
        } else {
            QueueStatus::Pending
        };
        Ok(self.status)
    }

    /// `syncing → conflict`.
    pub fn flag_conflict(&mut self, conflict: ConflictData) -> CoreResult<()> {
        self.require(QueueStatus::Syncing, QueueStatus::Conflict)?;
        self.last_error = Some(conflict.description.clone());
        self.status = QueueStatus::Conflict;
        self.conflict = Some(conflict);
        Ok(())
    }

    /// `failed → pending` on an operator retry.
    pub fn manual_retry(&mut self) -> CoreResult<()> {
        self.require(QueueStatus::Failed, QueueStatus::Pending)?;
        self.status = QueueStatus::Pending;
        self.retry_count = 0;
        self.last_error = None;
        Ok(())
    }

    /// `conflict → pending` after a re-queueing resolution.
    ///
    /// A replacement operation must be of the same kind as the original.
    pub fn requeue_resolved(&mut self, replacement: Option<Operation>) -> CoreResult<()> {
        self.require(QueueStatus::Conflict, QueueStatus::Pending)?;
        if let Some(operation) = replacement {
            if operation.kind() != self.operation.kind() {
                return Err(CoreError::OperationMismatch {
                    expected: self.operation.kind(),
                    actual: operation.kind(),
                });
            }
            self.operation = operation;
        }
        self.status = QueueStatus::Pending;
        self.retry_count = 0;
        self.conflict = None;
        self.last_error = None;
        Ok(())
    }
}

/// Orders items for a sync pass: priority (high first), then oldest first.
///
/// The sort is stable, so items with equal keys keep their input order.
pub fn sort_for_processing(items: &mut [QueueItem]) {
    items.sort_by(|a, b| {
        a.priority
            .rank()
            .cmp(&b.priority.rank())
            .then(a.created_at.cmp(&b.created_at))
    });
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::ConflictType;
    use crate::fixtures::{at, item, message, sale};
    use crate::types::Priority;

    fn syncing_item() -> QueueItem {
        let mut item = item("local-1", sale("P1", 50_000), Priority::Normal, at(0));
        item.begin_sync(at(1)).unwrap();
        item
    }

    #[test]
    fn test_happy_path() {
        let mut item = syncing_item();
        assert_eq!(item.status, QueueStatus::Syncing);
        assert_eq!(item.last_attempt_at, Some(at(1)));

        item.complete("srv-9").unwrap();
        assert_eq!(item.status, QueueStatus::Synced);
        assert_eq!(item.server_id.as_deref(), Some("srv-9"));
        assert!(item.is_consistent());
    }

    #[test]
    fn test_complete_requires_syncing() {
        let mut item = item("local-1", sale("P1", 50_000), Priority::Normal, at(0));
        let err = item.complete("srv-9").unwrap_err();
        assert_eq!(
            err,
            CoreError::InvalidTransition {
                id: "local-1".to_string(),
                from: QueueStatus::Pending,
                to: QueueStatus::Synced,
            }
        );
        assert_eq!(item.status, QueueStatus::Pending);
    }

    #[test]
    fn test_failures_exhaust_budget() {
        let mut item = syncing_item();

        assert_eq!(item.record_failure("timeout", at(2)).unwrap(), QueueStatus::Pending);
        assert_eq!(item.retry_count, 1);

        item.begin_sync(at(3)).unwrap();
        assert_eq!(item.record_failure("timeout", at(4)).unwrap(), QueueStatus::Pending);

        item.begin_sync(at(5)).unwrap();
        assert_eq!(item.record_failure("503", at(6)).unwrap(), QueueStatus::Failed);
        assert_eq!(item.retry_count, item.max_retries);
        assert_eq!(item.last_error.as_deref(), Some("503"));
        assert!(item.is_consistent());

        // Failed items are not picked up by a pass
        assert!(item.begin_sync(at(7)).is_err());
    }

    #[test]
    fn test_manual_retry_resets_budget() {
        let mut item = syncing_item();
        item.max_retries = 1;
        item.record_failure("timeout", at(2)).unwrap();
        assert_eq!(item.status, QueueStatus::Failed);

        item.manual_retry().unwrap();
        assert_eq!(item.status, QueueStatus::Pending);
        assert_eq!(item.retry_count, 0);
        assert!(item.last_error.is_none());

        assert!(item.manual_retry().is_err());
    }

    #[test]
    fn test_conflict_round_trip_clears_data() {
        let mut item = syncing_item();
        let local = serde_json::to_value(&item.operation).unwrap();
        item.flag_conflict(ConflictData::new(
            ConflictType::DuplicateReceiptNumber,
            "Receipt in use",
            local,
            None,
            at(2),
        ))
        .unwrap();
        assert_eq!(item.status, QueueStatus::Conflict);
        assert!(item.is_consistent());

        let renumbered = item.operation.with_receipt_number("20261017-3F-1234").unwrap();
        item.requeue_resolved(Some(renumbered)).unwrap();
        assert_eq!(item.status, QueueStatus::Pending);
        assert!(item.conflict.is_none());
        assert_eq!(item.retry_count, 0);
        assert_eq!(item.operation.receipt_number(), Some("20261017-3F-1234"));
        assert!(item.is_consistent());
    }

    #[test]
    fn test_requeue_rejects_other_operation_kind() {
        let mut item = syncing_item();
        let local = serde_json::to_value(&item.operation).unwrap();
        item.flag_conflict(ConflictData::new(ConflictType::DataModified, "", local, None, at(2)))
            .unwrap();

        let err = item.requeue_resolved(Some(message("+34600000000"))).unwrap_err();
        assert!(matches!(err, CoreError::OperationMismatch { .. }));
        assert_eq!(item.status, QueueStatus::Conflict);
    }

    #[test]
    fn test_sort_priority_then_age() {
        let mut items = vec![
            item("low", message("a"), Priority::Low, at(0)),
            item("high", message("b"), Priority::High, at(1)),
            item("normal", message("c"), Priority::Normal, at(2)),
            item("high-late", message("d"), Priority::High, at(3)),
        ];
        sort_for_processing(&mut items);
        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "high-late", "normal", "low"]);
    }
}
