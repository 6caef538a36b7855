//! # Queue Types
//!
//! The durable unit of work and its display projections.
//!
//! ## Type Relationships
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Queue Types                                     │
//! │                                                                         │
//! │  ┌─────────────────┐         ┌─────────────────┐                       │
//! │  │   QueueItem     │ 1     1 │   Operation     │  tagged payload        │
//! │  │  ─────────────  │────────►│  ─────────────  │  (operation.rs)        │
//! │  │  id (local-…)   │         │  create-sale    │                       │
//! │  │  status         │         │  send-message   │                       │
//! │  │  priority       │         │  …              │                       │
//! │  │  retry_count    │         └─────────────────┘                       │
//! │  │  conflict ──────┼──┐                                                 │
//! │  └────────┬────────┘  │ 0..1  ┌─────────────────┐                       │
//! │           │           └──────►│  ConflictData   │  (conflict.rs)        │
//! │           │                   └─────────────────┘                       │
//! │           ▼ projection                                                  │
//! │  ┌─────────────────────┐      ┌─────────────────┐                       │
//! │  │ OfflineTransaction  │      │  QueueCounts    │  presentation DTOs    │
//! │  └─────────────────────┘      └─────────────────┘                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::conflict::ConflictData;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::operation::{Operation, OperationType};

// =============================================================================
// Queue Status
// =============================================================================

/// Lifecycle status of a queue item.
///
/// ## State Machine
/// ```text
///   pending ──► syncing ──► synced ──► (pruned)
///      ▲           │
///      │           ├──► conflict ──► (resolved: re-queued or removed)
///      │           │
///      └───────────┴──► failed ──(manual retry)──► pending
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    /// Waiting for the next sync pass.
    Pending,
    /// An attempt is in flight.
    Syncing,
    /// Accepted by the authoritative store; eligible for pruning.
    Synced,
    /// Rejected on domain grounds; waiting for an operator decision.
    Conflict,
    /// Retry budget exhausted; parked until a manual retry.
    Failed,
}

impl QueueStatus {
    pub const ALL: [QueueStatus; 5] = [
        QueueStatus::Pending,
        QueueStatus::Syncing,
        QueueStatus::Synced,
        QueueStatus::Conflict,
        QueueStatus::Failed,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Syncing => "syncing",
            QueueStatus::Synced => "synced",
            QueueStatus::Conflict => "conflict",
            QueueStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QueueStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "status".to_string(),
                allowed: QueueStatus::ALL.iter().map(|s| s.to_string()).collect(),
            })
    }
}

// =============================================================================
// Priority
// =============================================================================

/// Processing priority within a sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Normal, Priority::Low];

    /// Sort key: lower runs first.
    pub const fn rank(&self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Normal => 1,
            Priority::Low => 2,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Priority::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "priority".to_string(),
                allowed: Priority::ALL.iter().map(|p| p.to_string()).collect(),
            })
    }
}

// =============================================================================
// Entity Type
// =============================================================================

/// Display/filter classification of a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Sale,
    Receipt,
    Customer,
    Message,
}

impl EntityType {
    pub const ALL: [EntityType; 4] = [
        EntityType::Sale,
        EntityType::Receipt,
        EntityType::Customer,
        EntityType::Message,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            EntityType::Sale => "sale",
            EntityType::Receipt => "receipt",
            EntityType::Customer => "customer",
            EntityType::Message => "message",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "entity_type".to_string(),
                allowed: EntityType::ALL.iter().map(|e| e.to_string()).collect(),
            })
    }
}

// =============================================================================
// Queue Item
// =============================================================================

/// One durable record of a locally originated operation.
///
/// ## Invariants
/// - `status == Conflict` exactly when `conflict` is `Some`
/// - once `status == Failed`, `retry_count <= max_retries`
/// - `server_id` is only set by the synced transition
///
/// Lifecycle fields are read through accessors; mutations go through the
/// guarded transitions in [`crate::state`]. Storage layers rebuild a saved
/// item with [`QueueItem::restored`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    /// Locally generated id (`local-<uuid>`), shown in the UI until
    /// the server id is known.
    pub id: String,

    /// What to replay against the authoritative store.
    pub operation: Operation,

    pub entity_type: EntityType,
    pub(crate) status: QueueStatus,
    pub priority: Priority,
    pub(crate) retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub(crate) last_attempt_at: Option<DateTime<Utc>>,
    pub(crate) last_error: Option<String>,

    /// Present only while `status == Conflict`.
    pub(crate) conflict: Option<ConflictData>,

    /// Authoritative identifier, set once synced.
    pub(crate) server_id: Option<String>,

    /// Optional attribution.
    pub user_id: Option<String>,
}

impl QueueItem {
    /// Creates a fresh `pending` item. `max_retries` is clamped to at least 1.
    pub fn new(
        id: impl Into<String>,
        operation: Operation,
        entity_type: EntityType,
        priority: Priority,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Self {
        QueueItem {
            id: id.into(),
            operation,
            entity_type,
            status: QueueStatus::Pending,
            priority,
            retry_count: 0,
            // At least one attempt
            max_retries: max_retries.max(1),
            created_at: now,
            last_attempt_at: None,
            last_error: None,
            conflict: None,
            server_id: None,
            user_id: None,
        }
    }

    /// Sets the attributed user.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Rebuilds a saved item with its lifecycle state.
    ///
    /// Rejects a state that breaks the conflict/status or retry invariants.
    pub fn restored(mut self, state: ItemState) -> CoreResult<Self> {
        self.status = state.status;
        self.retry_count = state.retry_count;
        self.last_attempt_at = state.last_attempt_at;
        self.last_error = state.last_error;
        self.conflict = state.conflict;
        self.server_id = state.server_id;

        if !self.is_consistent() {
            return Err(CoreError::InconsistentRecord {
                id: self.id,
                status: self.status,
            });
        }
        Ok(self)
    }

    /// Kind of the queued operation.
    #[inline]
    pub fn operation_type(&self) -> OperationType {
        self.operation.kind()
    }

    #[inline]
    pub fn status(&self) -> QueueStatus {
        self.status
    }

    /// Failed attempts so far.
    #[inline]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    #[inline]
    pub fn last_attempt_at(&self) -> Option<DateTime<Utc>> {
        self.last_attempt_at
    }

    /// Message from the most recent failed attempt.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Conflict annotation, present only in `conflict`.
    pub fn conflict(&self) -> Option<&ConflictData> {
        self.conflict.as_ref()
    }

    /// Authoritative id once synced.
    pub fn server_id(&self) -> Option<&str> {
        self.server_id.as_deref()
    }

    /// Checks the conflict/status and retry invariants.
    pub fn is_consistent(&self) -> bool {
        let conflict_matches = (self.status == QueueStatus::Conflict) == self.conflict.is_some();
        let retries_bounded =
            self.status != QueueStatus::Failed || self.retry_count <= self.max_retries;
        conflict_matches && retries_bounded
    }
}

/// Lifecycle state of a saved item, as read back from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemState {
    pub status: QueueStatus,
    pub retry_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub conflict: Option<ConflictData>,
    pub server_id: Option<String>,
}

// =============================================================================
// Aggregate Counts
// =============================================================================

/// Live totals for badges and the scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct QueueCounts {
    pub pending: u32,
    pub syncing: u32,
    pub conflict: u32,
    pub failed: u32,
}

impl QueueCounts {
    /// Builds counts from `(status, count)` pairs; `synced` is ignored.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (QueueStatus, u32)>) -> Self {
        let mut counts = QueueCounts::default();
        for (status, n) in pairs {
            match status {
                QueueStatus::Pending => counts.pending += n,
                QueueStatus::Syncing => counts.syncing += n,
                QueueStatus::Conflict => counts.conflict += n,
                QueueStatus::Failed => counts.failed += n,
                QueueStatus::Synced => {}
            }
        }
        counts
    }

    /// Items not yet accepted by the authoritative store.
    pub fn unsynced(&self) -> u32 {
        self.pending + self.syncing + self.conflict + self.failed
    }
}

// =============================================================================
// Offline Transaction Projection
// =============================================================================

/// Display projection of a non-synced queue item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct OfflineTransaction {
    pub id: String,
    pub operation_type: OperationType,
    pub entity_type: EntityType,
    pub display_name: String,
    /// Display only, never authoritative.
    pub amount: Option<Money>,
    pub status: QueueStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub last_error: Option<String>,
}

impl From<&QueueItem> for OfflineTransaction {
    fn from(item: &QueueItem) -> Self {
        OfflineTransaction {
            id: item.id.clone(),
            operation_type: item.operation_type(),
            entity_type: item.entity_type,
            display_name: item.operation.display_name(),
            amount: item.operation.amount(),
            status: item.status,
            created_at: item.created_at,
            last_attempt_at: item.last_attempt_at,
            retry_count: item.retry_count,
            last_error: item.last_error.clone(),
        }
    }
}

// =============================================================================
// Cached Catalog Entity
// =============================================================================

/// Local availability of a catalog entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    #[default]
    Available,
    Reserved,
    Sold,
}

impl ProductStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Available => "available",
            ProductStatus::Reserved => "reserved",
            ProductStatus::Sold => "sold",
        }
    }
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-model entry used to render sales offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CachedProduct {
    pub id: String,
    pub brand: String,
    pub model: String,
    pub storage: Option<String>,
    pub color: Option<String>,
    pub condition: Option<String>,
    /// Serial number or IMEI.
    pub identifier: Option<String>,
    pub price: Money,
    pub status: ProductStatus,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
