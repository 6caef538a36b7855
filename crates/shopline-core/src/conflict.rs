//! # Conflicts
//!
//! Vocabulary for business conflicts reported by the authoritative store and
//! the operator decisions that settle them.
//!
//! ## Conflict → Options
//! ```text
//! ┌──────────────────────────────┬──────────────────────────────────────────┐
//! │ conflict type                │ options (★ = recommended)                │
//! ├──────────────────────────────┼──────────────────────────────────────────┤
//! │ duplicate-receipt-number     │ ★ generate-new-number, discard           │
//! │ entity-already-finalized     │ ★ discard, keep-local                    │
//! │ entity-unavailable           │ ★ keep-local, discard                    │
//! │ data-modified                │ ★ keep-server, keep-local, merge         │
//! │ entity-deleted               │ ★ discard                                │
//! │ (unrecognized)               │ ★ discard                                │
//! └──────────────────────────────┴──────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::types::QueueItem;

// =============================================================================
// Conflict Type
// =============================================================================

/// Domain reason the authoritative store rejected an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictType {
    DuplicateReceiptNumber,
    EntityAlreadyFinalized,
    EntityUnavailable,
    DataModified,
    EntityDeleted,
    /// Anything written by a newer version.
    #[serde(other)]
    Unknown,
}

impl ConflictType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConflictType::DuplicateReceiptNumber => "duplicate-receipt-number",
            ConflictType::EntityAlreadyFinalized => "entity-already-finalized",
            ConflictType::EntityUnavailable => "entity-unavailable",
            ConflictType::DataModified => "data-modified",
            ConflictType::EntityDeleted => "entity-deleted",
            ConflictType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Resolution Action
// =============================================================================

/// Operator decision applied to a conflicted item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionAction {
    /// Re-queue unchanged for a fresh attempt.
    KeepLocal,
    /// Abandon the local attempt; the server's state stands.
    KeepServer,
    /// Create-sale only: new receipt number, re-queue, retry now.
    GenerateNewNumber,
    /// Replace the payload with a caller-supplied merge and re-queue.
    Merge,
    /// Remove the item and undo its optimistic local effects.
    Discard,
}

impl ResolutionAction {
    pub const ALL: [ResolutionAction; 5] = [
        ResolutionAction::KeepLocal,
        ResolutionAction::KeepServer,
        ResolutionAction::GenerateNewNumber,
        ResolutionAction::Merge,
        ResolutionAction::Discard,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            ResolutionAction::KeepLocal => "keep-local",
            ResolutionAction::KeepServer => "keep-server",
            ResolutionAction::GenerateNewNumber => "generate-new-number",
            ResolutionAction::Merge => "merge",
            ResolutionAction::Discard => "discard",
        }
    }

    /// Whether the item goes back to `pending` (true) or is removed (false).
    pub const fn requeues(&self) -> bool {
        matches!(
            self,
            ResolutionAction::KeepLocal | ResolutionAction::GenerateNewNumber | ResolutionAction::Merge
        )
    }
}

impl fmt::Display for ResolutionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionAction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResolutionAction::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "action".to_string(),
                allowed: ResolutionAction::ALL.iter().map(|a| a.to_string()).collect(),
            })
    }
}

/// One entry of the option list offered to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ResolutionOption {
    pub id: String,
    pub label: String,
    pub description: String,
    pub action: ResolutionAction,
    pub is_recommended: bool,
}

impl ResolutionOption {
    fn new(action: ResolutionAction, label: &str, description: &str, recommended: bool) -> Self {
        ResolutionOption {
            id: action.as_str().to_string(),
            label: label.to_string(),
            description: description.to_string(),
            action,
            is_recommended: recommended,
        }
    }
}

/// Ordered options for a conflict type. Never empty.
pub fn resolution_options_for(conflict_type: ConflictType) -> Vec<ResolutionOption> {
    use ResolutionAction::*;

    let discard = |recommended| {
        ResolutionOption::new(
            Discard,
            "Discard",
            "Remove this operation from the queue and undo its local changes.",
            recommended,
        )
    };
    let keep_local = |recommended| {
        ResolutionOption::new(
            KeepLocal,
            "Retry as is",
            "Keep the local version and try again on the next sync.",
            recommended,
        )
    };

    match conflict_type {
        ConflictType::DuplicateReceiptNumber => vec![
            ResolutionOption::new(
                GenerateNewNumber,
                "Generate new number",
                "Assign a fresh receipt number and retry immediately.",
                true,
            ),
            discard(false),
        ],
        ConflictType::EntityAlreadyFinalized => vec![discard(true), keep_local(false)],
        ConflictType::EntityUnavailable => vec![keep_local(true), discard(false)],
        ConflictType::DataModified => vec![
            ResolutionOption::new(
                KeepServer,
                "Use server version",
                "Abandon the local change; the server's data stands.",
                true,
            ),
            keep_local(false),
            ResolutionOption::new(
                Merge,
                "Merge",
                "Combine both versions and retry with the merged data.",
                false,
            ),
        ],
        ConflictType::EntityDeleted | ConflictType::Unknown => vec![discard(true)],
    }
}

// =============================================================================
// Conflict Data
// =============================================================================

/// Attached to an item while it sits in `conflict`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictData {
    pub conflict_type: ConflictType,
    pub description: String,
    /// Snapshot of the local payload at detection time.
    pub local_data: Value,
    /// Whatever the server sent back, if anything.
    pub server_data: Option<Value>,
    pub detected_at: DateTime<Utc>,
    #[serde(default)]
    pub resolution_options: Vec<ResolutionOption>,
}

impl ConflictData {
    /// Builds conflict data with the default option list for `conflict_type`.
    pub fn new(
        conflict_type: ConflictType,
        description: impl Into<String>,
        local_data: Value,
        server_data: Option<Value>,
        detected_at: DateTime<Utc>,
    ) -> Self {
        ConflictData {
            conflict_type,
            description: description.into(),
            local_data,
            server_data,
            detected_at,
            resolution_options: resolution_options_for(conflict_type),
        }
    }

    /// Options to show; falls back to the type defaults when none were stored.
    pub fn options(&self) -> Vec<ResolutionOption> {
        if self.resolution_options.is_empty() {
            resolution_options_for(self.conflict_type)
        } else {
            self.resolution_options.clone()
        }
    }
}

// =============================================================================
// Display Helper
// =============================================================================

/// What the conflict dialog renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ConflictDisplay {
    pub title: String,
    pub description: String,
    pub local_summary: String,
    pub options: Vec<ResolutionOption>,
}

/// Derives the dialog content for a queue item.
///
/// Items without conflict data (or with a type this build does not know)
/// render as an unknown conflict with a single discard option.
pub fn describe_conflict(item: &QueueItem) -> ConflictDisplay {
    let conflict_type = item
        .conflict
        .as_ref()
        .map(|c| c.conflict_type)
        .unwrap_or(ConflictType::Unknown);

    let receipt = item.operation.receipt_number().unwrap_or("-");
    let (title, default_description) = match conflict_type {
        ConflictType::DuplicateReceiptNumber => (
            "Duplicate Receipt Number",
            format!("Receipt number {} is already used on the server.", receipt),
        ),
        ConflictType::EntityAlreadyFinalized => (
            "Item Already Sold",
            "This item was sold elsewhere while the register was offline.".to_string(),
        ),
        ConflictType::EntityUnavailable => (
            "Item Unavailable",
            "This item is reserved or otherwise not available for sale.".to_string(),
        ),
        ConflictType::DataModified => (
            "Data Modified",
            "This record changed on the server after the operation was queued.".to_string(),
        ),
        ConflictType::EntityDeleted => (
            "Item Deleted",
            "This record no longer exists on the server.".to_string(),
        ),
        ConflictType::Unknown => (
            "Unknown Conflict",
            "The server rejected this operation for an unrecognized reason.".to_string(),
        ),
    };

    let description = item
        .conflict
        .as_ref()
        .map(|c| c.description.trim())
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .unwrap_or(default_description);

    let options = match &item.conflict {
        Some(conflict) if conflict_type != ConflictType::Unknown => conflict.options(),
        _ => resolution_options_for(ConflictType::Unknown),
    };

    ConflictDisplay {
        title: title.to_string(),
        description,
        local_summary: local_summary(item),
        options,
    }
}

fn local_summary(item: &QueueItem) -> String {
    let mut summary = item.operation.display_name();
    if let Some(amount) = item.operation.amount() {
        summary.push_str(&format!(" for {}", amount));
    }
    if let Some(receipt) = item.operation.receipt_number() {
        summary.push_str(&format!(" (receipt {})", receipt));
    }
    summary
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{at, item, message, sale};
    use crate::types::{Priority, QueueStatus};

    fn conflicted(conflict_type: ConflictType, description: &str) -> QueueItem {
        let mut item = item("local-1", sale("P1", 50_000), Priority::Normal, at(0));
        item.status = QueueStatus::Conflict;
        item.conflict = Some(ConflictData::new(
            conflict_type,
            description,
            serde_json::to_value(&item.operation).unwrap(),
            None,
            at(5),
        ));
        item
    }

    #[test]
    fn test_every_type_has_one_recommended_option() {
        for conflict_type in [
            ConflictType::DuplicateReceiptNumber,
            ConflictType::EntityAlreadyFinalized,
            ConflictType::EntityUnavailable,
            ConflictType::DataModified,
            ConflictType::EntityDeleted,
            ConflictType::Unknown,
        ] {
            let options = resolution_options_for(conflict_type);
            assert!(!options.is_empty(), "{conflict_type} has no options");
            assert_eq!(options.iter().filter(|o| o.is_recommended).count(), 1);
        }
    }

    #[test]
    fn test_duplicate_receipt_recommends_new_number() {
        let options = resolution_options_for(ConflictType::DuplicateReceiptNumber);
        assert_eq!(options[0].action, ResolutionAction::GenerateNewNumber);
        assert!(options[0].is_recommended);
        assert_eq!(options[0].id, "generate-new-number");
    }

    #[test]
    fn test_unknown_conflict_type_deserializes() {
        let parsed: ConflictType = serde_json::from_str("\"price-changed\"").unwrap();
        assert_eq!(parsed, ConflictType::Unknown);
        let parsed: ConflictType = serde_json::from_str("\"entity-deleted\"").unwrap();
        assert_eq!(parsed, ConflictType::EntityDeleted);
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!(
            "generate-new-number".parse::<ResolutionAction>().unwrap(),
            ResolutionAction::GenerateNewNumber
        );
        let err = "overwrite".parse::<ResolutionAction>().unwrap_err();
        assert!(matches!(err, ValidationError::NotAllowed { ref field, .. } if field == "action"));
    }

    #[test]
    fn test_requeue_actions() {
        assert!(ResolutionAction::KeepLocal.requeues());
        assert!(ResolutionAction::Merge.requeues());
        assert!(ResolutionAction::GenerateNewNumber.requeues());
        assert!(!ResolutionAction::Discard.requeues());
        assert!(!ResolutionAction::KeepServer.requeues());
    }

    #[test]
    fn test_describe_finalized_sale() {
        let display = describe_conflict(&conflicted(ConflictType::EntityAlreadyFinalized, ""));
        assert_eq!(display.title, "Item Already Sold");
        assert_eq!(
            display.local_summary,
            "Sale: Apple iPhone 13 128GB for 500.00 (receipt 20261017-3F-0042)"
        );
        assert_eq!(display.options[0].action, ResolutionAction::Discard);
    }

    #[test]
    fn test_describe_prefers_stored_description() {
        let display = describe_conflict(&conflicted(ConflictType::DataModified, "Price changed to 450.00"));
        assert_eq!(display.description, "Price changed to 450.00");
        assert_eq!(display.options.len(), 3);
    }

    #[test]
    fn test_describe_without_conflict_data_falls_back_to_discard() {
        let item = item("local-2", message("+34600000000"), Priority::Low, at(0));
        let display = describe_conflict(&item);
        assert_eq!(display.title, "Unknown Conflict");
        assert_eq!(display.options.len(), 1);
        assert_eq!(display.options[0].action, ResolutionAction::Discard);
    }
}
