//! # Error Types
//!
//! Domain-specific error types for shopline-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  shopline-core errors (this file)                                      │
//! │  ├── CoreError        - Rejected transitions and resolutions           │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  shopline-db errors (separate crate)                                   │
//! │  └── DbError          - Storage failures                               │
//! │                                                                         │
//! │  shopline-sync errors (separate crate)                                 │
//! │  └── SyncError        - What the engine API returns                    │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError → caller/UI             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::conflict::ResolutionAction;
use crate::operation::OperationType;
use crate::types::QueueStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Queue rule violations.
///
/// Every variant is a local/validation failure: the caller asked for
/// something the current state does not allow. None of them are retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A status transition was requested from the wrong source state.
    ///
    /// ## When This Occurs
    /// - `mark_synced` on an item that was never marked `syncing`
    /// - manual retry of an item that is not `failed`
    /// - re-queueing an item that is not in `conflict`
    #[error("Queue item {id} is {from}, cannot move to {to}")]
    InvalidTransition {
        id: String,
        from: QueueStatus,
        to: QueueStatus,
    },

    /// A resolution action does not apply to this kind of operation.
    #[error("Resolution '{action}' is not supported for {operation} operations")]
    UnsupportedResolution {
        action: ResolutionAction,
        operation: OperationType,
    },

    /// `merge` was requested without a merged payload.
    #[error("Merge resolution requires a merged payload")]
    MissingMergePayload,

    /// A replacement payload belongs to a different operation type.
    #[error("Replacement payload is {actual}, expected {expected}")]
    OperationMismatch {
        expected: OperationType,
        actual: OperationType,
    },

    /// A stored item's state breaks the queue invariants.
    #[error("Stored queue item {id} has an inconsistent {status} state")]
    InconsistentRecord { id: String, status: QueueStatus },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., malformed receipt number).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

impl ValidationError {
    /// Shorthand for [`ValidationError::Required`].
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_error_message() {
        let err = CoreError::InvalidTransition {
            id: "local-1".to_string(),
            from: QueueStatus::Pending,
            to: QueueStatus::Synced,
        };
        assert_eq!(
            err.to_string(),
            "Queue item local-1 is pending, cannot move to synced"
        );
    }

    #[test]
    fn test_unsupported_resolution_message() {
        let err = CoreError::UnsupportedResolution {
            action: ResolutionAction::GenerateNewNumber,
            operation: OperationType::SendMessage,
        };
        assert_eq!(
            err.to_string(),
            "Resolution 'generate-new-number' is not supported for send-message operations"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::required("receipt_number").into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(
            core_err.to_string(),
            "Validation error: receipt_number is required"
        );
    }
}
