//! # Sync Error Types
//!
//! Error types for the sync engine.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │ Local/Validation│  │     Scheduling          │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  ItemNotFound   │  │  SyncInProgress         │ │
//! │  │  InvalidUrl     │  │  NotInConflict  │  │  Offline                │ │
//! │  │  ConfigLoad     │  │  UnknownAction  │  │  ConnectionLost         │ │
//! │  │                 │  │  Core(..)       │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────────────────────────────────┐  │
//! │  │    Storage      │  │  Business conflicts are NOT errors: they    │  │
//! │  │                 │  │  are recorded on the queue item as          │  │
//! │  │  Storage(DbErr) │  │  ConflictData and resolved by an operator.  │  │
//! │  └─────────────────┘  └─────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use shopline_core::{CoreError, QueueStatus, ValidationError};
use shopline_db::DbError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync engine error.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Invalid remote store URL.
    #[error("Invalid remote URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    // =========================================================================
    // Local / Validation Errors
    // =========================================================================
    /// No queue item with this id.
    #[error("Queue item not found: {0}")]
    ItemNotFound(String),

    /// Resolution requested for an item that is not in conflict.
    #[error("Queue item {id} is {status}, not in conflict")]
    NotInConflict { id: String, status: QueueStatus },

    /// Resolution action name not recognized.
    #[error("Unknown resolution action: '{0}'")]
    UnknownAction(String),

    /// Queue rule violation (wrong source state, bad payload, ...).
    #[error(transparent)]
    Core(#[from] CoreError),

    // =========================================================================
    // Scheduling Errors
    // =========================================================================
    /// A sync pass is already running.
    #[error("Sync already in progress")]
    SyncInProgress,

    /// The connectivity monitor reports offline.
    #[error("Device is offline")]
    Offline,

    /// Connectivity dropped in the middle of a pass.
    #[error("Connection lost during sync")]
    ConnectionLost,

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Durable queue store failure.
    #[error("Storage error: {0}")]
    Storage(#[from] DbError),

    /// Failed to serialize a snapshot or message.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<ValidationError> for SyncError {
    fn from(err: ValidationError) -> Self {
        SyncError::Core(CoreError::Validation(err))
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if trying the same call later may succeed.
    ///
    /// ## Retryable Errors
    /// - Offline / connection lost
    /// - A pass already running
    /// - Transient storage failures (pool exhausted, connection dropped)
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Offline | SyncError::ConnectionLost | SyncError::SyncInProgress => true,
            SyncError::Storage(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Returns true if the caller passed something the engine rejects outright.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            SyncError::ItemNotFound(_)
                | SyncError::NotInConflict { .. }
                | SyncError::UnknownAction(_)
                | SyncError::Core(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
        )
    }
}
