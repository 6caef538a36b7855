//! # Remote Authoritative Store
//!
//! The narrow interface the handlers replay queued operations against.
//!
//! ## Call Outcomes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   handler ──► RemoteStore::complete_sale(request_id, sale)              │
//! │                    │                                                    │
//! │        ┌───────────┼──────────────────┬──────────────────────┐          │
//! │        ▼           ▼                  ▼                      ▼          │
//! │   Ok(server_id)  Unreachable(..)   Server(..)         Rejected{code}    │
//! │        │           │                  │                      │          │
//! │        ▼           ▼                  ▼                      ▼          │
//! │     synced     transient +        transient           business conflict │
//! │                report_failure                         (or transient if  │
//! │                                                        code unknown)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every write carries the queue item id as `request_id`, so the server
//! can recognise a replay of a request it already applied.

pub mod protocol;
pub mod ws;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use shopline_core::{
    CustomerPayload, MessagePayload, ProductStatus, ReceiptPayload, SalePayload, SaleRefPayload,
    SaleUpdatePayload,
};

pub use ws::{WsRemoteConfig, WsRemoteStore};

/// Rejection codes the authoritative store is known to send.
pub mod codes {
    pub const DUPLICATE_RECEIPT_NUMBER: &str = "DUPLICATE_RECEIPT_NUMBER";
    pub const ALREADY_SOLD: &str = "ALREADY_SOLD";
    pub const NOT_AVAILABLE: &str = "NOT_AVAILABLE";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const VERSION_MISMATCH: &str = "VERSION_MISMATCH";
}

/// Authoritative view of a catalog entity, used by the sale pre-flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteProduct {
    pub id: String,
    pub status: ProductStatus,
    pub updated_at: Option<DateTime<Utc>>,
    /// Request id of the write that last changed this entity.
    pub last_request_id: Option<String>,
}

// =============================================================================
// Remote Errors
// =============================================================================

pub type RemoteResult<T> = Result<T, RemoteError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RemoteError {
    /// Nothing answered: connect failure, dropped socket, timeout.
    #[error("Remote store unreachable: {0}")]
    Unreachable(String),

    /// The server answered with an internal error.
    #[error("Remote store error: {0}")]
    Server(String),

    /// The server refused the operation on domain grounds.
    #[error("Rejected ({code}): {message}")]
    Rejected {
        code: String,
        message: String,
        server_data: Option<Value>,
    },
}

impl RemoteError {
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        RemoteError::Rejected {
            code: code.into(),
            message: message.into(),
            server_data: None,
        }
    }

    /// Returns true if the failure says nothing about the server's state.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, RemoteError::Unreachable(_))
    }
}

// =============================================================================
// Remote Store Trait
// =============================================================================

/// One request/response call per operation type.
///
/// Writes return the server-side identifier of the created or changed entity.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// `Ok(None)` if the entity does not exist on the server.
    async fn fetch_product(&self, product_id: &str) -> RemoteResult<Option<RemoteProduct>>;

    /// Records the sale and deducts the unit from inventory.
    async fn complete_sale(&self, request_id: &str, sale: &SalePayload) -> RemoteResult<String>;

    async fn update_sale(&self, request_id: &str, update: &SaleUpdatePayload) -> RemoteResult<String>;

    async fn delete_sale(&self, request_id: &str, sale: &SaleRefPayload) -> RemoteResult<String>;

    async fn send_message(&self, request_id: &str, message: &MessagePayload) -> RemoteResult<String>;

    async fn create_receipt(&self, request_id: &str, receipt: &ReceiptPayload) -> RemoteResult<String>;

    async fn create_customer(&self, request_id: &str, customer: &CustomerPayload) -> RemoteResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_kinds() {
        assert!(RemoteError::Unreachable("connection refused".into()).is_unreachable());
        assert!(!RemoteError::Server("boom".into()).is_unreachable());

        let rejected = RemoteError::rejected(codes::ALREADY_SOLD, "Product already sold");
        assert!(!rejected.is_unreachable());
        assert_eq!(rejected.to_string(), "Rejected (ALREADY_SOLD): Product already sold");
    }

    #[test]
    fn test_remote_product_json() {
        let product: RemoteProduct = serde_json::from_str(
            r#"{"id":"P1","status":"sold","updated_at":null,"last_request_id":"local-1"}"#,
        )
        .unwrap();
        assert_eq!(product.status, ProductStatus::Sold);
        assert_eq!(product.last_request_id.as_deref(), Some("local-1"));
    }
}
