//! # Remote Store Wire Protocol
//!
//! JSON request/response messages exchanged with the authoritative store.
//!
//! ## Exchange
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  REGISTER ───► { "request_id": "local-…", "version": 1,                 │
//! │                  "body": { "type": "CompleteSale", "payload": {…} } }   │
//! │                                                                         │
//! │  SERVER   ◄─── { "request_id": "local-…",                               │
//! │                  "outcome": { "status": "ok", "server_id": "S-1" } }    │
//! │                                                                         │
//! │                { "outcome": { "status": "rejected",                     │
//! │                  "code": "ALREADY_SOLD", "message": "…" } }             │
//! │                                                                         │
//! │                { "outcome": { "status": "error", "message": "…" } }     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Responses are matched to requests by `request_id`; anything else on the
//! socket is ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use shopline_core::{
    CustomerPayload, MessagePayload, ReceiptPayload, SalePayload, SaleRefPayload,
    SaleUpdatePayload,
};

use super::{RemoteError, RemoteProduct};

/// Current protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

// =============================================================================
// Requests
// =============================================================================

/// Adjacently tagged: `{ "type": "CompleteSale", "payload": { ... } }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum RemoteRequest {
    FetchProduct { product_id: String },
    CompleteSale(SalePayload),
    UpdateSale(SaleUpdatePayload),
    DeleteSale(SaleRefPayload),
    SendMessage(MessagePayload),
    CreateReceipt(ReceiptPayload),
    CreateCustomer(CustomerPayload),
}

impl RemoteRequest {
    pub fn type_name(&self) -> &'static str {
        match self {
            RemoteRequest::FetchProduct { .. } => "FetchProduct",
            RemoteRequest::CompleteSale(_) => "CompleteSale",
            RemoteRequest::UpdateSale(_) => "UpdateSale",
            RemoteRequest::DeleteSale(_) => "DeleteSale",
            RemoteRequest::SendMessage(_) => "SendMessage",
            RemoteRequest::CreateReceipt(_) => "CreateReceipt",
            RemoteRequest::CreateCustomer(_) => "CreateCustomer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub request_id: String,
    pub version: u32,
    pub body: RemoteRequest,
}

impl RequestEnvelope {
    pub fn new(request_id: impl Into<String>, body: RemoteRequest) -> Self {
        RequestEnvelope {
            request_id: request_id.into(),
            version: PROTOCOL_VERSION,
            body,
        }
    }

    /// Serializes to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ResponseOutcome {
    Ok {
        server_id: Option<String>,
        product: Option<RemoteProduct>,
    },
    Rejected {
        code: String,
        message: String,
        server_data: Option<Value>,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub request_id: String,
    pub outcome: ResponseOutcome,
}

impl ResponseEnvelope {
    pub fn ok(request_id: impl Into<String>, server_id: impl Into<String>) -> Self {
        ResponseEnvelope {
            request_id: request_id.into(),
            outcome: ResponseOutcome::Ok {
                server_id: Some(server_id.into()),
                product: None,
            },
        }
    }

    pub fn product(request_id: impl Into<String>, product: Option<RemoteProduct>) -> Self {
        ResponseEnvelope {
            request_id: request_id.into(),
            outcome: ResponseOutcome::Ok {
                server_id: None,
                product,
            },
        }
    }

    pub fn rejected(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ResponseEnvelope {
            request_id: request_id.into(),
            outcome: ResponseOutcome::Rejected {
                code: code.into(),
                message: message.into(),
                server_data: None,
            },
        }
    }

    /// Serializes to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Server id of an accepted write.
    pub fn into_server_id(self) -> Result<String, RemoteError> {
        match self.outcome {
            ResponseOutcome::Ok {
                server_id: Some(id), ..
            } => Ok(id),
            ResponseOutcome::Ok { server_id: None, .. } => Err(RemoteError::Server(
                "Accepted without a server id".to_string(),
            )),
            other => Err(outcome_error(other)),
        }
    }

    /// Product of a `FetchProduct` answer. `NOT_FOUND` maps to `None`.
    pub fn into_product(self) -> Result<Option<RemoteProduct>, RemoteError> {
        match self.outcome {
            ResponseOutcome::Ok { product, .. } => Ok(product),
            ResponseOutcome::Rejected { ref code, .. } if code == super::codes::NOT_FOUND => Ok(None),
            other => Err(outcome_error(other)),
        }
    }
}

fn outcome_error(outcome: ResponseOutcome) -> RemoteError {
    match outcome {
        ResponseOutcome::Rejected {
            code,
            message,
            server_data,
        } => RemoteError::Rejected {
            code,
            message,
            server_data,
        },
        ResponseOutcome::Error { message } => RemoteError::Server(message),
        ResponseOutcome::Ok { .. } => RemoteError::Server("Unexpected response".to_string()),
    }
}
