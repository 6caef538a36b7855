//! # Operation Handlers
//!
//! Replays one queue item against the remote store and classifies the
//! answer. Dispatch is a `match` over the closed [`Operation`] enum.
//!
//! ## Sale Pre-flight
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create-sale(P1)                                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  fetch_product(P1) ──► None ───────────────► conflict: entity-deleted   │
//! │       │                                                                 │
//! │       ├──► sold (by another request) ──────► conflict: already-finalized│
//! │       ├──► reserved ───────────────────────► conflict: unavailable      │
//! │       ├──► sold by THIS request id ──┐                                  │
//! │       └──► available ────────────────┴──► complete_sale(item.id, sale)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A unit already sold by this item's own request id means an earlier
//! attempt reached the server but the answer was lost; the write is
//! replayed and the server hands back the same id.

use serde_json::Value;
use tracing::debug;

use shopline_core::{ConflictType, Operation, ProductStatus, QueueItem, SalePayload};

use crate::remote::{codes, RemoteError, RemoteResult, RemoteStore};

/// How a single remote attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    Synced {
        server_id: String,
    },
    Conflict {
        conflict_type: ConflictType,
        description: String,
        server_data: Option<Value>,
    },
    Failed {
        message: String,
        /// Nothing answered; the connectivity monitor should hear about it.
        unreachable: bool,
    },
}

/// Sends `item` to the remote store.
pub async fn dispatch(remote: &dyn RemoteStore, item: &QueueItem) -> HandlerOutcome {
    debug!(item_id = %item.id, operation = %item.operation_type(), "Dispatching");

    let result = match &item.operation {
        Operation::CreateSale(sale) => return create_sale(remote, &item.id, sale).await,
        Operation::UpdateSale(update) => remote.update_sale(&item.id, update).await,
        Operation::DeleteSale(sale) => remote.delete_sale(&item.id, sale).await,
        Operation::SendMessage(message) => remote.send_message(&item.id, message).await,
        Operation::CreateReceipt(receipt) => remote.create_receipt(&item.id, receipt).await,
        Operation::CreateCustomer(customer) => remote.create_customer(&item.id, customer).await,
    };

    outcome_from(result)
}

async fn create_sale(remote: &dyn RemoteStore, request_id: &str, sale: &SalePayload) -> HandlerOutcome {
    let name = sale.product.display_name();

    let product = match remote.fetch_product(&sale.product_id).await {
        Ok(product) => product,
        Err(e) => return outcome_from(Err(e)),
    };

    match product {
        None => {
            return HandlerOutcome::Conflict {
                conflict_type: ConflictType::EntityDeleted,
                description: format!("{} ({}) no longer exists on the server", name, sale.product_id),
                server_data: None,
            };
        }
        Some(product) => {
            let replay = product.last_request_id.as_deref() == Some(request_id);
            let conflict = match product.status {
                ProductStatus::Sold if replay => None,
                ProductStatus::Sold => Some((
                    ConflictType::EntityAlreadyFinalized,
                    format!("{} was already sold at another register", name),
                )),
                ProductStatus::Reserved => Some((
                    ConflictType::EntityUnavailable,
                    format!("{} is reserved and cannot be sold", name),
                )),
                ProductStatus::Available => None,
            };

            if let Some((conflict_type, description)) = conflict {
                return HandlerOutcome::Conflict {
                    conflict_type,
                    description,
                    server_data: serde_json::to_value(&product).ok(),
                };
            }
            if replay {
                debug!(request_id = %request_id, "Sale already applied, replaying for server id");
            }
        }
    }

    outcome_from(remote.complete_sale(request_id, sale).await)
}

/// Maps a rejection to a conflict type, by code first, then by wording.
///
/// `None` means the rejection is not a recognised business conflict.
pub fn classify_rejection(code: &str, message: &str) -> Option<ConflictType> {
    let by_code = match code {
        codes::DUPLICATE_RECEIPT_NUMBER => Some(ConflictType::DuplicateReceiptNumber),
        codes::ALREADY_SOLD => Some(ConflictType::EntityAlreadyFinalized),
        codes::NOT_AVAILABLE => Some(ConflictType::EntityUnavailable),
        codes::NOT_FOUND => Some(ConflictType::EntityDeleted),
        codes::VERSION_MISMATCH => Some(ConflictType::DataModified),
        _ => None,
    };
    if by_code.is_some() {
        return by_code;
    }

    let message = message.to_lowercase();
    if message.contains("duplicate") && message.contains("receipt") {
        Some(ConflictType::DuplicateReceiptNumber)
    } else if message.contains("already sold") {
        Some(ConflictType::EntityAlreadyFinalized)
    } else if message.contains("not available") {
        Some(ConflictType::EntityUnavailable)
    } else if message.contains("not found") || message.contains("deleted") {
        Some(ConflictType::EntityDeleted)
    } else if message.contains("modified") {
        Some(ConflictType::DataModified)
    } else {
        None
    }
}

/// Classifies the result of a remote write.
pub fn outcome_from(result: RemoteResult<String>) -> HandlerOutcome {
    match result {
        Ok(server_id) => HandlerOutcome::Synced { server_id },
        Err(RemoteError::Rejected {
            code,
            message,
            server_data,
        }) => match classify_rejection(&code, &message) {
            Some(conflict_type) => HandlerOutcome::Conflict {
                conflict_type,
                description: message,
                server_data,
            },
            None => HandlerOutcome::Failed {
                message: format!("Rejected ({}): {}", code, message),
                unreachable: false,
            },
        },
        Err(e) => HandlerOutcome::Failed {
            unreachable: e.is_unreachable(),
            message: e.to_string(),
        },
    }
}
