//! # Queued Operations
//!
//! The closed set of operations a producer can queue, each with its payload.
//!
//! ## Wire Shape
//! ```text
//! {
//!   "operationType": "create-sale",
//!   "payload": { "productId": "...", "salePrice": 50000, ... }
//! }
//! ```
//!
//! The tag doubles as the dispatch key of the sync handlers: adding a
//! variant here is a compile error in every `match` that must handle it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::conflict::ResolutionAction;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::{Money, TaxBreakdown};
use crate::types::EntityType;

// =============================================================================
// Operation Type
// =============================================================================

/// Tag of an [`Operation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "kebab-case")]
pub enum OperationType {
    CreateSale,
    UpdateSale,
    DeleteSale,
    SendMessage,
    CreateReceipt,
    CreateCustomer,
}

impl OperationType {
    pub const ALL: [OperationType; 6] = [
        OperationType::CreateSale,
        OperationType::UpdateSale,
        OperationType::DeleteSale,
        OperationType::SendMessage,
        OperationType::CreateReceipt,
        OperationType::CreateCustomer,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            OperationType::CreateSale => "create-sale",
            OperationType::UpdateSale => "update-sale",
            OperationType::DeleteSale => "delete-sale",
            OperationType::SendMessage => "send-message",
            OperationType::CreateReceipt => "create-receipt",
            OperationType::CreateCustomer => "create-customer",
        }
    }

    /// Entity classification used when the producer does not pick one.
    pub const fn default_entity_type(&self) -> EntityType {
        match self {
            OperationType::CreateSale | OperationType::UpdateSale | OperationType::DeleteSale => {
                EntityType::Sale
            }
            OperationType::SendMessage => EntityType::Message,
            OperationType::CreateReceipt => EntityType::Receipt,
            OperationType::CreateCustomer => EntityType::Customer,
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationType::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "operation_type".to_string(),
                allowed: OperationType::ALL.iter().map(|op| op.to_string()).collect(),
            })
    }
}

// =============================================================================
// Payloads
// =============================================================================

/// Catalog attributes frozen at sale time so the queue renders offline.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
    pub brand: String,
    pub model: String,
    pub storage: Option<String>,
    pub color: Option<String>,
    pub condition: Option<String>,
    /// Serial number or IMEI.
    pub identifier: Option<String>,
}

impl ProductSnapshot {
    /// `"Apple iPhone 13 128GB"`
    pub fn display_name(&self) -> String {
        let mut name = format!("{} {}", self.brand, self.model).trim().to_string();
        if let Some(storage) = self.storage.as_deref().filter(|s| !s.is_empty()) {
            name.push(' ');
            name.push_str(storage);
        }
        name
    }
}

/// Buyer contact fields captured at the register.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyerContact {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// A sale completed offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalePayload {
    pub product_id: String,
    pub product: ProductSnapshot,
    pub sale_price: Money,
    pub cost_price: Money,
    #[serde(default)]
    pub buyer: BuyerContact,
    pub note: Option<String>,
    /// Generated locally; the server may reject it as a duplicate.
    pub receipt_number: String,
    pub tax: TaxBreakdown,
}

/// Edits to an already synced sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleUpdatePayload {
    pub sale_id: String,
    pub receipt_number: Option<String>,
    pub sale_price: Option<Money>,
    pub buyer: Option<BuyerContact>,
    pub note: Option<String>,
}

/// Reference to a sale to delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleRefPayload {
    pub sale_id: String,
    pub receipt_number: Option<String>,
    /// Product to release back to stock.
    pub product_id: Option<String>,
}

/// An outbound customer message (receipt by SMS/e-mail).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    /// Destination address (phone number or e-mail).
    pub to: String,
    /// Rendered message body.
    pub body: String,
    pub receipt_number: Option<String>,
    pub customer_name: Option<String>,
    /// Display only.
    pub total_amount: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptPayload {
    pub receipt_number: String,
    pub sale_id: Option<String>,
    pub total: Money,
    pub customer_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerPayload {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub note: Option<String>,
}

// =============================================================================
// Operation
// =============================================================================

/// A queued operation: the tag plus its typed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operationType", content = "payload", rename_all = "kebab-case")]
pub enum Operation {
    CreateSale(SalePayload),
    UpdateSale(SaleUpdatePayload),
    DeleteSale(SaleRefPayload),
    SendMessage(MessagePayload),
    CreateReceipt(ReceiptPayload),
    CreateCustomer(CustomerPayload),
}

impl Operation {
    pub fn kind(&self) -> OperationType {
        match self {
            Operation::CreateSale(_) => OperationType::CreateSale,
            Operation::UpdateSale(_) => OperationType::UpdateSale,
            Operation::DeleteSale(_) => OperationType::DeleteSale,
            Operation::SendMessage(_) => OperationType::SendMessage,
            Operation::CreateReceipt(_) => OperationType::CreateReceipt,
            Operation::CreateCustomer(_) => OperationType::CreateCustomer,
        }
    }

    /// Human label for queue lists.
    pub fn display_name(&self) -> String {
        match self {
            Operation::CreateSale(p) => format!("Sale: {}", p.product.display_name()),
            Operation::UpdateSale(p) => match &p.receipt_number {
                Some(receipt) => format!("Sale update {}", receipt),
                None => format!("Sale update {}", p.sale_id),
            },
            Operation::DeleteSale(p) => match &p.receipt_number {
                Some(receipt) => format!("Sale deletion {}", receipt),
                None => format!("Sale deletion {}", p.sale_id),
            },
            Operation::SendMessage(p) => {
                let to = p.customer_name.as_deref().unwrap_or(&p.to);
                format!("Message to {}", to)
            }
            Operation::CreateReceipt(p) => format!("Receipt {}", p.receipt_number),
            Operation::CreateCustomer(p) => format!("New customer {}", p.name),
        }
    }

    /// Amount shown next to the item, if the operation carries one.
    pub fn amount(&self) -> Option<Money> {
        match self {
            Operation::CreateSale(p) => Some(p.sale_price),
            Operation::UpdateSale(p) => p.sale_price,
            Operation::SendMessage(p) => p.total_amount,
            Operation::CreateReceipt(p) => Some(p.total),
            Operation::DeleteSale(_) | Operation::CreateCustomer(_) => None,
        }
    }

    pub fn receipt_number(&self) -> Option<&str> {
        match self {
            Operation::CreateSale(p) => Some(&p.receipt_number),
            Operation::UpdateSale(p) => p.receipt_number.as_deref(),
            Operation::DeleteSale(p) => p.receipt_number.as_deref(),
            Operation::SendMessage(p) => p.receipt_number.as_deref(),
            Operation::CreateReceipt(p) => Some(&p.receipt_number),
            Operation::CreateCustomer(_) => None,
        }
    }

    /// Catalog entity whose cached status this operation affects.
    pub fn product_id(&self) -> Option<&str> {
        match self {
            Operation::CreateSale(p) => Some(&p.product_id),
            Operation::DeleteSale(p) => p.product_id.as_deref(),
            _ => None,
        }
    }

    /// Returns a copy of a create-sale operation carrying a new receipt number.
    ///
    /// ## Errors
    /// [`CoreError::UnsupportedResolution`] for every other operation type.
    pub fn with_receipt_number(&self, receipt_number: impl Into<String>) -> CoreResult<Operation> {
        match self {
            Operation::CreateSale(p) => {
                let mut sale = p.clone();
                sale.receipt_number = receipt_number.into();
                Ok(Operation::CreateSale(sale))
            }
            other => Err(CoreError::UnsupportedResolution {
                action: ResolutionAction::GenerateNewNumber,
                operation: other.kind(),
            }),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{message, sale};

    #[test]
    fn test_operation_type_strings() {
        for op in OperationType::ALL {
            assert_eq!(op.as_str().parse::<OperationType>().unwrap(), op);
        }
        assert!("refund-sale".parse::<OperationType>().is_err());
    }

    #[test]
    fn test_adjacent_tag_json() {
        let json = serde_json::to_value(sale("P1", 50_000)).unwrap();
        assert_eq!(json["operationType"], "create-sale");
        assert_eq!(json["payload"]["productId"], "P1");
        assert_eq!(json["payload"]["salePrice"], 50_000);
        assert_eq!(json["payload"]["receiptNumber"], "20261017-3F-0042");
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let json = serde_json::json!({ "operationType": "refund-sale", "payload": {} });
        assert!(serde_json::from_value::<Operation>(json).is_err());
    }

    #[test]
    fn test_display_helpers() {
        let op = sale("P1", 50_000);
        assert_eq!(op.kind(), OperationType::CreateSale);
        assert_eq!(op.kind().default_entity_type(), EntityType::Sale);
        assert_eq!(op.display_name(), "Sale: Apple iPhone 13 128GB");
        assert_eq!(op.amount(), Some(Money::from_cents(50_000)));
        assert_eq!(op.product_id(), Some("P1"));
    }

    #[test]
    fn test_with_receipt_number_only_for_sales() {
        let op = sale("P1", 50_000);
        let renumbered = op.with_receipt_number("20261017-3F-9999").unwrap();
        assert_eq!(renumbered.receipt_number(), Some("20261017-3F-9999"));
        assert_eq!(op.receipt_number(), Some("20261017-3F-0042"));

        let msg = message("+34600000000");
        assert!(matches!(
            msg.with_receipt_number("x"),
            Err(CoreError::UnsupportedResolution { .. })
        ));
    }
}
