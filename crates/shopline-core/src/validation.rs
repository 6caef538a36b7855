//! # Validation Module
//!
//! Checks applied to producer input before it reaches the durable queue, and
//! to caller input of the conflict resolver (new receipt numbers, merged
//! payloads).
//!
//! ## Where Validation Runs
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  enqueue(operation)         resolve(id, merge, payload)                 │
//! │         │                            │                                  │
//! │         ▼                            ▼                                  │
//! │  validate_operation() ◄──────────────┘   THIS MODULE                    │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  queue store (NOT NULL / CHECK constraints)                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use shopline_core::validation::validate_receipt_number;
//!
//! assert!(validate_receipt_number("20261017-3F-0042").is_ok());
//! assert!(validate_receipt_number("").is_err());
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::operation::{
    CustomerPayload, MessagePayload, Operation, ReceiptPayload, SalePayload, SaleRefPayload,
    SaleUpdatePayload,
};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_RECEIPT_NUMBER_LEN: usize = 32;
const MAX_MESSAGE_LEN: usize = 1600;
const MAX_NOTE_LEN: usize = 500;

// =============================================================================
// Field Validators
// =============================================================================

fn require(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::required(field));
    }
    Ok(())
}

fn max_len(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}

fn positive(field: &str, amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a receipt number.
///
/// ## Rules
/// - Not empty, at most 32 characters
/// - Letters, digits and hyphens only
pub fn validate_receipt_number(receipt_number: &str) -> ValidationResult<()> {
    let value = receipt_number.trim();
    require("receipt_number", value)?;
    max_len("receipt_number", value, MAX_RECEIPT_NUMBER_LEN)?;

    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(ValidationError::InvalidFormat {
            field: "receipt_number".to_string(),
            reason: "must contain only letters, numbers and hyphens".to_string(),
        });
    }
    Ok(())
}

/// Validates a queue item id supplied by a caller.
pub fn validate_item_id(id: &str) -> ValidationResult<()> {
    require("id", id)?;
    max_len("id", id, 64)
}

fn validate_note(note: &Option<String>) -> ValidationResult<()> {
    match note {
        Some(note) => max_len("note", note, MAX_NOTE_LEN),
        None => Ok(()),
    }
}

// =============================================================================
// Payload Validators
// =============================================================================

pub fn validate_sale(sale: &SalePayload) -> ValidationResult<()> {
    require("product_id", &sale.product_id)?;
    require("brand", &sale.product.brand)?;
    require("model", &sale.product.model)?;
    positive("sale_price", sale.sale_price)?;
    if sale.cost_price.is_negative() {
        return Err(ValidationError::MustBePositive {
            field: "cost_price".to_string(),
        });
    }
    validate_receipt_number(&sale.receipt_number)?;
    validate_note(&sale.note)?;

    // Computed at enqueue time; must add back up to the sale price
    if sale.tax.gross() != sale.sale_price {
        return Err(ValidationError::InvalidFormat {
            field: "tax".to_string(),
            reason: format!(
                "breakdown totals {} but sale price is {}",
                sale.tax.gross(),
                sale.sale_price
            ),
        });
    }
    Ok(())
}

pub fn validate_sale_update(update: &SaleUpdatePayload) -> ValidationResult<()> {
    require("sale_id", &update.sale_id)?;
    if let Some(price) = update.sale_price {
        positive("sale_price", price)?;
    }
    if let Some(receipt) = &update.receipt_number {
        validate_receipt_number(receipt)?;
    }
    validate_note(&update.note)
}

pub fn validate_sale_ref(sale: &SaleRefPayload) -> ValidationResult<()> {
    require("sale_id", &sale.sale_id)
}

/// Validates an outbound message.
///
/// ## Rules
/// - Destination and body are required
/// - Body is at most 1600 characters (ten concatenated SMS segments)
pub fn validate_message(message: &MessagePayload) -> ValidationResult<()> {
    require("to", &message.to)?;
    require("body", &message.body)?;
    max_len("body", &message.body, MAX_MESSAGE_LEN)
}

pub fn validate_receipt(receipt: &ReceiptPayload) -> ValidationResult<()> {
    validate_receipt_number(&receipt.receipt_number)?;
    if receipt.total.is_negative() {
        return Err(ValidationError::MustBePositive {
            field: "total".to_string(),
        });
    }
    Ok(())
}

pub fn validate_customer(customer: &CustomerPayload) -> ValidationResult<()> {
    require("name", &customer.name)?;
    max_len("name", &customer.name, 200)?;
    if let Some(email) = customer.email.as_deref().filter(|e| !e.is_empty()) {
        if !email.contains('@') {
            return Err(ValidationError::InvalidFormat {
                field: "email".to_string(),
                reason: "must contain @".to_string(),
            });
        }
    }
    validate_note(&customer.note)
}

/// Validates whichever payload the operation carries.
pub fn validate_operation(operation: &Operation) -> ValidationResult<()> {
    match operation {
        Operation::CreateSale(p) => validate_sale(p),
        Operation::UpdateSale(p) => validate_sale_update(p),
        Operation::DeleteSale(p) => validate_sale_ref(p),
        Operation::SendMessage(p) => validate_message(p),
        Operation::CreateReceipt(p) => validate_receipt(p),
        Operation::CreateCustomer(p) => validate_customer(p),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
