//! Builders shared by the unit tests.

use chrono::{DateTime, Duration, Utc};

use crate::money::{Money, TaxBreakdown, TaxRate};
use crate::operation::{BuyerContact, MessagePayload, Operation, ProductSnapshot, SalePayload};
use crate::types::{Priority, QueueItem};

pub fn sale(product_id: &str, price: i64) -> Operation {
    Operation::CreateSale(SalePayload {
        product_id: product_id.to_string(),
        product: ProductSnapshot {
            brand: "Apple".to_string(),
            model: "iPhone 13".to_string(),
            storage: Some("128GB".to_string()),
            color: Some("Midnight".to_string()),
            condition: Some("Grade A".to_string()),
            identifier: Some("356789104512345".to_string()),
        },
        sale_price: Money::from_cents(price),
        cost_price: Money::from_cents(price / 2),
        buyer: BuyerContact::default(),
        note: None,
        receipt_number: "20261017-3F-0042".to_string(),
        tax: TaxBreakdown::from_gross(Money::from_cents(price), TaxRate::from_bps(825), false),
    })
}

pub fn message(to: &str) -> Operation {
    Operation::SendMessage(MessagePayload {
        to: to.to_string(),
        body: "Thanks for your purchase".to_string(),
        receipt_number: Some("20261017-3F-0042".to_string()),
        customer_name: None,
        total_amount: Some(Money::from_cents(50_000)),
    })
}

pub fn item(id: &str, operation: Operation, priority: Priority, created_at: DateTime<Utc>) -> QueueItem {
    let entity_type = operation.kind().default_entity_type();
    QueueItem::new(id, operation, entity_type, priority, 3, created_at)
}

/// `n` seconds after a fixed instant.
pub fn at(n: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_790_000_000, 0).unwrap_or_default() + Duration::seconds(n)
}
