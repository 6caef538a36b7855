//! # shopline-core: Pure Types for the Shopline Sync Engine
//!
//! Everything the offline-first engine knows about a queued operation,
//! expressed as plain data and pure functions.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Shopline Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │        Producers (sale workflow, messaging workflow)            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ enqueue(...)                           │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  shopline-sync (engine)                         │   │
//! │  │   queue manager • scheduler • resolver • connectivity           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ shopline-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │ operation │  │ conflict  │  │   state   │  │   │
//! │  │   │ QueueItem │  │ payloads  │  │ options   │  │ machine   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 shopline-db (durable queue store)               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Queue item, statuses, priorities, display projections
//! - [`operation`] - The closed set of queued operations and their payloads
//! - [`conflict`] - Conflict types, resolution actions, display helper
//! - [`state`] - Guarded status transitions and processing order
//! - [`money`] - Integer money, tax rates, tax breakdown
//! - [`receipt`] - Locally generated receipt numbers
//! - [`validation`] - Input validation for producer payloads
//! - [`error`] - Domain error types

pub mod conflict;
pub mod error;
pub mod money;
pub mod operation;
pub mod receipt;
pub mod state;
pub mod types;
pub mod validation;

#[cfg(test)]
pub(crate) mod fixtures;

pub use conflict::{ConflictData, ConflictDisplay, ConflictType, ResolutionAction, ResolutionOption};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{Money, TaxBreakdown, TaxRate};
pub use operation::{
    BuyerContact, CustomerPayload, MessagePayload, Operation, OperationType, ProductSnapshot,
    ReceiptPayload, SalePayload, SaleRefPayload, SaleUpdatePayload,
};
pub use types::*;

/// Default retry budget for a queue item.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Prefix of locally generated queue item ids.
///
/// The id is shown in the UI as the temporary identifier of an operation
/// until the authoritative store hands back its own id.
pub const LOCAL_ID_PREFIX: &str = "local-";
