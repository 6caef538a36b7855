//! # shopline-db: Durable Queue Store
//!
//! SQLite persistence for queue items, the singleton sync records and the
//! cached catalog read-model.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Shopline Data Flow                               │
//! │                                                                         │
//! │  SyncQueueManager / ConflictResolver (shopline-sync)                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   shopline-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │  QueueStore   │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │  (store.rs)   │───►│ queue_items   │    │  (embedded)  │  │   │
//! │  │   │ sticky error  │    │ sync_state    │    │ 001_queue    │  │   │
//! │  │   │               │    │ catalog       │    │ 002_catalog  │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   <data dir>/shopline/shopline-sync.db                          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`store`] - The queue store facade used by the engine
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`repository`] - SQL for each table
//! - [`error`] - Database error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use shopline_db::{DbConfig, QueueStore};
//!
//! let store = QueueStore::open(DbConfig::new("shopline-sync.db")).await;
//! store.put(&item).await?;
//! let pending = store.get_by_status(QueueStatus::Pending).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use store::QueueStore;

pub use repository::catalog::CatalogCacheRepository;
pub use repository::queue::QueueItemRepository;
pub use repository::sync_state::SyncStateRepository;
