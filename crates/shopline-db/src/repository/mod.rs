//! # Repository Module
//!
//! One repository per table. Each owns its SQL and converts rows into
//! `shopline-core` types.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  QueueStore (store.rs)                                                  │
//! │       │                                                                 │
//! │       ├── db.queue_items()  → QueueItemRepository    → queue_items      │
//! │       ├── db.sync_state()   → SyncStateRepository    → sync_state       │
//! │       └── db.catalog()      → CatalogCacheRepository → cached_products  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`QueueItemRepository`](queue::QueueItemRepository) - Queue items and their status index
//! - [`SyncStateRepository`](sync_state::SyncStateRepository) - Singleton key/value records
//! - [`CatalogCacheRepository`](catalog::CatalogCacheRepository) - Cached catalog read-model

pub mod catalog;
pub mod queue;
pub mod sync_state;
