//! # shopline-sync: Offline-First Sync Engine for Shopline
//!
//! Lets a register keep selling while the authoritative store is
//! unreachable. Every mutation is recorded in the durable queue first and
//! replayed later, one item at a time, with business conflicts held for a
//! person to resolve.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                   SyncEngine (Main Orchestrator)                 │  │
//! │  │                                                                  │  │
//! │  │  Built by SyncEngineBuilder, started by the host application    │  │
//! │  │  Recovers interrupted items, wires reconnect → sync             │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ Connectivity   │  │ SyncScheduler  │  │ SyncQueueManager       │    │
//! │  │ Monitor        │  │                │  │                        │    │
//! │  │ TCP probe,     │  │ Debounced,     │  │ Enqueue, guarded       │    │
//! │  │ failure count, │  │ single-flight, │  │ transitions, counts,   │    │
//! │  │ online edges   │  │ batched passes │  │ crash recovery         │    │
//! │  └────────────────┘  └───────┬────────┘  └────────────────────────┘    │
//! │                              │                                          │
//! │                              ▼                                          │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ ConflictResolver│ │ Handlers       │  │ RemoteStore            │    │
//! │  │                │  │                │  │                        │    │
//! │  │ keep-local,    │  │ One per        │──│ WsRemoteStore: request │    │
//! │  │ discard, new   │  │ operation kind,│  │ envelopes over a       │    │
//! │  │ number, merge  │  │ sale pre-flight│  │ WebSocket              │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  EVENTS (SyncEventEmitter):                                             │
//! │  • counts      - queue counts after every mutation                     │
//! │  • progress    - current/total during a pass                           │
//! │  • batch       - BatchResult when a pass ends                          │
//! │  • connectivity/offline - online edges and offline notices             │
//! │  • error       - failed passes                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`engine`] - `SyncEngine` orchestrator and builder
//! - [`config`] - Device, store, remote and persisted sync settings
//! - [`error`] - Sync error types
//! - [`events`] - Event emitter seam
//! - [`queue`] - Queue manager over the durable store
//! - [`connectivity`] - Reachability monitor
//! - [`scheduler`] - Sync passes and single-item retry
//! - [`handlers`] - Per-operation replay and rejection classification
//! - [`resolver`] - Conflict resolution actions
//! - [`remote`] - Remote store trait, wire protocol, WebSocket client
//!
//! ## Usage
//!
//! ```rust,ignore
//! use shopline_sync::{SyncConfig, SyncEngineBuilder, TracingEmitter};
//! use std::sync::Arc;
//!
//! let config = SyncConfig::load(None)?;
//! let mut engine = SyncEngineBuilder::new(config)
//!     .with_emitter(Arc::new(TracingEmitter))
//!     .build()
//!     .await?;
//! engine.start().await?;
//!
//! // Record a sale; it syncs as soon as the store is reachable
//! engine.enqueue(Operation::CreateSale(sale)).await?;
//!
//! let status = engine.status().await?;
//! println!("Online: {}, pending: {}", status.online, status.counts.pending);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod connectivity;
pub mod engine;
pub mod error;
pub mod events;
pub mod handlers;
pub mod queue;
pub mod remote;
pub mod resolver;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConnectivityConfig, RemoteConfig, SharedSettings, SyncConfig, SyncSettings};
pub use connectivity::{ConnectivityMonitor, ConnectivityWatchHandle, NetworkProbe, TcpProbe};
pub use engine::{SyncEngine, SyncEngineBuilder, SyncStatus};
pub use error::{SyncError, SyncResult};
pub use events::{NoOpEmitter, SyncEventEmitter, TracingEmitter};
pub use handlers::HandlerOutcome;
pub use queue::{EnqueueRequest, SyncQueueManager};
pub use remote::{RemoteError, RemoteProduct, RemoteStore, WsRemoteConfig, WsRemoteStore};
pub use resolver::{CatalogCache, ConflictResolver, ResolutionInput, ResolutionResult, ResolveAllResult};
pub use scheduler::{BatchResult, ItemOutcome, SyncProgress, SyncScheduler, SyncTrigger};
