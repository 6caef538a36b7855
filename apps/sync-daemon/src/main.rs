//! # Shopline Sync Daemon
//!
//! Headless runner for the sync engine.
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Daemon                                      │
//! │                                                                         │
//! │  1. init_tracing()      RUST_LOG or info,shopline=debug,sqlx=warn      │
//! │  2. SyncConfig::load()  defaults → sync.toml → SHOPLINE_* → validate   │
//! │  3. build()             queue store, WebSocket remote, TCP probe       │
//! │  4. start()             recover, listen for reconnects, first check    │
//! │  5. Ctrl-C              shutdown()                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```text
//! sync-daemon [path/to/sync.toml]
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use shopline_sync::{SyncConfig, SyncEngine, SyncEngineBuilder, TracingEmitter};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// How often the daemon logs a status line.
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = SyncConfig::load(config_path)?;
    info!(
        database = ?config.store.database_path,
        remote = ?config.remote_url(),
        "Configuration loaded"
    );

    let mut engine = SyncEngineBuilder::new(config)
        .with_emitter(Arc::new(TracingEmitter))
        .build()
        .await?;
    info!(device_id = %engine.device_id(), "Engine built");
    engine.start().await?;

    run_until_ctrl_c(&engine).await;

    engine.shutdown().await;
    info!("Sync daemon stopped");
    Ok(())
}

/// Logs a periodic status line until Ctrl-C.
async fn run_until_ctrl_c(engine: &SyncEngine) {
    let mut ticker = tokio::time::interval(STATUS_INTERVAL);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match engine.status().await {
                    Ok(status) => info!(
                        online = status.online,
                        syncing = status.syncing,
                        pending = status.counts.pending,
                        conflict = status.counts.conflict,
                        failed = status.counts.failed,
                        last_sync = ?status.last_sync,
                        "Status"
                    ),
                    Err(e) => warn!(error = %e, "Failed to read status"),
                }
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!(error = %e, "Failed to listen for Ctrl-C");
                }
                info!("Shutdown requested");
                break;
            }
        }
    }
}

/// Initializes the tracing subscriber.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,shopline=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
