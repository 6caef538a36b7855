//! # Sync Engine
//!
//! Builds the components, restores persisted settings, recovers from a
//! crash and keeps the scheduler listening to connectivity.
//!
//! ## Engine Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncEngine Architecture                          │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                         SyncEngine                               │  │
//! │  │  • start(): recover_interrupted → listen → check → watch         │  │
//! │  │  • update_settings(): validate → persist → apply                 │  │
//! │  │  • shutdown(): stop listener, watcher and pending trigger        │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │     ┌──────────────────┬──────┴───────────┬────────────────────┐       │
//! │     ▼                  ▼                  ▼                    ▼        │
//! │  ┌──────────────┐ ┌──────────────┐ ┌──────────────┐ ┌────────────────┐ │
//! │  │ Connectivity │ │ SyncScheduler│ │ SyncQueue    │ │ Conflict       │ │
//! │  │ Monitor      │ │              │ │ Manager      │ │ Resolver       │ │
//! │  └──────┬───────┘ └──────▲───────┘ └──────────────┘ └────────────────┘ │
//! │         │   online edge  │                                              │
//! │         └── request_sync(Reconnect) ──┘   offline edge: cancel trigger  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shopline_core::{QueueCounts, QueueItem};
use shopline_db::{DbConfig, QueueStore};

use crate::config::{SharedSettings, SyncConfig, SyncSettings};
use crate::connectivity::{ConnectivityMonitor, ConnectivityWatchHandle, NetworkProbe, TcpProbe};
use crate::error::{SyncError, SyncResult};
use crate::events::{NoOpEmitter, SyncEventEmitter};
use crate::queue::{EnqueueRequest, SyncQueueManager};
use crate::remote::{RemoteStore, WsRemoteConfig, WsRemoteStore};
use crate::resolver::{CatalogCache, ConflictResolver};
use crate::scheduler::{BatchResult, SyncScheduler, SyncTrigger};

// =============================================================================
// Sync Status
// =============================================================================

/// Snapshot for status bars and health endpoints.
#[derive(Debug, Clone, Default)]
pub struct SyncStatus {
    pub online: bool,
    pub syncing: bool,
    pub counts: QueueCounts,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_result: Option<BatchResult>,
}

// =============================================================================
// Sync Engine
// =============================================================================

pub struct SyncEngine {
    config: Arc<SyncConfig>,
    device_id: String,
    store: QueueStore,
    settings: SharedSettings,
    queue: Arc<SyncQueueManager>,
    connectivity: Arc<ConnectivityMonitor>,
    scheduler: Arc<SyncScheduler>,
    resolver: Arc<ConflictResolver>,
    listener_tx: Option<mpsc::Sender<()>>,
    watch_handle: Option<ConnectivityWatchHandle>,
}

impl SyncEngine {
    /// Starts background work.
    ///
    /// Items left in `syncing` by a crash are recovered first; the initial
    /// connectivity check then fires a reconnect trigger if the store is
    /// reachable.
    pub async fn start(&mut self) -> SyncResult<()> {
        if self.listener_tx.is_some() {
            debug!("Sync engine already started");
            return Ok(());
        }

        info!(
            device_id = %self.device_id,
            remote = ?self.config.remote_url(),
            "Starting sync engine"
        );

        let recovered = self.queue.recover_interrupted().await?;
        if recovered > 0 {
            warn!(recovered, "Recovered items interrupted by a previous shutdown");
        }
        self.queue.counts().await?;

        self.listener_tx = Some(self.spawn_reconnect_listener());
        self.connectivity.check_connection().await;
        self.watch_handle = Some(self.connectivity.watch());

        info!("Sync engine started");
        Ok(())
    }

    /// Forwards connectivity edges to the scheduler.
    fn spawn_reconnect_listener(&self) -> mpsc::Sender<()> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let mut state_rx = self.connectivity.subscribe();
        let scheduler = self.scheduler.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = state_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let online = *state_rx.borrow_and_update();
                        if online {
                            scheduler.request_sync(SyncTrigger::Reconnect);
                        } else {
                            scheduler.cancel_pending_trigger();
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
            debug!("Reconnect listener stopped");
        });

        shutdown_tx
    }

    /// Stops background work. A pass already running finishes on its own.
    pub async fn shutdown(&mut self) {
        info!("Shutting down sync engine");

        if let Some(tx) = self.listener_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.watch_handle.take() {
            handle.shutdown().await;
        }
        self.scheduler.cancel_pending_trigger();

        info!("Sync engine stopped");
    }

    // =========================================================================
    // Settings
    // =========================================================================

    pub async fn settings(&self) -> SyncSettings {
        self.settings.read().await.clone()
    }

    /// Validates, persists, then applies new settings.
    pub async fn update_settings(&self, settings: SyncSettings) -> SyncResult<()> {
        settings.validate()?;
        self.store.put_config(&settings).await?;

        self.connectivity.set_notifications(settings.show_notifications);
        *self.settings.write().await = settings;

        info!("Sync settings updated");
        Ok(())
    }

    // =========================================================================
    // Delegation and Accessors
    // =========================================================================

    pub async fn enqueue(&self, request: impl Into<EnqueueRequest>) -> SyncResult<QueueItem> {
        self.queue.enqueue(request).await
    }

    /// Debounced manual trigger.
    pub fn trigger_sync(&self) {
        self.scheduler.request_sync(SyncTrigger::Manual);
    }

    pub async fn sync_now(&self) -> SyncResult<BatchResult> {
        self.scheduler.sync_now().await
    }

    pub async fn status(&self) -> SyncResult<SyncStatus> {
        Ok(SyncStatus {
            online: self.connectivity.is_online(),
            syncing: self.scheduler.is_syncing(),
            counts: self.queue.counts().await?,
            last_sync: self.queue.last_sync_time().await?,
            last_result: self.scheduler.last_result(),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Device id in effect: configured, or the one recorded in the store.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn queue(&self) -> &Arc<SyncQueueManager> {
        &self.queue
    }

    pub fn scheduler(&self) -> &Arc<SyncScheduler> {
        &self.scheduler
    }

    pub fn resolver(&self) -> &Arc<ConflictResolver> {
        &self.resolver
    }

    pub fn connectivity(&self) -> &Arc<ConnectivityMonitor> {
        &self.connectivity
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for creating a SyncEngine with options.
///
/// Anything not supplied is derived from the config: the store from
/// `store.database_path`, the remote and probe from `remote.url`, the
/// catalog cache from the store.
pub struct SyncEngineBuilder {
    config: SyncConfig,
    store: Option<QueueStore>,
    remote: Option<Arc<dyn RemoteStore>>,
    probe: Option<Arc<dyn NetworkProbe>>,
    catalog: Option<Arc<dyn CatalogCache>>,
    emitter: Option<Arc<dyn SyncEventEmitter>>,
}

impl SyncEngineBuilder {
    pub fn new(config: SyncConfig) -> Self {
        SyncEngineBuilder {
            config,
            store: None,
            remote: None,
            probe: None,
            catalog: None,
            emitter: None,
        }
    }

    pub fn with_store(mut self, store: QueueStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn NetworkProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogCache>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn SyncEventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Builds the engine.
    ///
    /// Settings persisted in the store win over the config file; on first
    /// run the file settings are persisted. The device id follows the
    /// opposite rule: a configured id wins, otherwise the id recorded on
    /// first run is reused.
    pub async fn build(self) -> SyncResult<SyncEngine> {
        let config = self.config;
        config.validate()?;

        let store = match self.store {
            Some(store) => store,
            None => QueueStore::open(DbConfig::new(&config.store.database_path)).await,
        };

        let remote: Arc<dyn RemoteStore> = match self.remote {
            Some(remote) => remote,
            None => Arc::new(WsRemoteStore::new(WsRemoteConfig::from_config(&config.remote)?)),
        };

        let probe: Arc<dyn NetworkProbe> = match self.probe {
            Some(probe) => probe,
            None => {
                let url = config
                    .remote_url()
                    .ok_or_else(|| SyncError::InvalidConfig("remote.url is not set".into()))?;
                Arc::new(TcpProbe::from_url(url, config.connectivity.probe_timeout())?)
            }
        };

        let catalog = self.catalog.unwrap_or_else(|| Arc::new(store.clone()));
        let emitter = self.emitter.unwrap_or_else(|| Arc::new(NoOpEmitter));

        let settings = match store.get_config::<SyncSettings>().await? {
            Some(stored) if stored.validate().is_ok() => {
                debug!("Using persisted sync settings");
                stored
            }
            Some(_) => {
                warn!("Persisted sync settings are invalid, using the config file");
                store.put_config(&config.sync).await?;
                config.sync.clone()
            }
            None => {
                store.put_config(&config.sync).await?;
                config.sync.clone()
            }
        };
        let device_id = resolve_device_id(&store, config.device_id()).await?;
        let show_notifications = settings.show_notifications;
        let settings = settings.shared();

        let queue = Arc::new(SyncQueueManager::new(
            store.clone(),
            settings.clone(),
            emitter.clone(),
        ));
        let connectivity = Arc::new(ConnectivityMonitor::new(
            probe,
            config.connectivity.clone(),
            emitter.clone(),
        ));
        connectivity.set_notifications(show_notifications);

        let scheduler = Arc::new(SyncScheduler::new(
            queue.clone(),
            remote,
            connectivity.clone(),
            settings.clone(),
            emitter,
        ));
        let resolver = Arc::new(ConflictResolver::new(
            queue.clone(),
            scheduler.clone(),
            catalog,
            device_id.clone(),
        ));

        Ok(SyncEngine {
            config: Arc::new(config),
            device_id,
            store,
            settings,
            queue,
            connectivity,
            scheduler,
            resolver,
            listener_tx: None,
            watch_handle: None,
        })
    }
}

/// Configured id, else the recorded one, else a new UUID v4 that is
/// recorded so receipt device codes stay stable across restarts.
async fn resolve_device_id(store: &QueueStore, configured: Option<&str>) -> SyncResult<String> {
    let stored = store.get_device_id().await?;

    if let Some(id) = configured {
        if stored.as_deref() != Some(id) {
            store.put_device_id(id).await?;
        }
        return Ok(id.to_string());
    }

    match stored {
        Some(id) => {
            debug!(device_id = %id, "Using recorded device id");
            Ok(id)
        }
        None => {
            let id = Uuid::new_v4().to_string();
            store.put_device_id(&id).await?;
            info!(device_id = %id, "Generated device id");
            Ok(id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{message, FakeProbe, FakeRemote, RecordingEmitter};
    use shopline_core::receipt::device_code;
    use shopline_core::QueueStatus;
    use std::time::Duration;

    struct Fixture {
        store: QueueStore,
        remote: Arc<FakeRemote>,
        probe: Arc<FakeProbe>,
        emitter: Arc<RecordingEmitter>,
    }

    impl Fixture {
        async fn new() -> Self {
            Fixture {
                store: QueueStore::open(DbConfig::in_memory()).await,
                remote: Arc::new(FakeRemote::new()),
                probe: Arc::new(FakeProbe::new(true)),
                emitter: Arc::new(RecordingEmitter::default()),
            }
        }

        fn builder(&self) -> SyncEngineBuilder {
            let mut config = SyncConfig::default();
            config.sync.auto_sync_delay_ms = 50;
            config.sync.batch_delay_ms = 0;

            SyncEngineBuilder::new(config)
                .with_store(self.store.clone())
                .with_remote(self.remote.clone())
                .with_probe(self.probe.clone())
                .with_emitter(self.emitter.clone())
        }
    }

    #[tokio::test]
    async fn test_first_build_persists_settings() {
        let f = Fixture::new().await;
        let engine = f.builder().build().await.unwrap();

        let stored: SyncSettings = f.store.get_config().await.unwrap().unwrap();
        assert_eq!(stored, engine.settings().await);
        assert_eq!(stored.auto_sync_delay_ms, 50);
    }

    #[tokio::test]
    async fn test_persisted_settings_win() {
        let f = Fixture::new().await;
        let persisted = SyncSettings {
            auto_sync_delay_ms: 1234,
            sync_batch_size: 3,
            ..Default::default()
        };
        f.store.put_config(&persisted).await.unwrap();

        let engine = f.builder().build().await.unwrap();
        assert_eq!(engine.settings().await, persisted);
    }

    #[tokio::test]
    async fn test_generated_device_id_survives_restart() {
        let f = Fixture::new().await;

        let first = f.builder().build().await.unwrap();
        let second = f.builder().build().await.unwrap();

        assert!(!first.device_id().is_empty());
        assert_eq!(first.device_id(), second.device_id());
        assert_eq!(
            device_code(first.device_id()),
            device_code(second.device_id())
        );
        assert_eq!(
            f.store.get_device_id().await.unwrap().as_deref(),
            Some(first.device_id())
        );
    }

    #[tokio::test]
    async fn test_configured_device_id_wins_and_is_recorded() {
        let f = Fixture::new().await;
        f.store.put_device_id("register-old").await.unwrap();

        let mut config = SyncConfig::default();
        config.device.id = Some("register-3f".to_string());
        let engine = SyncEngineBuilder::new(config)
            .with_store(f.store.clone())
            .with_remote(f.remote.clone())
            .with_probe(f.probe.clone())
            .build()
            .await
            .unwrap();

        assert_eq!(engine.device_id(), "register-3f");
        assert_eq!(device_code(engine.device_id()), "3F");
        assert_eq!(
            f.store.get_device_id().await.unwrap().as_deref(),
            Some("register-3f")
        );
    }

    #[tokio::test]
    async fn test_build_requires_remote_url() {
        let f = Fixture::new().await;
        let result = SyncEngineBuilder::new(SyncConfig::default())
            .with_store(f.store.clone())
            .build()
            .await;

        assert!(matches!(result, Err(ref e) if e.is_config_error()));
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_fast() {
        let f = Fixture::new().await;
        let result = f
            .builder()
            .with_store(QueueStore::unavailable("disk full"))
            .build()
            .await;

        assert!(matches!(result, Err(SyncError::Storage(_))));
    }

    #[tokio::test]
    async fn test_start_recovers_and_syncs_on_reconnect() {
        let f = Fixture::new().await;
        let mut engine = f.builder().build().await.unwrap();

        // Left mid-attempt by a previous run
        let stuck = engine.enqueue(message("+15550100")).await.unwrap();
        engine.queue().mark_syncing(&stuck.id).await.unwrap();

        engine.start().await.unwrap();
        assert!(engine.connectivity().is_online());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(engine.queue().get_all().await.unwrap().is_empty());
        assert_eq!(f.remote.write_count(), 1);

        let status = engine.status().await.unwrap();
        assert!(status.online);
        assert!(!status.syncing);
        assert_eq!(status.counts, QueueCounts::default());
        assert!(status.last_sync.is_some());
        assert_eq!(status.last_result.map(|r| r.synced_items), Some(1));
        assert_eq!(f.emitter.connectivity_events(), vec![true]);

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_offline_keeps_items_pending() {
        let f = Fixture::new().await;
        f.probe.set_reachable(false);
        let mut engine = f.builder().build().await.unwrap();
        let item = engine.enqueue(message("+15550100")).await.unwrap();

        engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(!engine.connectivity().is_online());
        let stored = engine.queue().get(&item.id).await.unwrap().unwrap();
        assert_eq!(stored.status(), QueueStatus::Pending);
        assert!(f.remote.calls().is_empty());

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_update_settings() {
        let f = Fixture::new().await;
        let engine = f.builder().build().await.unwrap();

        let invalid = SyncSettings {
            sync_batch_size: 0,
            ..Default::default()
        };
        assert!(engine.update_settings(invalid).await.unwrap_err().is_config_error());

        let quiet = SyncSettings {
            auto_sync_enabled: false,
            show_notifications: false,
            ..Default::default()
        };
        engine.update_settings(quiet.clone()).await.unwrap();
        assert_eq!(engine.settings().await, quiet);

        let stored: SyncSettings = f.store.get_config().await.unwrap().unwrap();
        assert_eq!(stored, quiet);
    }
}
