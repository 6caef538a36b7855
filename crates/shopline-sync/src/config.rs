//! # Sync Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Queue Store config record (highest priority, [sync] section only)  │
//! │     Written by SyncEngine::update_settings, survives restarts          │
//! │                                                                         │
//! │  2. Environment Variables                                              │
//! │     SHOPLINE_REMOTE_URL=wss://pos.example.com/sync                     │
//! │     SHOPLINE_AUTO_SYNC=false                                           │
//! │                                                                         │
//! │  3. TOML Config File                                                   │
//! │     ~/.config/shopline-sync/sync.toml (Linux)                          │
//! │     ~/Library/Application Support/com.shopline.sync/sync.toml (macOS)  │
//! │                                                                         │
//! │  4. Default Values (lowest priority)                                   │
//! │     auto sync on, 2s debounce, batches of 10, 3 retries                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [device]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Register 1"
//!
//! [store]
//! database_path = "/var/lib/shopline/queue.db"
//!
//! [remote]
//! url = "wss://pos.example.com/sync"
//! request_timeout_secs = 15
//!
//! [sync]
//! auto_sync_enabled = true
//! auto_sync_delay_ms = 2000
//! sync_batch_size = 10
//!
//! [connectivity]
//! failure_threshold = 2
//! probe_interval_secs = 10
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use shopline_core::DEFAULT_MAX_RETRIES;

use crate::error::{SyncError, SyncResult};

/// Runtime settings shared by the queue manager, scheduler and monitor.
pub type SharedSettings = Arc<RwLock<SyncSettings>>;

// =============================================================================
// Device Configuration
// =============================================================================

/// Configuration for this register.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier.
    /// When unset, the engine generates a UUID v4 on first run and keeps it
    /// in the queue store. The last two characters become the device code
    /// inside locally generated receipt numbers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Human-readable device name (e.g., "Register 1").
    #[serde(default = "default_device_name")]
    pub name: String,
}

fn default_device_name() -> String {
    "Register".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: None,
            name: default_device_name(),
        }
    }
}

// =============================================================================
// Store Configuration
// =============================================================================

/// Where the durable queue lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("com", "shopline", "sync")
        .map(|dirs| dirs.data_dir().join("queue.db"))
        .unwrap_or_else(|| PathBuf::from("shopline-queue.db"))
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            database_path: default_database_path(),
        }
    }
}

// =============================================================================
// Remote Store Configuration
// =============================================================================

/// Connection settings for the authoritative store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// WebSocket URL of the authoritative store.
    #[serde(default)]
    pub url: Option<String>,

    /// How long to wait for the response to one request (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Connection timeout (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Initial backoff between connect attempts (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff between connect attempts (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Connect attempts per request before reporting the store unreachable.
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
}

fn default_request_timeout() -> u64 {
    15
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    30
}
fn default_connect_attempts() -> u32 {
    3
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            url: None,
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            connect_attempts: default_connect_attempts(),
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Sync behavior settings.
///
/// This is also the record persisted in the queue store, so operator changes
/// made at runtime outlive the TOML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Run a pass automatically on reconnect.
    #[serde(default = "default_true")]
    pub auto_sync_enabled: bool,

    /// Debounce delay applied to every trigger (milliseconds).
    #[serde(default = "default_auto_sync_delay")]
    pub auto_sync_delay_ms: u64,

    /// Retry budget stamped on newly enqueued items.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Informational: suggested spacing between manual retries (milliseconds).
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    /// Items per batch within one pass.
    #[serde(default = "default_batch_size")]
    pub sync_batch_size: u32,

    /// Pause between batches (milliseconds).
    #[serde(default = "default_batch_delay")]
    pub batch_delay_ms: u64,

    /// Age after which stale items may be cleaned up (days).
    #[serde(default = "default_max_pending_age")]
    pub max_pending_age_days: u32,

    /// Fire the offline side effect and user-facing notifications.
    #[serde(default = "default_true")]
    pub show_notifications: bool,
}

fn default_true() -> bool {
    true
}
fn default_auto_sync_delay() -> u64 {
    2000
}
fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_retry_delay() -> u64 {
    5000
}
fn default_batch_size() -> u32 {
    10
}
fn default_batch_delay() -> u64 {
    500
}
fn default_max_pending_age() -> u32 {
    30
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            auto_sync_enabled: true,
            auto_sync_delay_ms: default_auto_sync_delay(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay(),
            sync_batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay(),
            max_pending_age_days: default_max_pending_age(),
            show_notifications: true,
        }
    }
}

impl SyncSettings {
    pub fn auto_sync_delay(&self) -> Duration {
        Duration::from_millis(self.auto_sync_delay_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    /// Batch size as a chunk length (never zero).
    pub fn batch_len(&self) -> usize {
        self.sync_batch_size.max(1) as usize
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.sync_batch_size == 0 {
            return Err(SyncError::InvalidConfig(
                "sync_batch_size must be greater than 0".into(),
            ));
        }
        if self.max_retries == 0 {
            return Err(SyncError::InvalidConfig(
                "max_retries must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Wraps the settings for sharing between components.
    pub fn shared(self) -> SharedSettings {
        Arc::new(RwLock::new(self))
    }
}

// =============================================================================
// Connectivity Settings
// =============================================================================

/// Connectivity monitor tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    /// Consecutive reported failures before flipping offline.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Interval between background probes (seconds).
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,

    /// Identical probe readings required before a polled transition applies.
    #[serde(default = "default_stable_polls")]
    pub stable_polls: u32,

    /// Timeout for one probe (milliseconds).
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
}

fn default_failure_threshold() -> u32 {
    2
}
fn default_probe_interval() -> u64 {
    10
}
fn default_stable_polls() -> u32 {
    2
}
fn default_probe_timeout() -> u64 {
    3000
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        ConnectivityConfig {
            failure_threshold: default_failure_threshold(),
            probe_interval_secs: default_probe_interval(),
            stable_polls: default_stable_polls(),
            probe_timeout_ms: default_probe_timeout(),
        }
    }
}

impl ConnectivityConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub connectivity: ConnectivityConfig,
}

impl SyncConfig {
    /// Creates a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        Self::load_with_env(config_path, |key| std::env::var(key).ok())
    }

    /// Same as [`SyncConfig::load`] with an injectable environment lookup.
    pub fn load_with_env<F>(config_path: Option<PathBuf>, env: F) -> SyncResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides(env);
        config.validate()?;

        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if matches!(self.device.id.as_deref(), Some(id) if id.trim().is_empty()) {
            return Err(SyncError::InvalidConfig("device.id must not be empty".into()));
        }

        if let Some(ref raw) = self.remote.url {
            let parsed = url::Url::parse(raw)?;
            if !matches!(parsed.scheme(), "ws" | "wss") {
                return Err(SyncError::InvalidUrl(format!(
                    "Remote URL must start with ws:// or wss://, got: {}",
                    raw
                )));
            }
        }

        if self.remote.connect_attempts == 0 {
            return Err(SyncError::InvalidConfig(
                "remote.connect_attempts must be at least 1".into(),
            ));
        }

        if self.connectivity.failure_threshold == 0 || self.connectivity.stable_polls == 0 {
            return Err(SyncError::InvalidConfig(
                "connectivity thresholds must be at least 1".into(),
            ));
        }

        self.sync.validate()
    }

    fn apply_env_overrides<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = env("SHOPLINE_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = Some(id);
        }

        if let Some(name) = env("SHOPLINE_DEVICE_NAME") {
            self.device.name = name;
        }

        if let Some(path) = env("SHOPLINE_DB_PATH") {
            self.store.database_path = PathBuf::from(path);
        }

        if let Some(url) = env("SHOPLINE_REMOTE_URL") {
            debug!(url = %url, "Overriding remote URL from environment");
            self.remote.url = Some(url);
        }

        if let Some(raw) = env("SHOPLINE_AUTO_SYNC") {
            match raw.to_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => self.sync.auto_sync_enabled = true,
                "0" | "false" | "off" | "no" => self.sync.auto_sync_enabled = false,
                _ => warn!(value = %raw, "Unrecognized SHOPLINE_AUTO_SYNC value"),
            }
        }

        if let Some(raw) = env("SHOPLINE_BATCH_SIZE") {
            match raw.parse::<u32>() {
                Ok(size) => self.sync.sync_batch_size = size,
                Err(_) => warn!(value = %raw, "Unrecognized SHOPLINE_BATCH_SIZE value"),
            }
        }

        if let Some(raw) = env("SHOPLINE_MAX_RETRIES") {
            match raw.parse::<u32>() {
                Ok(retries) => self.sync.max_retries = retries,
                Err(_) => warn!(value = %raw, "Unrecognized SHOPLINE_MAX_RETRIES value"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "shopline", "sync")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Configured device id. `None` means the engine resolves one from the
    /// queue store (see `SyncEngineBuilder::build`).
    pub fn device_id(&self) -> Option<&str> {
        self.device.id.as_deref()
    }

    pub fn remote_url(&self) -> Option<&str> {
        self.remote.url.as_deref()
    }
}
