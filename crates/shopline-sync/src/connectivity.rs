//! # Connectivity Monitor
//!
//! Single source of truth for "are we online".
//!
//! ## Transitions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │            check_connection() == true  /  stable probe polls            │
//! │        ┌──────────────────────────────────────────────────────┐         │
//! │        │                                                      ▼         │
//! │  ┌───────────┐                                          ┌───────────┐   │
//! │  │  OFFLINE  │                                          │  ONLINE   │   │
//! │  └───────────┘                                          └───────────┘   │
//! │        ▲                                                      │         │
//! │        └──────────────────────────────────────────────────────┘         │
//! │     report_failure() reaches threshold, or the probe says offline,      │
//! │     or check_connection() == false  /  stable probe polls               │
//! │                                                                         │
//! │  EDGE-TRIGGERED:                                                        │
//! │  • going online resets the failure counter                              │
//! │  • going offline fires emit_offline (when notifications are on)         │
//! │  • every edge is published on the watch channel (subscribe())           │
//! │  • queue contents are never touched here                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::ConnectivityConfig;
use crate::error::{SyncError, SyncResult};
use crate::events::SyncEventEmitter;

// =============================================================================
// Network Probe
// =============================================================================

/// The platform's connectivity signal.
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

/// Probes by opening a TCP connection to the remote store's host.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    addr: String,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        TcpProbe {
            addr: addr.into(),
            timeout,
        }
    }

    /// Targets the host and port of a `ws://` / `wss://` URL.
    pub fn from_url(raw: &str, timeout: Duration) -> SyncResult<Self> {
        let url = url::Url::parse(raw)?;
        let host = url
            .host_str()
            .ok_or_else(|| SyncError::InvalidUrl(format!("No host in {}", raw)))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| SyncError::InvalidUrl(format!("No port for {}", raw)))?;

        Ok(TcpProbe::new(format!("{}:{}", host, port), timeout))
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl NetworkProbe for TcpProbe {
    async fn is_reachable(&self) -> bool {
        match timeout(self.timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(addr = %self.addr, error = %e, "Probe connect failed");
                false
            }
            Err(_) => {
                debug!(addr = %self.addr, "Probe timed out");
                false
            }
        }
    }
}

// =============================================================================
// Connectivity Monitor
// =============================================================================

/// Tracks online/offline with manual failure escalation.
///
/// Starts offline; the engine calls [`ConnectivityMonitor::check_connection`]
/// at start-up so the first real reading is an edge.
pub struct ConnectivityMonitor {
    probe: Arc<dyn NetworkProbe>,
    config: ConnectivityConfig,
    emitter: Arc<dyn SyncEventEmitter>,
    online: AtomicBool,
    failures: AtomicU32,
    notifications: AtomicBool,
    state_tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(
        probe: Arc<dyn NetworkProbe>,
        config: ConnectivityConfig,
        emitter: Arc<dyn SyncEventEmitter>,
    ) -> Self {
        let (state_tx, _) = watch::channel(false);

        ConnectivityMonitor {
            probe,
            config,
            emitter,
            online: AtomicBool::new(false),
            failures: AtomicU32::new(0),
            notifications: AtomicBool::new(true),
            state_tx,
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Consecutive failures reported since the last success.
    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    /// Turns the offline side effect on or off (`show_notifications`).
    pub fn set_notifications(&self, enabled: bool) {
        self.notifications.store(enabled, Ordering::SeqCst);
    }

    /// Edge notifications; the value is the new online state.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state_tx.subscribe()
    }

    /// Records an application-detected network failure.
    ///
    /// Flips offline once the consecutive count reaches the threshold, or
    /// straight away if the probe already reports offline.
    pub async fn report_failure(&self) {
        let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(failures, threshold = self.config.failure_threshold, "Network failure reported");

        if !self.is_online() {
            return;
        }

        if failures >= self.config.failure_threshold {
            self.apply(false, "repeated request failures");
        } else if !self.probe.is_reachable().await {
            self.apply(false, "remote store unreachable");
        }
    }

    /// Called after any confirmed successful network operation.
    pub fn reset_failure_count(&self) {
        self.failures.store(0, Ordering::SeqCst);
    }

    /// Re-reads the probe, applies the reading and returns it.
    pub async fn check_connection(&self) -> bool {
        let reachable = self.probe.is_reachable().await;
        self.apply(reachable, "connection check failed");
        reachable
    }

    /// Applies a reading. Returns true if it was an edge.
    fn apply(&self, online: bool, reason: &str) -> bool {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if was_online == online {
            return false;
        }

        if online {
            self.failures.store(0, Ordering::SeqCst);
            info!("Connectivity restored");
        } else {
            warn!(reason = %reason, "Connectivity lost");
            if self.notifications.load(Ordering::SeqCst) {
                self.emitter.emit_offline(reason);
            }
        }

        self.emitter.emit_connectivity(online);
        self.state_tx.send_replace(online);
        true
    }

    /// Spawns the background probe loop.
    ///
    /// A reading that disagrees with the current state must repeat for
    /// `stable_polls` consecutive ticks before it is applied.
    pub fn watch(self: &Arc<Self>) -> ConnectivityWatchHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let monitor = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(monitor.config.probe_interval());
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut streak = 0u32;

            info!(
                interval_secs = monitor.config.probe_interval_secs,
                "Connectivity watch starting"
            );

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let reachable = monitor.probe.is_reachable().await;
                        if reachable == monitor.is_online() {
                            streak = 0;
                            continue;
                        }

                        streak += 1;
                        if streak >= monitor.config.stable_polls {
                            monitor.apply(reachable, "probe failed");
                            streak = 0;
                        }
                    }

                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            info!("Connectivity watch stopped");
        });

        ConnectivityWatchHandle { shutdown_tx, task }
    }
}

/// Handle for the background probe loop.
pub struct ConnectivityWatchHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl ConnectivityWatchHandle {
    /// Stops the loop and waits for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeProbe, RecordingEmitter};

    fn monitor(probe: Arc<FakeProbe>, emitter: Arc<RecordingEmitter>) -> Arc<ConnectivityMonitor> {
        let config = ConnectivityConfig {
            probe_interval_secs: 1,
            ..Default::default()
        };
        Arc::new(ConnectivityMonitor::new(probe, config, emitter))
    }

    #[tokio::test]
    async fn test_check_connection_is_edge_triggered() {
        let probe = Arc::new(FakeProbe::new(true));
        let emitter = Arc::new(RecordingEmitter::default());
        let monitor = monitor(probe.clone(), emitter.clone());
        let mut rx = monitor.subscribe();

        assert!(!monitor.is_online());
        assert!(monitor.check_connection().await);
        assert!(monitor.is_online());
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update());

        // Same reading again: no edge
        assert!(monitor.check_connection().await);
        assert!(!rx.has_changed().unwrap());
        assert_eq!(emitter.connectivity_events(), vec![true]);
    }

    #[tokio::test]
    async fn test_report_failure_threshold() {
        let probe = Arc::new(FakeProbe::new(true));
        let emitter = Arc::new(RecordingEmitter::default());
        let monitor = monitor(probe, emitter.clone());
        monitor.check_connection().await;

        monitor.report_failure().await;
        assert!(monitor.is_online());
        assert_eq!(monitor.failure_count(), 1);

        monitor.report_failure().await;
        assert!(!monitor.is_online());
        assert_eq!(emitter.offline_count(), 1);

        // Already offline: no second side effect
        monitor.report_failure().await;
        assert_eq!(emitter.offline_count(), 1);
    }

    #[tokio::test]
    async fn test_report_failure_when_platform_offline() {
        let probe = Arc::new(FakeProbe::new(true));
        let emitter = Arc::new(RecordingEmitter::default());
        let monitor = monitor(probe.clone(), emitter.clone());
        monitor.check_connection().await;

        probe.set_reachable(false);
        monitor.report_failure().await;

        assert!(!monitor.is_online());
        assert_eq!(emitter.offline_count(), 1);
    }

    #[tokio::test]
    async fn test_reset_and_reconnect_clear_failures() {
        let probe = Arc::new(FakeProbe::new(true));
        let monitor = monitor(probe.clone(), Arc::new(RecordingEmitter::default()));
        monitor.check_connection().await;

        monitor.report_failure().await;
        monitor.reset_failure_count();
        assert_eq!(monitor.failure_count(), 0);

        monitor.report_failure().await;
        monitor.report_failure().await;
        assert!(!monitor.is_online());

        assert!(monitor.check_connection().await);
        assert_eq!(monitor.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_offline_side_effect_respects_notifications() {
        let probe = Arc::new(FakeProbe::new(true));
        let emitter = Arc::new(RecordingEmitter::default());
        let monitor = monitor(probe.clone(), emitter.clone());
        monitor.set_notifications(false);
        monitor.check_connection().await;

        probe.set_reachable(false);
        assert!(!monitor.check_connection().await);
        assert_eq!(emitter.offline_count(), 0);
        assert_eq!(emitter.connectivity_events(), vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_debounces_flapping() {
        let probe = Arc::new(FakeProbe::new(true));
        let monitor = monitor(probe.clone(), Arc::new(RecordingEmitter::default()));
        monitor.check_connection().await;
        let handle = monitor.watch();

        // Ticks land at 0s, 1s, 2s, ...
        tokio::time::sleep(Duration::from_millis(10)).await;

        // One bad reading between good ones is ignored
        probe.set_reachable(false);
        tokio::time::sleep(Duration::from_millis(1000)).await;
        probe.set_reachable(true);
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(monitor.is_online());

        // Two consecutive bad readings flip it
        probe.set_reachable(false);
        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert!(!monitor.is_online());

        handle.shutdown().await;
    }

    #[test]
    fn test_tcp_probe_from_url() {
        let probe = TcpProbe::from_url("wss://pos.example.com/sync", Duration::from_secs(1)).unwrap();
        assert_eq!(probe.addr(), "pos.example.com:443");

        let probe = TcpProbe::from_url("ws://10.0.0.5:8787/sync", Duration::from_secs(1)).unwrap();
        assert_eq!(probe.addr(), "10.0.0.5:8787");

        assert!(TcpProbe::from_url("not a url", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_tcp_probe_against_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let probe = TcpProbe::new(addr.clone(), Duration::from_secs(1));
        assert!(probe.is_reachable().await);

        drop(listener);
        assert!(!probe.is_reachable().await);
    }
}
