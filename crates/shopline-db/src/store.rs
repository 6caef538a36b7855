//! # Queue Store
//!
//! The durable store the sync engine talks to.
//!
//! ## Sticky Initialization Error
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  QueueStore::open(config)                                               │
//! │       │                                                                 │
//! │       ├── Database::new ok ──► Ready(db) ──► every call hits SQLite     │
//! │       │                                                                 │
//! │       └── Database::new err ─► Unavailable(reason)                      │
//! │                                    │  logged once, here                 │
//! │                                    ▼                                    │
//! │                 every call returns DbError::StoreUnavailable(reason)    │
//! │                 immediately (no retry, no hang)                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, info};

use crate::error::{DbError, DbResult};
use crate::pool::{Database, DbConfig};
use shopline_core::{CachedProduct, ProductStatus, QueueItem, QueueStatus};

const CONFIG_KEY: &str = "sync_config";
const LAST_SYNC_KEY: &str = "last_sync_time";
const DEVICE_ID_KEY: &str = "device_id";

#[derive(Debug, Clone)]
enum StoreState {
    Ready(Database),
    Unavailable(String),
}

/// Durable store for queue items and singleton records.
///
/// Cheap to clone; clones share the same pool (or the same sticky error).
#[derive(Debug, Clone)]
pub struct QueueStore {
    state: StoreState,
}

impl QueueStore {
    /// Opens the store. Never fails: an initialization error becomes the
    /// sticky state of the returned store.
    pub async fn open(config: DbConfig) -> Self {
        match Database::new(config).await {
            Ok(db) => {
                info!("Queue store ready");
                QueueStore::from_database(db)
            }
            Err(e) => {
                error!(error = %e, "Queue store failed to initialize; operations will fail fast");
                QueueStore::unavailable(e.to_string())
            }
        }
    }

    /// Wraps an already open database.
    pub fn from_database(db: Database) -> Self {
        QueueStore {
            state: StoreState::Ready(db),
        }
    }

    /// A store that rejects every operation with `reason`.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        QueueStore {
            state: StoreState::Unavailable(reason.into()),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self.state, StoreState::Ready(_))
    }

    /// Initialization error, if any.
    pub fn unavailable_reason(&self) -> Option<&str> {
        match &self.state {
            StoreState::Ready(_) => None,
            StoreState::Unavailable(reason) => Some(reason),
        }
    }

    fn db(&self) -> DbResult<&Database> {
        match &self.state {
            StoreState::Ready(db) => Ok(db),
            StoreState::Unavailable(reason) => Err(DbError::StoreUnavailable(reason.clone())),
        }
    }

    // =========================================================================
    // Queue Items
    // =========================================================================

    /// Inserts or overwrites by id.
    pub async fn put(&self, item: &QueueItem) -> DbResult<()> {
        self.db()?.queue_items().upsert(item).await
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<QueueItem>> {
        self.db()?.queue_items().get(id).await
    }

    /// All items; no ordering guarantee.
    pub async fn get_all(&self) -> DbResult<Vec<QueueItem>> {
        self.db()?.queue_items().list_all().await
    }

    pub async fn get_by_status(&self, status: QueueStatus) -> DbResult<Vec<QueueItem>> {
        self.db()?.queue_items().list_by_status(status).await
    }

    /// Returns whether an item was removed.
    pub async fn delete(&self, id: &str) -> DbResult<bool> {
        self.db()?.queue_items().delete(id).await
    }

    /// Removes every `synced` item. Returns the number removed.
    pub async fn delete_synced(&self) -> DbResult<u64> {
        self.db()?
            .queue_items()
            .delete_by_status(QueueStatus::Synced)
            .await
    }

    pub async fn count_by_status(&self) -> DbResult<Vec<(QueueStatus, u32)>> {
        self.db()?.queue_items().count_by_status().await
    }

    // =========================================================================
    // Singleton Records
    // =========================================================================

    /// Persisted sync configuration, if one was ever written.
    pub async fn get_config<T: DeserializeOwned>(&self) -> DbResult<Option<T>> {
        match self.db()?.sync_state().get(CONFIG_KEY).await? {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| DbError::corrupt(CONFIG_KEY, e)),
            None => Ok(None),
        }
    }

    pub async fn put_config<T: Serialize>(&self, config: &T) -> DbResult<()> {
        let json = serde_json::to_string(config)?;
        self.db()?.sync_state().put(CONFIG_KEY, &json).await
    }

    pub async fn get_last_sync_time(&self) -> DbResult<Option<DateTime<Utc>>> {
        match self.db()?.sync_state().get(LAST_SYNC_KEY).await? {
            Some(raw) => DateTime::parse_from_rfc3339(&raw)
                .map(|ts| Some(ts.with_timezone(&Utc)))
                .map_err(|e| DbError::corrupt(LAST_SYNC_KEY, e)),
            None => Ok(None),
        }
    }

    pub async fn put_last_sync_time(&self, ts: DateTime<Utc>) -> DbResult<()> {
        self.db()?
            .sync_state()
            .put(LAST_SYNC_KEY, &ts.to_rfc3339())
            .await
    }

    /// Device id recorded on first run.
    pub async fn get_device_id(&self) -> DbResult<Option<String>> {
        self.db()?.sync_state().get(DEVICE_ID_KEY).await
    }

    pub async fn put_device_id(&self, device_id: &str) -> DbResult<()> {
        self.db()?.sync_state().put(DEVICE_ID_KEY, device_id).await
    }

    // =========================================================================
    // Cached Catalog
    // =========================================================================

    pub async fn get_cached_product(&self, id: &str) -> DbResult<Option<CachedProduct>> {
        self.db()?.catalog().get(id).await
    }

    pub async fn put_cached_product(&self, product: &CachedProduct) -> DbResult<()> {
        self.db()?.catalog().upsert(product).await
    }

    /// Returns false if the product is not cached.
    pub async fn set_cached_product_status(&self, id: &str, status: ProductStatus) -> DbResult<bool> {
        self.db()?.catalog().set_status(id, status).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use shopline_core::{CustomerPayload, EntityType, Operation, Priority};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Settings {
        auto_sync_enabled: bool,
        sync_batch_size: u32,
    }

    async fn store() -> QueueStore {
        QueueStore::open(DbConfig::in_memory()).await
    }

    fn customer(id: &str) -> QueueItem {
        QueueItem::new(
            id,
            Operation::CreateCustomer(CustomerPayload {
                name: "Ana Ruiz".to_string(),
                email: Some("ana@example.com".to_string()),
                phone: None,
                note: None,
            }),
            EntityType::Customer,
            Priority::Normal,
            3,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_open_in_memory() {
        let store = store().await;
        assert!(store.is_available());
        assert!(store.unavailable_reason().is_none());
    }

    #[tokio::test]
    async fn test_open_failure_is_sticky() {
        let store = QueueStore::open(
            DbConfig::new("/nonexistent-dir/for/sure/queue.db")
                .connect_timeout(std::time::Duration::from_millis(200)),
        )
        .await;
        assert!(!store.is_available());

        for _ in 0..2 {
            let err = store.get_all().await.unwrap_err();
            assert!(matches!(err, DbError::StoreUnavailable(_)));
        }
        assert!(matches!(
            store.put(&customer("local-1")).await,
            Err(DbError::StoreUnavailable(_))
        ));
        assert!(matches!(
            store.get_last_sync_time().await,
            Err(DbError::StoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_item_crud() {
        let store = store().await;
        store.put(&customer("local-1")).await.unwrap();
        store.put(&customer("local-2")).await.unwrap();

        assert_eq!(store.get_all().await.unwrap().len(), 2);
        assert_eq!(
            store.get_by_status(QueueStatus::Pending).await.unwrap().len(),
            2
        );
        assert!(store.delete("local-1").await.unwrap());
        assert!(store.get("local-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_config_record() {
        let store = store().await;
        assert_eq!(store.get_config::<Settings>().await.unwrap(), None);

        let settings = Settings {
            auto_sync_enabled: false,
            sync_batch_size: 25,
        };
        store.put_config(&settings).await.unwrap();
        assert_eq!(store.get_config::<Settings>().await.unwrap(), Some(settings));
    }

    #[tokio::test]
    async fn test_last_sync_time() {
        let store = store().await;
        assert!(store.get_last_sync_time().await.unwrap().is_none());

        let now = Utc::now();
        store.put_last_sync_time(now).await.unwrap();
        assert_eq!(store.get_last_sync_time().await.unwrap(), Some(now));
    }

    #[tokio::test]
    async fn test_device_id_record() {
        let store = store().await;
        assert!(store.get_device_id().await.unwrap().is_none());

        store.put_device_id("register-3f").await.unwrap();
        assert_eq!(store.get_device_id().await.unwrap().as_deref(), Some("register-3f"));

        // Independent of the config record
        assert_eq!(store.get_config::<Settings>().await.unwrap(), None);
    }
}
