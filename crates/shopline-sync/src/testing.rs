//! Fakes and fixtures shared by the unit tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use shopline_core::{
    BuyerContact, CachedProduct, CustomerPayload, MessagePayload, Money, Operation, Priority,
    ProductSnapshot, ProductStatus, QueueCounts, QueueItem, ReceiptPayload, SalePayload,
    SaleRefPayload, SaleUpdatePayload, TaxBreakdown, TaxRate,
};
use shopline_db::{DbConfig, QueueStore};

use crate::config::{ConnectivityConfig, SharedSettings, SyncSettings};
use crate::connectivity::{ConnectivityMonitor, NetworkProbe};
use crate::events::SyncEventEmitter;
use crate::queue::SyncQueueManager;
use crate::remote::{RemoteError, RemoteProduct, RemoteResult, RemoteStore};
use crate::scheduler::{BatchResult, SyncProgress, SyncScheduler};

// =============================================================================
// Fixtures
// =============================================================================

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

/// An in-memory queue item that never touched the store.
pub fn queued(id: &str, operation: Operation) -> QueueItem {
    let entity_type = operation.kind().default_entity_type();
    QueueItem::new(id, operation, entity_type, Priority::Normal, 3, Utc::now())
}

pub fn cached_product(id: &str, status: ProductStatus) -> CachedProduct {
    CachedProduct {
        id: id.to_string(),
        brand: "Apple".to_string(),
        model: "iPhone 13".to_string(),
        storage: Some("128GB".to_string()),
        color: Some("Midnight".to_string()),
        condition: Some("Grade A".to_string()),
        identifier: Some("356789104512345".to_string()),
        price: Money::from_cents(50_000),
        status,
        updated_at: Utc::now(),
    }
}

// =============================================================================
// Fake Remote Store
// =============================================================================

/// Scriptable remote store.
///
/// Unknown products are available. Queued errors are handed to the next
/// write (never to a pre-flight fetch).
#[derive(Default)]
pub struct FakeRemote {
    products: Mutex<HashMap<String, Option<RemoteProduct>>>,
    unreachable: AtomicBool,
    next_errors: Mutex<VecDeque<RemoteError>>,
    calls: Mutex<Vec<String>>,
    sales: Mutex<Vec<SalePayload>>,
    writes: AtomicU32,
    latency: Mutex<Duration>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_product(&self, product: RemoteProduct) {
        self.products
            .lock()
            .unwrap()
            .insert(product.id.clone(), Some(product));
    }

    pub fn set_product_status(&self, id: &str, status: ProductStatus) {
        self.set_product(RemoteProduct {
            id: id.to_string(),
            status,
            updated_at: Some(Utc::now()),
            last_request_id: None,
        });
    }

    pub fn delete_product(&self, id: &str) {
        self.products.lock().unwrap().insert(id.to_string(), None);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn reject_next(&self, code: &str, message: &str) {
        self.fail_next(RemoteError::rejected(code, message));
    }

    pub fn fail_next(&self, error: RemoteError) {
        self.next_errors.lock().unwrap().push_back(error);
    }

    /// `"<method>:<request id or product id>"` per call, including failed ones.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Writes that reached the server.
    pub fn write_count(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Every sale payload that reached the server, accepted or not.
    pub fn submitted_sales(&self) -> Vec<SalePayload> {
        self.sales.lock().unwrap().clone()
    }

    async fn begin(&self, call: String) -> RemoteResult<()> {
        self.calls.lock().unwrap().push(call);
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(RemoteError::Unreachable("Connection refused".to_string()));
        }
        Ok(())
    }

    async fn write(&self, method: &str, request_id: &str) -> RemoteResult<String> {
        self.begin(format!("{}:{}", method, request_id)).await?;
        let n = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(error) = self.next_errors.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(format!("srv-{}", n))
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn fetch_product(&self, product_id: &str) -> RemoteResult<Option<RemoteProduct>> {
        self.begin(format!("fetch_product:{}", product_id)).await?;
        let products = self.products.lock().unwrap();
        Ok(match products.get(product_id) {
            Some(entry) => entry.clone(),
            None => Some(RemoteProduct {
                id: product_id.to_string(),
                status: ProductStatus::Available,
                updated_at: None,
                last_request_id: None,
            }),
        })
    }

    async fn complete_sale(&self, request_id: &str, sale: &SalePayload) -> RemoteResult<String> {
        if !self.unreachable.load(Ordering::SeqCst) {
            self.sales.lock().unwrap().push(sale.clone());
        }
        let server_id = self.write("complete_sale", request_id).await?;
        self.set_product(RemoteProduct {
            id: sale.product_id.clone(),
            status: ProductStatus::Sold,
            updated_at: Some(Utc::now()),
            last_request_id: Some(request_id.to_string()),
        });
        Ok(server_id)
    }

    async fn update_sale(&self, request_id: &str, _update: &SaleUpdatePayload) -> RemoteResult<String> {
        self.write("update_sale", request_id).await
    }

    async fn delete_sale(&self, request_id: &str, _sale: &SaleRefPayload) -> RemoteResult<String> {
        self.write("delete_sale", request_id).await
    }

    async fn send_message(&self, request_id: &str, _message: &MessagePayload) -> RemoteResult<String> {
        self.write("send_message", request_id).await
    }

    async fn create_receipt(&self, request_id: &str, _receipt: &ReceiptPayload) -> RemoteResult<String> {
        self.write("create_receipt", request_id).await
    }

    async fn create_customer(&self, request_id: &str, _customer: &CustomerPayload) -> RemoteResult<String> {
        self.write("create_customer", request_id).await
    }
}

// =============================================================================
// Fake Probe and Recording Emitter
// =============================================================================

pub struct FakeProbe {
    reachable: AtomicBool,
}

impl FakeProbe {
    pub fn new(reachable: bool) -> Self {
        FakeProbe {
            reachable: AtomicBool::new(reachable),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl NetworkProbe for FakeProbe {
    async fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct RecordingEmitter {
    counts: Mutex<Vec<QueueCounts>>,
    progress: Mutex<Vec<SyncProgress>>,
    batches: Mutex<Vec<BatchResult>>,
    connectivity: Mutex<Vec<bool>>,
    offline: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingEmitter {
    pub fn counts(&self) -> Vec<QueueCounts> {
        self.counts.lock().unwrap().clone()
    }

    pub fn progress(&self) -> Vec<SyncProgress> {
        self.progress.lock().unwrap().clone()
    }

    pub fn batch_results(&self) -> Vec<BatchResult> {
        self.batches.lock().unwrap().clone()
    }

    pub fn connectivity_events(&self) -> Vec<bool> {
        self.connectivity.lock().unwrap().clone()
    }

    pub fn offline_count(&self) -> usize {
        self.offline.lock().unwrap().len()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl SyncEventEmitter for RecordingEmitter {
    fn emit_counts(&self, counts: &QueueCounts) {
        self.counts.lock().unwrap().push(*counts);
    }

    fn emit_progress(&self, progress: &SyncProgress) {
        self.progress.lock().unwrap().push(progress.clone());
    }

    fn emit_batch_result(&self, result: &BatchResult) {
        self.batches.lock().unwrap().push(result.clone());
    }

    fn emit_connectivity(&self, online: bool) {
        self.connectivity.lock().unwrap().push(online);
    }

    fn emit_offline(&self, reason: &str) {
        self.offline.lock().unwrap().push(reason.to_string());
    }

    fn emit_error(&self, message: &str, _retryable: bool) {
        self.errors.lock().unwrap().push(message.to_string());
    }
}

// =============================================================================
// Harness
// =============================================================================

/// Queue, monitor and scheduler wired to fakes over an in-memory store.
pub struct Harness {
    pub store: QueueStore,
    pub settings: SharedSettings,
    pub emitter: Arc<RecordingEmitter>,
    pub queue: Arc<SyncQueueManager>,
    pub remote: Arc<FakeRemote>,
    pub probe: Arc<FakeProbe>,
    pub connectivity: Arc<ConnectivityMonitor>,
    pub scheduler: Arc<SyncScheduler>,
}

impl Harness {
    pub async fn online() -> Self {
        let harness = Self::build(true).await;
        assert!(harness.connectivity.check_connection().await);
        harness
    }

    /// The monitor starts offline and the probe agrees.
    pub async fn offline() -> Self {
        Self::build(false).await
    }

    async fn build(reachable: bool) -> Self {
        let store = QueueStore::open(DbConfig::in_memory()).await;
        let settings = SyncSettings {
            auto_sync_delay_ms: 50,
            batch_delay_ms: 0,
            ..Default::default()
        }
        .shared();
        let emitter = Arc::new(RecordingEmitter::default());
        let remote = Arc::new(FakeRemote::new());
        let probe = Arc::new(FakeProbe::new(reachable));

        let queue = Arc::new(SyncQueueManager::new(
            store.clone(),
            settings.clone(),
            emitter.clone(),
        ));
        let connectivity = Arc::new(ConnectivityMonitor::new(
            probe.clone(),
            ConnectivityConfig::default(),
            emitter.clone(),
        ));
        let scheduler = Arc::new(SyncScheduler::new(
            queue.clone(),
            remote.clone(),
            connectivity.clone(),
            settings.clone(),
            emitter.clone(),
        ));

        Harness {
            store,
            settings,
            emitter,
            queue,
            remote,
            probe,
            connectivity,
            scheduler,
        }
    }
}
