//! # WebSocket Remote Store
//!
//! [`RemoteStore`] over a single WebSocket connection, one request in flight
//! at a time.
//!
//! ## Call Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  call(request_id, body)                                                 │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  ┌────────────┐  none   ┌────────────┐  fail   ┌────────────┐          │
//! │  │ connection │ ──────► │  connect   │ ──────► │  backoff   │ ─┐       │
//! │  │  cached?   │         │ (timeout)  │ ◄────── │ 500ms, 1s… │  │       │
//! │  └─────┬──────┘         └─────┬──────┘         └────────────┘  │       │
//! │        │ yes                  │ ok              attempts spent │       │
//! │        ▼                      ▼                                ▼       │
//! │  ┌──────────────────────────────────┐                   Unreachable    │
//! │  │ send Text, read until a response │                                  │
//! │  │ with the same request_id         │── error/timeout ──► drop conn,   │
//! │  │ (Ping → Pong on the way)         │                     Unreachable  │
//! │  └──────────────────────────────────┘                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A cached connection that turns out to be dead is replaced once before the
//! call is reported unreachable. The server deduplicates by `request_id`, so
//! resending is safe.

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shopline_core::{
    CustomerPayload, MessagePayload, ReceiptPayload, SalePayload, SaleRefPayload,
    SaleUpdatePayload,
};

use super::protocol::{RemoteRequest, RequestEnvelope, ResponseEnvelope};
use super::{RemoteError, RemoteProduct, RemoteResult, RemoteStore};
use crate::config::RemoteConfig;
use crate::error::{SyncError, SyncResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct WsRemoteConfig {
    /// WebSocket URL to connect to.
    pub url: String,

    /// Connection timeout.
    pub connect_timeout: Duration,

    /// Time allowed for one request/response exchange.
    pub request_timeout: Duration,

    /// Initial backoff duration.
    pub initial_backoff: Duration,

    /// Maximum backoff duration.
    pub max_backoff: Duration,

    /// Connect attempts per call.
    pub connect_attempts: u32,
}

impl WsRemoteConfig {
    /// Requires `remote.url` to be set.
    pub fn from_config(config: &RemoteConfig) -> SyncResult<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| SyncError::InvalidConfig("remote.url is not set".to_string()))?;

        Ok(WsRemoteConfig {
            url,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_secs(config.max_backoff_secs),
            connect_attempts: config.connect_attempts.max(1),
        })
    }
}

// =============================================================================
// WebSocket Remote Store
// =============================================================================

pub struct WsRemoteStore {
    config: WsRemoteConfig,
    connection: Mutex<Option<WsStream>>,
}

impl WsRemoteStore {
    pub fn new(config: WsRemoteConfig) -> Self {
        WsRemoteStore {
            config,
            connection: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Sends one request and waits for its response.
    async fn call(&self, request_id: &str, body: RemoteRequest) -> RemoteResult<ResponseEnvelope> {
        let type_name = body.type_name();
        let envelope = RequestEnvelope::new(request_id, body);
        let json = envelope
            .to_json()
            .map_err(|e| RemoteError::Server(format!("Failed to encode request: {}", e)))?;

        let mut connection = self.connection.lock().await;
        let mut last_error = None;

        for _ in 0..2 {
            let (mut stream, reused) = match connection.take() {
                Some(stream) => (stream, true),
                None => (self.connect().await?, false),
            };

            debug!(request_id = %request_id, msg_type = %type_name, "Sending request");
            match timeout(
                self.config.request_timeout,
                exchange(&mut stream, request_id, &json),
            )
            .await
            {
                Ok(Ok(response)) => {
                    *connection = Some(stream);
                    return Ok(response);
                }
                Ok(Err(e)) if reused => {
                    debug!(error = %e, "Cached connection failed, reconnecting");
                    last_error = Some(e);
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    return Err(RemoteError::Unreachable(format!(
                        "No response to {} within {:?}",
                        type_name, self.config.request_timeout
                    )));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| RemoteError::Unreachable("Connection lost".to_string())))
    }

    /// Connects, retrying with exponential backoff up to `connect_attempts`.
    async fn connect(&self) -> RemoteResult<WsStream> {
        let mut backoff = self.create_backoff();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.connect_with_timeout().await {
                Ok(stream) => {
                    info!(url = %self.config.url, "Connected to remote store");
                    return Ok(stream);
                }
                Err(reason) if attempt >= self.config.connect_attempts => {
                    warn!(url = %self.config.url, attempts = attempt, "Remote store unreachable");
                    return Err(RemoteError::Unreachable(reason));
                }
                Err(reason) => {
                    let Some(delay) = backoff.next_backoff() else {
                        return Err(RemoteError::Unreachable(reason));
                    };
                    debug!(?delay, attempt, reason = %reason, "Waiting before reconnect");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn connect_with_timeout(&self) -> Result<WsStream, String> {
        match timeout(self.config.connect_timeout, connect_async(self.config.url.as_str())).await {
            Ok(Ok((stream, response))) => {
                debug!(status = ?response.status(), "WebSocket handshake complete");
                Ok(stream)
            }
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "Connect timed out after {:?}",
                self.config.connect_timeout
            )),
        }
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.config.initial_backoff,
            max_interval: self.config.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// Writes the request and reads frames until the matching response arrives.
async fn exchange(stream: &mut WsStream, request_id: &str, json: &str) -> RemoteResult<ResponseEnvelope> {
    stream
        .send(WsMessage::Text(json.to_string().into()))
        .await
        .map_err(|e| RemoteError::Unreachable(e.to_string()))?;

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => match ResponseEnvelope::from_json(&text) {
                Ok(response) if response.request_id == request_id => return Ok(response),
                Ok(response) => {
                    debug!(request_id = %response.request_id, "Ignoring response to an earlier request");
                }
                Err(e) => {
                    warn!(?e, "Failed to parse response");
                }
            },
            Ok(WsMessage::Ping(data)) => {
                stream
                    .send(WsMessage::Pong(data))
                    .await
                    .map_err(|e| RemoteError::Unreachable(e.to_string()))?;
            }
            Ok(WsMessage::Close(frame)) => {
                debug!(?frame, "Received close frame");
                return Err(RemoteError::Unreachable("Connection closed by server".to_string()));
            }
            Ok(_) => {}
            Err(e) => return Err(RemoteError::Unreachable(e.to_string())),
        }
    }

    Err(RemoteError::Unreachable("Connection closed".to_string()))
}

#[async_trait]
impl RemoteStore for WsRemoteStore {
    async fn fetch_product(&self, product_id: &str) -> RemoteResult<Option<RemoteProduct>> {
        let request_id = format!("fetch-{}", Uuid::new_v4());
        let body = RemoteRequest::FetchProduct {
            product_id: product_id.to_string(),
        };
        self.call(&request_id, body).await?.into_product()
    }

    async fn complete_sale(&self, request_id: &str, sale: &SalePayload) -> RemoteResult<String> {
        self.call(request_id, RemoteRequest::CompleteSale(sale.clone()))
            .await?
            .into_server_id()
    }

    async fn update_sale(&self, request_id: &str, update: &SaleUpdatePayload) -> RemoteResult<String> {
        self.call(request_id, RemoteRequest::UpdateSale(update.clone()))
            .await?
            .into_server_id()
    }

    async fn delete_sale(&self, request_id: &str, sale: &SaleRefPayload) -> RemoteResult<String> {
        self.call(request_id, RemoteRequest::DeleteSale(sale.clone()))
            .await?
            .into_server_id()
    }

    async fn send_message(&self, request_id: &str, message: &MessagePayload) -> RemoteResult<String> {
        self.call(request_id, RemoteRequest::SendMessage(message.clone()))
            .await?
            .into_server_id()
    }

    async fn create_receipt(&self, request_id: &str, receipt: &ReceiptPayload) -> RemoteResult<String> {
        self.call(request_id, RemoteRequest::CreateReceipt(receipt.clone()))
            .await?
            .into_server_id()
    }

    async fn create_customer(&self, request_id: &str, customer: &CustomerPayload) -> RemoteResult<String> {
        self.call(request_id, RemoteRequest::CreateCustomer(customer.clone()))
            .await?
            .into_server_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::codes;
    use crate::testing::{message, sale};
    use shopline_core::{Operation, ProductStatus};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    fn config(url: String) -> WsRemoteConfig {
        WsRemoteConfig {
            url,
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_millis(500),
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
            connect_attempts: 2,
        }
    }

    /// Serves every connection with `handler`; `None` means stay silent.
    async fn spawn_server<F>(handler: F) -> (String, Arc<AtomicU32>)
    where
        F: Fn(RequestEnvelope) -> Option<ResponseEnvelope> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let handler = Arc::new(handler);
        let connections = Arc::new(AtomicU32::new(0));
        let counter = connections.clone();

        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let handler = handler.clone();
                tokio::spawn(async move {
                    let Ok(mut ws) = tokio_tungstenite::accept_async(tcp).await else {
                        return;
                    };
                    while let Some(Ok(frame)) = ws.next().await {
                        if let WsMessage::Text(text) = frame {
                            let request = RequestEnvelope::from_json(&text).unwrap();
                            if let Some(response) = handler(request) {
                                let json = response.to_json().unwrap();
                                if ws.send(WsMessage::Text(json.into())).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                });
            }
        });

        (url, connections)
    }

    fn store_server(request: RequestEnvelope) -> Option<ResponseEnvelope> {
        let id = request.request_id.clone();
        Some(match request.body {
            RemoteRequest::FetchProduct { product_id } if product_id == "P1" => ResponseEnvelope::product(
                id,
                Some(RemoteProduct {
                    id: product_id,
                    status: ProductStatus::Sold,
                    updated_at: None,
                    last_request_id: Some("local-other".into()),
                }),
            ),
            RemoteRequest::FetchProduct { .. } => {
                ResponseEnvelope::rejected(id, codes::NOT_FOUND, "No such product")
            }
            RemoteRequest::CompleteSale(_) => ResponseEnvelope::ok(id, "S-100"),
            RemoteRequest::SendMessage(_) => {
                ResponseEnvelope::rejected(id, codes::NOT_AVAILABLE, "Messaging disabled")
            }
            _ => ResponseEnvelope::ok(id, "S-1"),
        })
    }

    #[tokio::test]
    async fn test_calls_over_one_connection() {
        let (url, connections) = spawn_server(store_server).await;
        let store = WsRemoteStore::new(config(url));

        let Operation::CreateSale(payload) = sale("P2", 50_000) else {
            panic!("fixture is a sale");
        };
        assert_eq!(store.complete_sale("local-1", &payload).await.unwrap(), "S-100");

        let product = store.fetch_product("P1").await.unwrap().unwrap();
        assert_eq!(product.status, ProductStatus::Sold);
        assert!(store.fetch_product("P404").await.unwrap().is_none());

        assert_eq!(connections.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejection_is_typed() {
        let (url, _) = spawn_server(store_server).await;
        let store = WsRemoteStore::new(config(url));

        let Operation::SendMessage(payload) = message("+15550100") else {
            panic!("fixture is a message");
        };
        let err = store.send_message("local-2", &payload).await.unwrap_err();
        assert!(matches!(
            err,
            RemoteError::Rejected { ref code, .. } if code == codes::NOT_AVAILABLE
        ));
    }

    #[tokio::test]
    async fn test_reconnect_failure_keeps_its_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let connections = Arc::new(AtomicU32::new(0));
        let counter = connections.clone();

        // First connection answers once then drops; later ones close on request
        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::spawn(async move {
                    let Ok(mut ws) = tokio_tungstenite::accept_async(tcp).await else {
                        return;
                    };
                    if let Some(Ok(WsMessage::Text(text))) = ws.next().await {
                        let request = RequestEnvelope::from_json(&text).unwrap();
                        if n == 1 {
                            let json = ResponseEnvelope::ok(request.request_id, "S-1").to_json().unwrap();
                            let _ = ws.send(WsMessage::Text(json.into())).await;
                        } else {
                            let _ = ws.close(None).await;
                        }
                    }
                });
            }
        });

        let store = WsRemoteStore::new(config(url));
        let Operation::SendMessage(payload) = message("+15550100") else {
            panic!("fixture is a message");
        };
        assert_eq!(store.send_message("local-1", &payload).await.unwrap(), "S-1");

        let err = store.send_message("local-2", &payload).await.unwrap_err();
        assert_eq!(
            err,
            RemoteError::Unreachable("Connection closed by server".to_string())
        );
        assert_eq!(connections.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let (url, _) = spawn_server(|_| None).await;
        let store = WsRemoteStore::new(config(url));

        let Operation::SendMessage(payload) = message("+15550100") else {
            panic!("fixture is a message");
        };
        let err = store.send_message("local-3", &payload).await.unwrap_err();
        assert!(err.is_unreachable());
    }

    #[tokio::test]
    async fn test_unreachable_after_attempts() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        drop(listener);

        let store = WsRemoteStore::new(config(url));
        let err = store.fetch_product("P1").await.unwrap_err();
        assert!(err.is_unreachable());
    }

    #[test]
    fn test_config_requires_url() {
        let mut remote = RemoteConfig::default();
        assert!(WsRemoteConfig::from_config(&remote).unwrap_err().is_config_error());

        remote.url = Some("ws://10.0.0.5:8787/sync".into());
        let config = WsRemoteConfig::from_config(&remote).unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.initial_backoff, Duration::from_millis(500));
    }
}
