//! # Conflict Resolver
//!
//! Applies an operator's decision to an item parked in `conflict`.
//!
//! ## Resolution Actions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ACTION               EFFECT                                            │
//! │  ──────               ──────                                            │
//! │  discard              remove item; create-sale puts the cached          │
//! │                       product back to "available"                       │
//! │  keep-server          same as discard: the local attempt is abandoned   │
//! │  keep-local           conflict → pending, retry count reset             │
//! │  generate-new-number  create-sale only: new receipt number (given or    │
//! │                       generated), conflict → pending, retried at once   │
//! │  merge                replacement payload required, conflict → pending  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Resolving an item that is missing or not in `conflict` is reported as a
//! failed resolution, never as a silent success.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use shopline_core::conflict::describe_conflict;
use shopline_core::receipt::regenerate_receipt_number;
use shopline_core::validation::validate_receipt_number;
use shopline_core::{
    ConflictDisplay, CoreError, Operation, ProductStatus, QueueItem, QueueStatus, ResolutionAction,
};
use shopline_db::QueueStore;

use crate::error::{SyncError, SyncResult};
use crate::queue::SyncQueueManager;
use crate::scheduler::SyncScheduler;

// =============================================================================
// Catalog Cache
// =============================================================================

/// Local read-model of catalog entities. The resolver only writes status.
#[async_trait]
pub trait CatalogCache: Send + Sync {
    /// Returns false if the entity is not cached.
    async fn mark_available(&self, product_id: &str) -> SyncResult<bool>;
}

#[async_trait]
impl CatalogCache for QueueStore {
    async fn mark_available(&self, product_id: &str) -> SyncResult<bool> {
        Ok(self
            .set_cached_product_status(product_id, ProductStatus::Available)
            .await?)
    }
}

// =============================================================================
// Inputs and Results
// =============================================================================

/// Caller-supplied extras for an action.
#[derive(Debug, Clone, Default)]
pub struct ResolutionInput {
    /// Receipt number for `generate-new-number`; generated when absent.
    pub receipt_number: Option<String>,
    /// Replacement payload for `merge`.
    pub merged: Option<Operation>,
}

impl ResolutionInput {
    pub fn receipt_number(number: impl Into<String>) -> Self {
        ResolutionInput {
            receipt_number: Some(number.into()),
            merged: None,
        }
    }

    pub fn merged(operation: Operation) -> Self {
        ResolutionInput {
            receipt_number: None,
            merged: Some(operation),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult {
    pub success: bool,
    pub message: String,
    pub error: Option<String>,
}

impl ResolutionResult {
    fn ok(message: impl Into<String>) -> Self {
        ResolutionResult {
            success: true,
            message: message.into(),
            error: None,
        }
    }

    fn failed(error: &SyncError) -> Self {
        ResolutionResult {
            success: false,
            message: "Resolution failed".to_string(),
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveAllResult {
    pub resolved: u32,
    pub failed: u32,
    pub errors: Vec<String>,
}

// =============================================================================
// Conflict Resolver
// =============================================================================

pub struct ConflictResolver {
    queue: Arc<SyncQueueManager>,
    scheduler: Arc<SyncScheduler>,
    catalog: Arc<dyn CatalogCache>,
    device_id: String,
}

impl ConflictResolver {
    pub fn new(
        queue: Arc<SyncQueueManager>,
        scheduler: Arc<SyncScheduler>,
        catalog: Arc<dyn CatalogCache>,
        device_id: impl Into<String>,
    ) -> Self {
        ConflictResolver {
            queue,
            scheduler,
            catalog,
            device_id: device_id.into(),
        }
    }

    /// Applies `action` to the conflict on item `id`.
    pub async fn resolve(&self, id: &str, action: ResolutionAction, input: ResolutionInput) -> ResolutionResult {
        match self.apply(id, action, input).await {
            Ok(message) => {
                info!(item_id = %id, %action, "Conflict resolved");
                ResolutionResult::ok(message)
            }
            Err(e) => {
                warn!(item_id = %id, %action, error = %e, "Conflict resolution failed");
                ResolutionResult::failed(&e)
            }
        }
    }

    /// Like [`ConflictResolver::resolve`], parsing the action name first.
    pub async fn resolve_named(&self, id: &str, action: &str, input: ResolutionInput) -> ResolutionResult {
        match action.parse::<ResolutionAction>() {
            Ok(action) => self.resolve(id, action, input).await,
            Err(_) => {
                let err = SyncError::UnknownAction(action.to_string());
                warn!(item_id = %id, error = %err, "Conflict resolution failed");
                ResolutionResult::failed(&err)
            }
        }
    }

    /// Applies `action` to every current conflict.
    ///
    /// Each item gets its own inputs; `generate-new-number` draws a fresh
    /// number per item.
    pub async fn resolve_all(&self, action: ResolutionAction) -> SyncResult<ResolveAllResult> {
        let mut summary = ResolveAllResult::default();

        for item in self.queue.get_conflicts().await? {
            let result = self.resolve(&item.id, action, ResolutionInput::default()).await;
            if result.success {
                summary.resolved += 1;
            } else {
                summary.failed += 1;
                let error = result.error.unwrap_or(result.message);
                summary.errors.push(format!("{}: {}", item.id, error));
            }
        }

        info!(
            %action,
            resolved = summary.resolved,
            failed = summary.failed,
            "Bulk conflict resolution finished"
        );
        Ok(summary)
    }

    /// Dialog content for the conflict on item `id`.
    pub async fn describe(&self, id: &str) -> SyncResult<ConflictDisplay> {
        let item = self.load_conflict(id).await?;
        Ok(describe_conflict(&item))
    }

    async fn load_conflict(&self, id: &str) -> SyncResult<QueueItem> {
        let item = self
            .queue
            .get(id)
            .await?
            .ok_or_else(|| SyncError::ItemNotFound(id.to_string()))?;

        if item.status() != QueueStatus::Conflict {
            return Err(SyncError::NotInConflict {
                id: id.to_string(),
                status: item.status(),
            });
        }
        Ok(item)
    }

    async fn apply(&self, id: &str, action: ResolutionAction, input: ResolutionInput) -> SyncResult<String> {
        let item = self.load_conflict(id).await?;

        match action {
            ResolutionAction::Discard | ResolutionAction::KeepServer => {
                let removed = self.queue.discard_conflict(id).await?;
                if let Operation::CreateSale(sale) = &removed.operation {
                    self.revert_product(&sale.product_id).await;
                }
                Ok(match action {
                    ResolutionAction::Discard => "Local operation discarded".to_string(),
                    _ => "Server version kept, local operation discarded".to_string(),
                })
            }

            ResolutionAction::KeepLocal => {
                self.queue.requeue_conflict(id, None).await?;
                Ok("Re-queued for another attempt".to_string())
            }

            ResolutionAction::GenerateNewNumber => {
                let number = match input.receipt_number {
                    Some(number) => {
                        validate_receipt_number(&number)?;
                        number
                    }
                    None => regenerate_receipt_number(
                        item.operation.receipt_number().unwrap_or_default(),
                        &self.device_id,
                        Utc::now(),
                    ),
                };

                let replacement = item.operation.with_receipt_number(number.as_str())?;
                self.queue.requeue_conflict(id, Some(replacement)).await?;

                match self.scheduler.retry_item(id).await {
                    Ok(outcome) => debug!(item_id = %id, ?outcome, "Immediate retry finished"),
                    Err(e) => warn!(item_id = %id, error = %e, "Immediate retry failed"),
                }
                Ok(format!("Re-queued with receipt number {}", number))
            }

            ResolutionAction::Merge => {
                let merged = input.merged.ok_or(CoreError::MissingMergePayload)?;
                self.queue.requeue_conflict(id, Some(merged)).await?;
                Ok("Merged payload re-queued".to_string())
            }
        }
    }

    /// Undoes the optimistic "sold" mark on the cached product.
    async fn revert_product(&self, product_id: &str) {
        match self.catalog.mark_available(product_id).await {
            Ok(true) => info!(product_id = %product_id, "Cached product available again"),
            Ok(false) => debug!(product_id = %product_id, "Product not cached, nothing to revert"),
            Err(e) => warn!(product_id = %product_id, error = %e, "Failed to revert cached product"),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
