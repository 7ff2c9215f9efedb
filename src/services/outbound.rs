//! Outbound writer: propagates internally-originated inventory changes to
//! the external platform.
//!
//! Two halves: an event-bus trigger that turns internal inventory writes
//! into queued push jobs (skipping external-provenance writes — the
//! anti-loop branch), and the push executor the worker invokes to perform
//! the idempotent absolute-quantity mutation.

use crate::audit::{EntityKind, LogEntry, SyncLogger, SyncOperation, SyncStatus};
use crate::infrastructure::events::{Event, EventBus};
use crate::infrastructure::jobs::{JobId, NewJob, QueueError, SyncQueue, SyncTask};
use crate::platform::{InventorySet, PlatformClient, PlatformCredentials};
use crate::services::error::SyncError;
use crate::store::{MappingStore, Provenance, SyncDirection};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Audit reason stamped on every outbound mutation
const CORRECTION_REASON: &str = "correction";

pub struct OutboundWriter {
    events: Arc<EventBus>,
    queue: Arc<dyn SyncQueue>,
    mappings: Arc<MappingStore>,
    platform: Arc<dyn PlatformClient>,
    audit: Arc<SyncLogger>,
}

impl OutboundWriter {
    pub fn new(
        events: Arc<EventBus>,
        queue: Arc<dyn SyncQueue>,
        mappings: Arc<MappingStore>,
        platform: Arc<dyn PlatformClient>,
        audit: Arc<SyncLogger>,
    ) -> Self {
        Self {
            events,
            queue,
            mappings,
            platform,
            audit,
        }
    }

    /// React to one bus event. Returns the enqueued job, if any.
    ///
    /// This is where the provenance tag earns its keep: a write whose
    /// provenance is `External` just came in from the platform, and
    /// re-propagating it would bounce every update back out forever.
    pub async fn handle_event(&self, event: &Event) -> Result<Option<JobId>, QueueError> {
        let Event::InventoryChanged {
            tenant_id,
            sku,
            quantity,
            provenance,
        } = event
        else {
            return Ok(None);
        };

        match provenance {
            Provenance::External => {
                debug!(%tenant_id, sku, "Suppressing outbound sync for external-origin write");
                Ok(None)
            }
            Provenance::Internal => {
                let id = self
                    .queue
                    .enqueue(NewJob {
                        tenant_id: *tenant_id,
                        key: format!("{}:{}", tenant_id, sku),
                        task: SyncTask::PushInventory {
                            sku: sku.clone(),
                            quantity: *quantity,
                        },
                    })
                    .await?;
                debug!(%tenant_id, sku, quantity, job = %id, "Enqueued outbound inventory push");
                Ok(Some(id))
            }
        }
    }

    /// Listen on the event bus until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut events = self.events.subscribe();
        info!("Outbound writer started");
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                received = events.recv() => match received {
                    Ok(event) => {
                        if let Err(err) = self.handle_event(&event).await {
                            error!(%err, "Failed to enqueue outbound sync");
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        // Dropped events mean missed outbound syncs; loud
                        // so operators can reconcile manually.
                        error!(missed, "Outbound writer lagged behind event bus");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        info!("Outbound writer stopped");
    }

    /// Execute one push job: a single absolute-quantity mutation at the
    /// tenant's configured location. Safe under retry because setting the
    /// same absolute quantity twice has no additional effect.
    pub async fn push(
        &self,
        tenant_id: Uuid,
        creds: &PlatformCredentials,
        location_id: &str,
        sku: &str,
        quantity: i64,
        started: Instant,
    ) -> Result<PushOutcome, SyncError> {
        let Some(mapping) = self.mappings.find_by_sku(tenant_id, sku).await? else {
            self.audit
                .record(LogEntry {
                    tenant_id,
                    entity_kind: EntityKind::Inventory,
                    operation: SyncOperation::Sync,
                    direction: Some(SyncDirection::Push),
                    status: SyncStatus::Skipped,
                    external_id: None,
                    internal_sku: Some(sku.to_string()),
                    message: Some("SKU is not mapped to a platform item".into()),
                    payload: None,
                    duration_ms: Some(started.elapsed().as_millis() as i64),
                })
                .await?;
            return Ok(PushOutcome::Skipped);
        };

        self.platform
            .set_inventory_level(
                creds,
                InventorySet {
                    inventory_item_id: mapping.external_inventory_item_id.clone(),
                    location_id: location_id.to_string(),
                    quantity,
                    reason: CORRECTION_REASON.to_string(),
                },
            )
            .await?;

        let external_id = mapping.external_inventory_item_id.clone();
        self.mappings.mark_synced(mapping, SyncDirection::Push).await?;

        self.audit
            .record(LogEntry {
                tenant_id,
                entity_kind: EntityKind::Inventory,
                operation: SyncOperation::Sync,
                direction: Some(SyncDirection::Push),
                status: SyncStatus::Success,
                external_id: Some(external_id),
                internal_sku: Some(sku.to_string()),
                message: Some(format!(
                    "Set platform quantity to {} at location {}",
                    quantity, location_id
                )),
                payload: None,
                duration_ms: Some(started.elapsed().as_millis() as i64),
            })
            .await?;

        Ok(PushOutcome::Pushed)
    }
}

/// Result of executing a push job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed,
    Skipped,
}
