//! Reconciliation worker: consumes sync jobs, applies conflict
//! resolution, and performs idempotent writes to whichever side did not
//! originate the change.

use crate::audit::{EntityKind, LogEntry, SyncLogger, SyncOperation, SyncStatus};
use crate::infrastructure::database::entities::tenant;
use crate::infrastructure::jobs::{LeasedJob, QueueError, SyncQueue, SyncTask};
use crate::platform::{PlatformClient, PlatformCredentials};
use crate::services::error::SyncError;
use crate::services::outbound::OutboundWriter;
use crate::store::{InventoryStore, MappingStore, Provenance, SyncDirection, TenantStore};
use crate::vault::CredentialVault;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Once the table reaches this size, released locks are swept on the
/// next acquire so the map stays bounded by the active key set
const LOCK_SWEEP_THRESHOLD: usize = 64;

/// Per-key mutual exclusion. Two jobs touching the same (tenant, SKU)
/// must not interleave their read-modify-write of the inventory record;
/// the queue itself promises no ordering.
#[derive(Default)]
pub struct KeyLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `key`, waiting if another job holds it.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            if map.len() >= LOCK_SWEEP_THRESHOLD {
                // An entry with no holder and no waiter exists only in
                // this map; dropping it is safe because every acquire
                // goes back through the map lock
                map.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Terminal state of one processed job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    /// Correctly did nothing (unmapped item, inactive tenant, unknown topic)
    Skipped,
}

/// Tuning for worker behavior
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Total processing budget per job; expiry returns the job to the
    /// queue under the standard backoff policy
    pub job_timeout: Duration,
    /// Idle sleep between polls when the queue is empty
    pub poll_interval: Duration,
    /// Leases older than this belong to a crashed worker and go back to
    /// the runnable set; must exceed `job_timeout`
    pub lease_timeout: Duration,
    /// How often each worker scans for stale leases
    pub reclaim_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            job_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
            lease_timeout: Duration::from_secs(120),
            reclaim_interval: Duration::from_secs(30),
        }
    }
}

pub struct ReconcileWorker {
    tenants: Arc<TenantStore>,
    mappings: Arc<MappingStore>,
    inventory: Arc<InventoryStore>,
    audit: Arc<SyncLogger>,
    queue: Arc<dyn SyncQueue>,
    platform: Arc<dyn PlatformClient>,
    vault: Arc<CredentialVault>,
    outbound: Arc<OutboundWriter>,
    locks: Arc<KeyLocks>,
    config: WorkerConfig,
}

impl ReconcileWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenants: Arc<TenantStore>,
        mappings: Arc<MappingStore>,
        inventory: Arc<InventoryStore>,
        audit: Arc<SyncLogger>,
        queue: Arc<dyn SyncQueue>,
        platform: Arc<dyn PlatformClient>,
        vault: Arc<CredentialVault>,
        outbound: Arc<OutboundWriter>,
        locks: Arc<KeyLocks>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            tenants,
            mappings,
            inventory,
            audit,
            queue,
            platform,
            vault,
            outbound,
            locks,
            config,
        }
    }

    /// Pull jobs until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Reconciliation worker started");
        let mut last_reclaim = Instant::now();
        loop {
            if *shutdown.borrow() {
                break;
            }
            if last_reclaim.elapsed() >= self.config.reclaim_interval {
                match self.queue.reclaim_stale(self.config.lease_timeout).await {
                    Ok(0) => {}
                    Ok(count) => warn!(count, "Requeued stale leases"),
                    Err(err) => error!(%err, "Stale lease reclaim failed"),
                }
                last_reclaim = Instant::now();
            }
            match self.process_next().await {
                Ok(true) => {}
                Ok(false) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = shutdown.changed() => break,
                    }
                }
                Err(err) => {
                    error!(%err, "Queue error in worker loop");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }
        info!("Reconciliation worker stopped");
    }

    /// Lease and fully process one job. Returns false when the queue had
    /// nothing runnable.
    pub async fn process_next(&self) -> Result<bool, QueueError> {
        let Some(job) = self.queue.lease().await? else {
            return Ok(false);
        };

        let started = Instant::now();
        let result = match tokio::time::timeout(self.config.job_timeout, self.execute(&job, started))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(SyncError::JobTimeout(self.config.job_timeout)),
        };

        match result {
            Ok(outcome) => {
                debug!(job = %job.id, ?outcome, "Job finished");
                self.queue.ack(job.id).await?;
            }
            Err(err) => {
                self.record_failure(&job, &err, started.elapsed()).await;
                if err.is_retryable() {
                    self.queue.retry(job.id, &err.to_string()).await?;
                } else {
                    self.queue.fail(job.id, &err.to_string()).await?;
                }
            }
        }
        Ok(true)
    }

    async fn execute(&self, job: &LeasedJob, started: Instant) -> Result<JobOutcome, SyncError> {
        match &job.task {
            SyncTask::InboundWebhook { topic, payload } => match topic.as_str() {
                "inventory_levels/update" => {
                    self.reconcile_inventory(job.tenant_id, payload, started).await
                }
                "products/delete" => self.handle_product_delete(job.tenant_id, payload, started).await,
                "app/uninstalled" => self.handle_uninstall(job.tenant_id, started).await,
                other => {
                    debug!(topic = other, "Ignoring webhook topic without a sync handler");
                    self.record_skip(
                        job.tenant_id,
                        EntityKind::Webhook,
                        None,
                        None,
                        format!("No handler for topic {}", other),
                        started,
                    )
                    .await?;
                    Ok(JobOutcome::Skipped)
                }
            },
            SyncTask::PushInventory { sku, quantity } => {
                self.push_inventory(job.tenant_id, sku, *quantity, started).await
            }
        }
    }

    /// Inbound inventory change: re-fetch the live quantity from the
    /// platform (never the payload's embedded value) and write it into
    /// the internal store tagged with external provenance.
    async fn reconcile_inventory(
        &self,
        tenant_id: Uuid,
        payload: &Value,
        started: Instant,
    ) -> Result<JobOutcome, SyncError> {
        let item_id = id_field(payload, "inventory_item_id").ok_or_else(|| {
            SyncError::Validation("payload has no inventory_item_id".to_string())
        })?;

        let Some(tenant) = self.active_tenant(tenant_id).await? else {
            self.record_skip(
                tenant_id,
                EntityKind::Inventory,
                Some(item_id),
                None,
                "Tenant is inactive".into(),
                started,
            )
            .await?;
            return Ok(JobOutcome::Skipped);
        };

        let mapping = match self.mappings.find_by_inventory_item(tenant_id, &item_id).await? {
            Some(mapping) => mapping,
            None => {
                // Not yet tracked; discovery creates mappings, not us
                self.record_skip(
                    tenant_id,
                    EntityKind::Inventory,
                    Some(item_id.clone()),
                    None,
                    format!("{}", SyncError::MappingNotFound(item_id)),
                    started,
                )
                .await?;
                return Ok(JobOutcome::Skipped);
            }
        };

        let sku = mapping.internal_sku.clone();
        let _guard = self.locks.acquire(&lock_key(tenant_id, &sku)).await;

        let location_id = self.location_of(&tenant)?;
        let creds = self.credentials_for(&tenant)?;

        let live_quantity = self
            .platform
            .inventory_level(&creds, &mapping.external_inventory_item_id, &location_id)
            .await?;
        if live_quantity < 0 {
            return Err(SyncError::Validation(format!(
                "platform reported negative quantity {} for item {}",
                live_quantity, mapping.external_inventory_item_id
            )));
        }

        // Quantity and provenance land in one atomic upsert
        self.inventory
            .set_quantity(tenant_id, &sku, live_quantity, Provenance::External)
            .await?;

        let external_id = mapping.external_inventory_item_id.clone();
        self.mappings.mark_synced(mapping, SyncDirection::Pull).await?;

        self.audit
            .record(LogEntry {
                tenant_id,
                entity_kind: EntityKind::Inventory,
                operation: SyncOperation::Sync,
                direction: Some(SyncDirection::Pull),
                status: SyncStatus::Success,
                external_id: Some(external_id),
                internal_sku: Some(sku),
                message: Some(format!(
                    "Live quantity {} from location {}",
                    live_quantity, location_id
                )),
                payload: Some(payload.clone()),
                duration_ms: Some(started.elapsed().as_millis() as i64),
            })
            .await?;

        Ok(JobOutcome::Completed)
    }

    /// Outbound push, delegated to the writer under the same key lock.
    async fn push_inventory(
        &self,
        tenant_id: Uuid,
        sku: &str,
        quantity: i64,
        started: Instant,
    ) -> Result<JobOutcome, SyncError> {
        let Some(tenant) = self.active_tenant(tenant_id).await? else {
            self.record_skip(
                tenant_id,
                EntityKind::Inventory,
                None,
                Some(sku.to_string()),
                "Tenant is inactive".into(),
                started,
            )
            .await?;
            return Ok(JobOutcome::Skipped);
        };

        let _guard = self.locks.acquire(&lock_key(tenant_id, sku)).await;

        let location_id = self.location_of(&tenant)?;
        let creds = self.credentials_for(&tenant)?;

        self.outbound
            .push(tenant_id, &creds, &location_id, sku, quantity, started)
            .await?;
        Ok(JobOutcome::Completed)
    }

    /// External product deleted: cascade mapping cleanup.
    async fn handle_product_delete(
        &self,
        tenant_id: Uuid,
        payload: &Value,
        started: Instant,
    ) -> Result<JobOutcome, SyncError> {
        let product_id = id_field(payload, "id")
            .ok_or_else(|| SyncError::Validation("product delete payload has no id".to_string()))?;

        let deleted = self.mappings.delete_for_product(tenant_id, &product_id).await?;

        self.audit
            .record(LogEntry {
                tenant_id,
                entity_kind: EntityKind::Product,
                operation: SyncOperation::Delete,
                direction: Some(SyncDirection::Pull),
                status: SyncStatus::Success,
                external_id: Some(product_id),
                internal_sku: None,
                message: Some(format!("Removed {} mapping(s)", deleted)),
                payload: Some(payload.clone()),
                duration_ms: Some(started.elapsed().as_millis() as i64),
            })
            .await?;

        Ok(JobOutcome::Completed)
    }

    /// Platform app uninstalled: deactivate, never delete.
    async fn handle_uninstall(
        &self,
        tenant_id: Uuid,
        started: Instant,
    ) -> Result<JobOutcome, SyncError> {
        self.tenants.deactivate(tenant_id).await?;

        self.audit
            .record(LogEntry {
                tenant_id,
                entity_kind: EntityKind::Webhook,
                operation: SyncOperation::Update,
                direction: Some(SyncDirection::Pull),
                status: SyncStatus::Success,
                external_id: None,
                internal_sku: None,
                message: Some("Tenant deactivated on uninstall".into()),
                payload: None,
                duration_ms: Some(started.elapsed().as_millis() as i64),
            })
            .await?;

        Ok(JobOutcome::Completed)
    }

    async fn active_tenant(&self, tenant_id: Uuid) -> Result<Option<tenant::Model>, SyncError> {
        let tenant = self
            .tenants
            .find_by_uuid(tenant_id)
            .await?
            .ok_or_else(|| SyncError::Validation(format!("unknown tenant {}", tenant_id)))?;
        if tenant.active {
            Ok(Some(tenant))
        } else {
            Ok(None)
        }
    }

    fn location_of(&self, tenant: &tenant::Model) -> Result<String, SyncError> {
        // Absence is a hard stop, never a 0-quantity default; a silent
        // zero here would corrupt merchant data
        tenant.location_id.clone().ok_or_else(|| {
            SyncError::ConfigMissing(format!(
                "tenant {} has no sync location configured",
                tenant.uuid
            ))
        })
    }

    fn credentials_for(&self, tenant: &tenant::Model) -> Result<PlatformCredentials, SyncError> {
        let access_token = self
            .vault
            .decrypt(&tenant.access_token_ciphertext)
            .map_err(|source| {
                error!(tenant = %tenant.uuid, %source, "Access credential decryption failed");
                SyncError::Credential {
                    tenant: tenant.uuid,
                    source,
                }
            })?;
        Ok(PlatformCredentials {
            domain: tenant.platform_domain.clone(),
            access_token,
        })
    }

    async fn record_skip(
        &self,
        tenant_id: Uuid,
        entity_kind: EntityKind,
        external_id: Option<String>,
        internal_sku: Option<String>,
        message: String,
        started: Instant,
    ) -> Result<(), SyncError> {
        self.audit
            .record(LogEntry {
                tenant_id,
                entity_kind,
                operation: SyncOperation::Sync,
                direction: None,
                status: SyncStatus::Skipped,
                external_id,
                internal_sku,
                message: Some(message),
                payload: None,
                duration_ms: Some(started.elapsed().as_millis() as i64),
            })
            .await?;
        Ok(())
    }

    /// One error entry per failed attempt; the queue decides what happens
    /// to the job next. Audit failures are logged, never propagated, so
    /// they cannot mask the original error.
    async fn record_failure(&self, job: &LeasedJob, err: &SyncError, elapsed: Duration) {
        let (entity_kind, direction, external_id, internal_sku, payload) = match &job.task {
            SyncTask::InboundWebhook { topic, payload } => (
                if topic == "inventory_levels/update" {
                    EntityKind::Inventory
                } else {
                    EntityKind::Webhook
                },
                Some(SyncDirection::Pull),
                id_field(payload, "inventory_item_id"),
                None,
                Some(payload.clone()),
            ),
            SyncTask::PushInventory { sku, .. } => (
                EntityKind::Inventory,
                Some(SyncDirection::Push),
                None,
                Some(sku.clone()),
                None,
            ),
        };

        let entry = LogEntry {
            tenant_id: job.tenant_id,
            entity_kind,
            operation: SyncOperation::Sync,
            direction,
            status: SyncStatus::Error,
            external_id,
            internal_sku,
            message: Some(err.to_string()),
            payload,
            duration_ms: Some(elapsed.as_millis() as i64),
        };
        if let Err(audit_err) = self.audit.record(entry).await {
            error!(job = %job.id, %audit_err, "Failed to write error audit entry");
        }

        warn!(job = %job.id, attempts = job.attempts, %err, "Job attempt failed");
    }
}

fn lock_key(tenant_id: Uuid, sku: &str) -> String {
    format!("{}:{}", tenant_id, sku)
}

/// Platform identifiers arrive as strings or numbers depending on the
/// webhook topic version; normalize to a string.
fn id_field(payload: &Value, field: &str) -> Option<String> {
    match payload.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
