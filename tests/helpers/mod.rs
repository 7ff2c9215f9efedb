//! Shared test harness: a real temp-file database with migrations
//! applied, a mock platform client, and the full worker assembly.

// Not every test binary touches every helper
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use stockbridge_core::audit::SyncLogger;
use stockbridge_core::infrastructure::database::Database;
use stockbridge_core::infrastructure::events::EventBus;
use stockbridge_core::infrastructure::jobs::{MemoryQueue, RetryPolicy, SyncQueue};
use stockbridge_core::platform::{
    InventorySet, PlatformClient, PlatformCredentials, PlatformError,
};
use stockbridge_core::services::{KeyLocks, OutboundWriter, ReconcileWorker, WorkerConfig};
use stockbridge_core::store::{
    InventoryStore, MappingStore, NewMapping, NewTenant, TenantStore,
};
use stockbridge_core::vault::CredentialVault;
use tempfile::TempDir;
use tokio::sync::Mutex;
use uuid::Uuid;

pub const ACCESS_TOKEN: &str = "test-access-token";
pub const WEBHOOK_SECRET: &str = "test-webhook-secret";

/// Scripted platform double. Levels are served from an in-memory map and
/// every mutation is recorded for assertions.
pub struct MockPlatform {
    levels: Mutex<HashMap<(String, String), i64>>,
    pub sets: Mutex<Vec<InventorySet>>,
    fail_next: Mutex<Option<PlatformError>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            levels: Mutex::new(HashMap::new()),
            sets: Mutex::new(Vec::new()),
            fail_next: Mutex::new(None),
        }
    }

    pub async fn set_level(&self, item_id: &str, location_id: &str, quantity: i64) {
        self.levels
            .lock()
            .await
            .insert((item_id.to_string(), location_id.to_string()), quantity);
    }

    /// Make the next API call fail with `err`.
    pub async fn fail_next(&self, err: PlatformError) {
        *self.fail_next.lock().await = Some(err);
    }

    async fn take_failure(&self) -> Option<PlatformError> {
        self.fail_next.lock().await.take()
    }

    pub async fn recorded_sets(&self) -> Vec<InventorySet> {
        self.sets.lock().await.clone()
    }
}

#[async_trait]
impl PlatformClient for MockPlatform {
    async fn inventory_level(
        &self,
        _creds: &PlatformCredentials,
        inventory_item_id: &str,
        location_id: &str,
    ) -> Result<i64, PlatformError> {
        if let Some(err) = self.take_failure().await {
            return Err(err);
        }
        self.levels
            .lock()
            .await
            .get(&(inventory_item_id.to_string(), location_id.to_string()))
            .copied()
            .ok_or_else(|| {
                PlatformError::InvalidResponse(format!(
                    "no inventory level for item {} at location {}",
                    inventory_item_id, location_id
                ))
            })
    }

    async fn set_inventory_level(
        &self,
        _creds: &PlatformCredentials,
        set: InventorySet,
    ) -> Result<(), PlatformError> {
        if let Some(err) = self.take_failure().await {
            return Err(err);
        }
        self.levels.lock().await.insert(
            (set.inventory_item_id.clone(), set.location_id.clone()),
            set.quantity,
        );
        self.sets.lock().await.push(set);
        Ok(())
    }
}

pub struct Harness {
    // Held for the lifetime of the test so the database file survives
    pub _dir: TempDir,
    pub db: Arc<Database>,
    pub events: Arc<EventBus>,
    pub vault: Arc<CredentialVault>,
    pub queue: Arc<MemoryQueue>,
    pub tenants: Arc<TenantStore>,
    pub mappings: Arc<MappingStore>,
    pub inventory: Arc<InventoryStore>,
    pub audit: Arc<SyncLogger>,
    pub platform: Arc<MockPlatform>,
    pub outbound: Arc<OutboundWriter>,
    pub worker: ReconcileWorker,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_policy(RetryPolicy::default()).await
    }

    pub async fn with_policy(policy: RetryPolicy) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let db = Arc::new(
            Database::create(&dir.path().join("sync.db"))
                .await
                .expect("create database"),
        );
        db.migrate().await.expect("migrations");

        let events = Arc::new(EventBus::default());
        let vault = Arc::new(CredentialVault::new(&[7u8; 32]).expect("vault key"));
        let queue = Arc::new(MemoryQueue::new(policy));
        let queue_dyn: Arc<dyn SyncQueue> = queue.clone();

        let tenants = Arc::new(TenantStore::new(db.conn().clone(), events.clone()));
        let mappings = Arc::new(MappingStore::new(db.conn().clone(), events.clone()));
        let inventory = Arc::new(InventoryStore::new(db.conn().clone(), events.clone()));
        let audit = Arc::new(SyncLogger::new(db.conn().clone()));
        let platform = Arc::new(MockPlatform::new());

        let outbound = Arc::new(OutboundWriter::new(
            events.clone(),
            queue_dyn.clone(),
            mappings.clone(),
            platform.clone(),
            audit.clone(),
        ));

        let worker = ReconcileWorker::new(
            tenants.clone(),
            mappings.clone(),
            inventory.clone(),
            audit.clone(),
            queue_dyn,
            platform.clone(),
            vault.clone(),
            outbound.clone(),
            Arc::new(KeyLocks::new()),
            WorkerConfig {
                job_timeout: Duration::from_secs(5),
                poll_interval: Duration::from_millis(10),
                ..WorkerConfig::default()
            },
        );

        Self {
            _dir: dir,
            db,
            events,
            vault,
            queue,
            tenants,
            mappings,
            inventory,
            audit,
            platform,
            outbound,
            worker,
        }
    }

    /// Register an active tenant with encrypted credentials and a
    /// configured location.
    pub async fn make_tenant(&self, domain: &str, location: Option<&str>) -> Uuid {
        let tenant = self
            .tenants
            .create(NewTenant {
                platform_domain: domain.to_string(),
                access_token_ciphertext: self.vault.encrypt(ACCESS_TOKEN).unwrap(),
                webhook_secret_ciphertext: self.vault.encrypt(WEBHOOK_SECRET).unwrap(),
                location_id: location.map(str::to_owned),
                internal_tenant_id: format!("internal-{}", domain),
            })
            .await
            .expect("create tenant");
        tenant.uuid
    }

    /// Map one external item to one SKU.
    pub async fn make_mapping(&self, tenant_id: Uuid, item_id: &str, sku: &str) {
        self.mappings
            .upsert(NewMapping {
                tenant_id,
                external_product_id: format!("product-for-{}", item_id),
                external_variant_id: format!("variant-for-{}", item_id),
                external_inventory_item_id: item_id.to_string(),
                internal_sku: sku.to_string(),
                external_sku: Some(sku.to_string()),
                product_title: Some("Test Product".into()),
                variant_title: None,
            })
            .await
            .expect("create mapping");
    }

    /// Run the worker until the queue has no runnable jobs.
    pub async fn drain_queue(&self) {
        while self.worker.process_next().await.expect("process job") {}
    }
}
