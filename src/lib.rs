//! Stockbridge Core
//!
//! Bidirectional inventory synchronization between an external
//! e-commerce platform and an internal inventory store, for many tenants
//! at once. Webhooks come in, jobs go on a durable queue, workers
//! reconcile against live platform state, and internally-originated
//! changes are pushed back out.

pub mod audit;
pub mod config;
pub mod infrastructure;
pub mod platform;
pub mod services;
pub mod store;
pub mod vault;

use crate::audit::SyncLogger;
use crate::config::AppConfig;
use crate::infrastructure::database::Database;
use crate::infrastructure::events::{Event, EventBus};
use crate::infrastructure::jobs::{RetryPolicy, SqlQueue, SyncQueue};
use crate::platform::{GraphqlPlatformClient, PlatformClient};
use crate::services::{
    KeyLocks, OutboundWriter, ReconcileWorker, Services, WebhookServer, WebhookState, WorkerConfig,
};
use crate::store::{InventoryStore, MappingStore, TenantStore};
use crate::vault::CredentialVault;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// The main context for the sync engine
pub struct Core {
    /// Application configuration
    pub config: AppConfig,

    /// Database handle
    pub db: Arc<Database>,

    /// Event bus for state changes
    pub events: Arc<EventBus>,

    /// Durable job queue
    pub queue: Arc<dyn SyncQueue>,

    /// Credential vault
    pub vault: Arc<CredentialVault>,

    /// Tenant registry
    pub tenants: Arc<TenantStore>,

    /// Product mapping store
    pub mappings: Arc<MappingStore>,

    /// Internal inventory store
    pub inventory: Arc<InventoryStore>,

    /// Audit log
    pub audit: Arc<SyncLogger>,

    /// Background services
    services: Services,
}

impl Core {
    /// Initialize with the default data directory.
    pub async fn new() -> anyhow::Result<Self> {
        let data_dir = config::default_data_dir()?;
        Self::new_with_config(data_dir).await
    }

    /// Initialize with a custom data directory.
    pub async fn new_with_config(data_dir: PathBuf) -> anyhow::Result<Self> {
        info!("Initializing Stockbridge Core at {:?}", data_dir);

        // 1. Load or create app config
        let config = AppConfig::load_or_create(&data_dir)?;

        // 2. Vault key must be present and well-formed before anything else
        let vault = Arc::new(CredentialVault::new(&config::vault_key_from_env()?)?);

        // 3. Open database and run migrations
        let db = Arc::new(Database::open_or_create(&config.database_path()).await?);
        db.migrate().await?;

        // 4. Event bus
        let events = Arc::new(EventBus::default());

        // 5. Durable queue with the configured retry schedule
        let policy = RetryPolicy {
            initial_interval: Duration::from_secs(config.retry.initial_delay_secs),
            multiplier: config.retry.multiplier,
            max_interval: Duration::from_secs(config.retry.max_delay_secs),
            max_attempts: config.retry.max_attempts,
        };
        let queue: Arc<dyn SyncQueue> = Arc::new(SqlQueue::new(db.conn().clone(), policy));

        // Jobs leased by a previous run that crashed mid-job go back to
        // the runnable set before any worker starts
        let reclaimed = queue.reclaim_stale(config.job_timeout() * 2).await?;
        if reclaimed > 0 {
            warn!(reclaimed, "Requeued stale leases from a previous run");
        }

        // 6. Stores and audit log
        let tenants = Arc::new(TenantStore::new(db.conn().clone(), events.clone()));
        let mappings = Arc::new(MappingStore::new(db.conn().clone(), events.clone()));
        let inventory = Arc::new(InventoryStore::new(db.conn().clone(), events.clone()));
        let audit = Arc::new(SyncLogger::new(db.conn().clone()));

        // 7. Platform API client
        let platform: Arc<dyn PlatformClient> = Arc::new(GraphqlPlatformClient::new(
            config.platform_timeout(),
            &config.platform.api_version,
        )?);

        // 8. Assemble services
        let services = build_services(
            &config,
            events.clone(),
            queue.clone(),
            vault.clone(),
            tenants.clone(),
            mappings.clone(),
            inventory.clone(),
            audit.clone(),
            platform,
        );

        events.emit(Event::CoreStarted);

        Ok(Self {
            config,
            db,
            events,
            queue,
            vault,
            tenants,
            mappings,
            inventory,
            audit,
            services,
        })
    }

    /// Start the webhook receiver, outbound writer, and workers.
    pub async fn start(&self) -> anyhow::Result<()> {
        self.services.start_all().await
    }

    /// Shutdown the core gracefully
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        info!("Shutting down Stockbridge Core...");
        self.services.stop_all().await?;
        self.events.emit(Event::CoreShutdown);
        info!("Stockbridge Core shutdown complete");
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
fn build_services(
    config: &AppConfig,
    events: Arc<EventBus>,
    queue: Arc<dyn SyncQueue>,
    vault: Arc<CredentialVault>,
    tenants: Arc<TenantStore>,
    mappings: Arc<MappingStore>,
    inventory: Arc<InventoryStore>,
    audit: Arc<SyncLogger>,
    platform: Arc<dyn PlatformClient>,
) -> Services {
    let webhook = Arc::new(WebhookServer::new(
        WebhookState {
            tenants: tenants.clone(),
            vault: vault.clone(),
            queue: queue.clone(),
            audit: audit.clone(),
        },
        config.bind_addr,
    ));

    let outbound = Arc::new(OutboundWriter::new(
        events,
        queue.clone(),
        mappings.clone(),
        platform.clone(),
        audit.clone(),
    ));

    // One lock table shared by every worker so per-(tenant, SKU)
    // exclusion holds across the whole pool
    let locks = Arc::new(KeyLocks::new());
    let worker_config = WorkerConfig {
        job_timeout: config.job_timeout(),
        lease_timeout: config.job_timeout() * 2,
        ..WorkerConfig::default()
    };

    let workers = (0..config.worker_count.max(1))
        .map(|_| {
            Arc::new(ReconcileWorker::new(
                tenants.clone(),
                mappings.clone(),
                inventory.clone(),
                audit.clone(),
                queue.clone(),
                platform.clone(),
                vault.clone(),
                outbound.clone(),
                locks.clone(),
                worker_config.clone(),
            ))
        })
        .collect();

    Services::new(webhook, outbound, workers)
}
