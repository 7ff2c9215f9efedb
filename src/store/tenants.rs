//! Tenant store: one row per connected merchant account.

use crate::infrastructure::database::entities::{tenant, Tenant};
use crate::infrastructure::events::{Event, EventBus};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Fields required to register a tenant. Credentials arrive already
/// vault-encrypted; this store never sees plaintext secrets.
#[derive(Debug, Clone)]
pub struct NewTenant {
    pub platform_domain: String,
    pub access_token_ciphertext: String,
    pub webhook_secret_ciphertext: String,
    pub location_id: Option<String>,
    pub internal_tenant_id: String,
}

pub struct TenantStore {
    conn: DatabaseConnection,
    events: Arc<EventBus>,
}

impl TenantStore {
    pub fn new(conn: DatabaseConnection, events: Arc<EventBus>) -> Self {
        Self { conn, events }
    }

    /// Register a tenant on platform-app installation.
    pub async fn create(&self, tenant: NewTenant) -> Result<tenant::Model, DbErr> {
        let now = Utc::now();
        let active = tenant::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            platform_domain: Set(tenant.platform_domain),
            access_token_ciphertext: Set(tenant.access_token_ciphertext),
            webhook_secret_ciphertext: Set(tenant.webhook_secret_ciphertext),
            location_id: Set(tenant.location_id),
            internal_tenant_id: Set(tenant.internal_tenant_id),
            active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        active.insert(&self.conn).await
    }

    pub async fn find_by_domain(&self, domain: &str) -> Result<Option<tenant::Model>, DbErr> {
        Tenant::find()
            .filter(tenant::Column::PlatformDomain.eq(domain))
            .one(&self.conn)
            .await
    }

    pub async fn find_by_uuid(&self, uuid: Uuid) -> Result<Option<tenant::Model>, DbErr> {
        Tenant::find()
            .filter(tenant::Column::Uuid.eq(uuid))
            .one(&self.conn)
            .await
    }

    /// Deactivate on uninstall. Tenants are never hard-deleted; the row
    /// keeps its history and can be reactivated on reinstall.
    pub async fn deactivate(&self, uuid: Uuid) -> Result<(), DbErr> {
        let Some(model) = self.find_by_uuid(uuid).await? else {
            return Ok(());
        };
        if !model.active {
            return Ok(());
        }

        let mut active: tenant::ActiveModel = model.into();
        active.active = Set(false);
        active.updated_at = Set(Utc::now());
        active.update(&self.conn).await?;

        info!(tenant = %uuid, "Tenant deactivated");
        self.events.emit(Event::TenantDeactivated { tenant_id: uuid });
        Ok(())
    }

    /// Choose the external location all inventory sync is pinned to.
    pub async fn set_location(&self, uuid: Uuid, location_id: &str) -> Result<(), DbErr> {
        let Some(model) = self.find_by_uuid(uuid).await? else {
            return Ok(());
        };
        let mut active: tenant::ActiveModel = model.into();
        active.location_id = Set(Some(location_id.to_string()));
        active.updated_at = Set(Utc::now());
        active.update(&self.conn).await?;
        Ok(())
    }
}
