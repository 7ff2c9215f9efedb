//! Tenant entity: one row per connected merchant account.
//!
//! Credentials are stored encrypted (vault format); tenants are
//! deactivated on uninstall, never hard-deleted.

use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tenants")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub uuid: Uuid,

    /// External platform shop domain, e.g. "acme.example-platform.com"
    #[sea_orm(unique)]
    pub platform_domain: String,

    /// Platform access credential, vault-encrypted
    pub access_token_ciphertext: String,

    /// Webhook shared secret, vault-encrypted
    pub webhook_secret_ciphertext: String,

    /// Tenant-chosen external location used for all inventory sync.
    /// Absence is a hard configuration error for sync, never a default.
    pub location_id: Option<String>,

    /// Identifier of this tenant in the internal inventory store
    pub internal_tenant_id: String,

    #[sea_orm(indexed)]
    pub active: bool,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {
    fn new() -> Self {
        Self {
            uuid: Set(Uuid::new_v4()),
            active: Set(true),
            created_at: Set(chrono::Utc::now()),
            updated_at: Set(chrono::Utc::now()),
            ..ActiveModelTrait::default()
        }
    }
}
