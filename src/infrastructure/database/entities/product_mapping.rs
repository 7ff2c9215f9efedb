//! Product mapping entity: the join record linking an external catalog
//! item to an internal SKU, one per (tenant, external variant).

use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "product_mappings")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub uuid: Uuid,

    #[sea_orm(indexed)]
    pub tenant_id: Uuid,

    #[sea_orm(indexed)]
    pub external_product_id: String,

    /// Unique per tenant (composite index created in the migration)
    pub external_variant_id: String,

    #[sea_orm(indexed)]
    pub external_inventory_item_id: String,

    #[sea_orm(indexed)]
    pub internal_sku: String,

    /// SKU as the external platform knows it; may differ from ours
    pub external_sku: Option<String>,

    /// Human-readable titles, kept for diagnostics only
    pub product_title: Option<String>,
    pub variant_title: Option<String>,

    pub last_sync_direction: Option<SyncDirection>,
    pub last_synced_at: Option<DateTimeUtc>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

/// Which way the last successful sync moved data
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum SyncDirection {
    /// external platform -> internal store
    #[sea_orm(string_value = "pull")]
    Pull,
    /// internal store -> external platform
    #[sea_orm(string_value = "push")]
    Push,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {
    fn new() -> Self {
        Self {
            uuid: Set(Uuid::new_v4()),
            created_at: Set(chrono::Utc::now()),
            updated_at: Set(chrono::Utc::now()),
            ..ActiveModelTrait::default()
        }
    }
}
