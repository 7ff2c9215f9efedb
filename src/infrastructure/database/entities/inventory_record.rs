//! Inventory record entity: current on-hand quantity per (tenant, SKU),
//! tagged with the side that last wrote it.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(indexed)]
    pub tenant_id: Uuid,

    /// Unique per tenant (composite index created in the migration)
    pub sku: String,

    pub quantity: i64,

    /// Which side last wrote this value. Always written in the same
    /// statement as the quantity; this tag is what stops external writes
    /// from being propagated back out in a loop.
    pub provenance: Provenance,

    pub updated_at: DateTimeUtc,
}

/// Origin of the last write to an inventory record
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum Provenance {
    /// Written by the reconciliation worker from a platform value
    #[sea_orm(string_value = "external")]
    External,
    /// Written by a merchant or internal process
    #[sea_orm(string_value = "internal")]
    Internal,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
