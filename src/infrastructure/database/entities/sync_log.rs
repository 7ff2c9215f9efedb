//! Sync log entity: append-only record of every sync attempt.
//!
//! Written by every component, read only by operators and diagnostics.
//! Never mutated or deleted except by explicit retention cleanup.

use super::product_mapping::SyncDirection;
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sync_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub uuid: Uuid,

    #[sea_orm(indexed)]
    pub tenant_id: Uuid,

    #[sea_orm(indexed)]
    pub entity_kind: EntityKind,

    pub operation: SyncOperation,

    pub direction: Option<SyncDirection>,

    #[sea_orm(indexed)]
    pub status: SyncStatus,

    pub external_id: Option<String>,
    pub internal_sku: Option<String>,

    pub message: Option<String>,

    /// Snapshot of the payload that drove this attempt
    #[sea_orm(column_type = "Json", nullable)]
    pub payload: Option<Json>,

    pub duration_ms: Option<i64>,

    #[sea_orm(indexed)]
    pub created_at: DateTimeUtc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum EntityKind {
    #[sea_orm(string_value = "product")]
    Product,
    #[sea_orm(string_value = "inventory")]
    Inventory,
    #[sea_orm(string_value = "order")]
    Order,
    #[sea_orm(string_value = "webhook")]
    Webhook,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum SyncOperation {
    #[sea_orm(string_value = "create")]
    Create,
    #[sea_orm(string_value = "update")]
    Update,
    #[sea_orm(string_value = "delete")]
    Delete,
    #[sea_orm(string_value = "sync")]
    Sync,
    #[sea_orm(string_value = "error")]
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum SyncStatus {
    #[sea_orm(string_value = "success")]
    Success,
    #[sea_orm(string_value = "error")]
    Error,
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "skipped")]
    Skipped,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {
    fn new() -> Self {
        Self {
            uuid: Set(Uuid::new_v4()),
            created_at: Set(chrono::Utc::now()),
            ..ActiveModelTrait::default()
        }
    }
}
