//! Sync job entity: durable queue row for webhook-triggered and
//! internally-triggered units of sync work.

use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sync_jobs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub uuid: Uuid,

    #[sea_orm(indexed)]
    pub tenant_id: Uuid,

    /// Serialization key, e.g. "tenant:inventory-item" or "tenant:sku".
    /// Diagnostic and routing hint; strict per-SKU ordering is enforced
    /// by the worker's key locks after mapping resolution.
    #[sea_orm(indexed)]
    pub key: String,

    /// Serialized task payload
    #[sea_orm(column_type = "Json")]
    pub task: Json,

    #[sea_orm(indexed)]
    pub status: JobState,

    pub attempts: i32,

    /// Earliest time this job may be leased (backoff schedule)
    #[sea_orm(indexed)]
    pub run_at: DateTimeUtc,

    pub leased_at: Option<DateTimeUtc>,

    pub last_error: Option<String>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub completed_at: Option<DateTimeUtc>,
}

/// Queue-side state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum JobState {
    #[sea_orm(string_value = "queued")]
    Queued,
    #[sea_orm(string_value = "leased")]
    Leased,
    #[sea_orm(string_value = "completed")]
    Completed,
    /// Retry budget exhausted or failure was non-retryable; set aside
    /// for manual inspection
    #[sea_orm(string_value = "dead")]
    Dead,
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
