//! Append-only sync audit log.
//!
//! Every terminal job outcome produces exactly one entry. Entries are
//! never mutated; the only delete path is explicit retention cleanup.

use crate::infrastructure::database::entities::{sync_log, SyncLog};
use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

pub use sync_log::{EntityKind, SyncOperation, SyncStatus};

/// One sync attempt, ready to be appended
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub tenant_id: Uuid,
    pub entity_kind: EntityKind,
    pub operation: SyncOperation,
    pub direction: Option<crate::store::SyncDirection>,
    pub status: SyncStatus,
    pub external_id: Option<String>,
    pub internal_sku: Option<String>,
    pub message: Option<String>,
    pub payload: Option<serde_json::Value>,
    pub duration_ms: Option<i64>,
}

/// Tenant-visible sync health, derived from recent error density
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncHealth {
    Healthy,
    /// Persistent failures dominate recent attempts
    Degraded,
}

/// How many recent entries the health check inspects
const HEALTH_WINDOW: u64 = 20;
/// Minimum sample before declaring a tenant degraded
const HEALTH_MIN_SAMPLE: usize = 5;

pub struct SyncLogger {
    conn: DatabaseConnection,
}

impl SyncLogger {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Append one entry.
    pub async fn record(&self, entry: LogEntry) -> Result<(), DbErr> {
        let active = sync_log::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            tenant_id: Set(entry.tenant_id),
            entity_kind: Set(entry.entity_kind),
            operation: Set(entry.operation),
            direction: Set(entry.direction),
            status: Set(entry.status),
            external_id: Set(entry.external_id),
            internal_sku: Set(entry.internal_sku),
            message: Set(entry.message),
            payload: Set(entry.payload),
            duration_ms: Set(entry.duration_ms),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        active.insert(&self.conn).await?;
        Ok(())
    }

    /// Most recent entries for a tenant, newest first.
    pub async fn recent(
        &self,
        tenant_id: Uuid,
        limit: u64,
    ) -> Result<Vec<sync_log::Model>, DbErr> {
        SyncLog::find()
            .filter(sync_log::Column::TenantId.eq(tenant_id))
            .order_by_desc(sync_log::Column::CreatedAt)
            .order_by_desc(sync_log::Column::Id)
            .limit(limit)
            .all(&self.conn)
            .await
    }

    /// Degraded when errors dominate the recent window. Persistent sync
    /// failures surface here rather than as raw exceptions.
    pub async fn sync_health(&self, tenant_id: Uuid) -> Result<SyncHealth, DbErr> {
        let cutoff = Utc::now() - Duration::hours(1);
        let recent: Vec<sync_log::Model> = SyncLog::find()
            .filter(sync_log::Column::TenantId.eq(tenant_id))
            .filter(sync_log::Column::CreatedAt.gte(cutoff))
            .order_by_desc(sync_log::Column::CreatedAt)
            .order_by_desc(sync_log::Column::Id)
            .limit(HEALTH_WINDOW)
            .all(&self.conn)
            .await?;

        if recent.len() < HEALTH_MIN_SAMPLE {
            return Ok(SyncHealth::Healthy);
        }

        let errors = recent
            .iter()
            .filter(|e| e.status == SyncStatus::Error)
            .count();
        if errors * 2 > recent.len() {
            Ok(SyncHealth::Degraded)
        } else {
            Ok(SyncHealth::Healthy)
        }
    }

    /// Retention cleanup: delete entries older than `days` days.
    pub async fn prune_older_than(&self, days: i64) -> Result<u64, DbErr> {
        let cutoff = Utc::now() - Duration::days(days);
        let result = SyncLog::delete_many()
            .filter(sync_log::Column::CreatedAt.lt(cutoff))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected)
    }
}
