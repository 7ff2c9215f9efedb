//! Inventory record store: provenance-tagged quantity writes.

use crate::infrastructure::database::entities::{inventory_record, InventoryRecord};
use crate::infrastructure::events::{Event, EventBus};
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub use inventory_record::Provenance;

/// The only write path for inventory quantities. Quantity and provenance
/// go into the database in a single upsert; the emitted event carries the
/// same provenance tag so the outbound trigger can branch on it.
pub struct InventoryStore {
    conn: DatabaseConnection,
    events: Arc<EventBus>,
}

impl InventoryStore {
    pub fn new(conn: DatabaseConnection, events: Arc<EventBus>) -> Self {
        Self { conn, events }
    }

    /// Upsert the quantity for (tenant, SKU), tagged with its origin.
    pub async fn set_quantity(
        &self,
        tenant_id: Uuid,
        sku: &str,
        quantity: i64,
        provenance: Provenance,
    ) -> Result<(), DbErr> {
        let active = inventory_record::ActiveModel {
            tenant_id: Set(tenant_id),
            sku: Set(sku.to_string()),
            quantity: Set(quantity),
            provenance: Set(provenance),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };

        InventoryRecord::insert(active)
            .on_conflict(
                OnConflict::columns([
                    inventory_record::Column::TenantId,
                    inventory_record::Column::Sku,
                ])
                .update_columns([
                    inventory_record::Column::Quantity,
                    inventory_record::Column::Provenance,
                    inventory_record::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec(&self.conn)
            .await?;

        debug!(%tenant_id, sku, quantity, ?provenance, "Inventory record written");

        self.events.emit(Event::InventoryChanged {
            tenant_id,
            sku: sku.to_string(),
            quantity,
            provenance,
        });

        Ok(())
    }

    /// Current record for (tenant, SKU), if any.
    pub async fn get(
        &self,
        tenant_id: Uuid,
        sku: &str,
    ) -> Result<Option<inventory_record::Model>, DbErr> {
        InventoryRecord::find()
            .filter(inventory_record::Column::TenantId.eq(tenant_id))
            .filter(inventory_record::Column::Sku.eq(sku))
            .one(&self.conn)
            .await
    }
}
