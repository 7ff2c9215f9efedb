//! Product mapping store: the join table between external catalog items
//! and internal SKUs. Written during discovery/sync, deleted when the
//! external product goes away.

use crate::infrastructure::database::entities::{product_mapping, ProductMapping};
use crate::infrastructure::events::{Event, EventBus};
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub use product_mapping::SyncDirection;

/// Fields required to establish a mapping
#[derive(Debug, Clone)]
pub struct NewMapping {
    pub tenant_id: Uuid,
    pub external_product_id: String,
    pub external_variant_id: String,
    pub external_inventory_item_id: String,
    pub internal_sku: String,
    pub external_sku: Option<String>,
    pub product_title: Option<String>,
    pub variant_title: Option<String>,
}

pub struct MappingStore {
    conn: DatabaseConnection,
    events: Arc<EventBus>,
}

impl MappingStore {
    pub fn new(conn: DatabaseConnection, events: Arc<EventBus>) -> Self {
        Self { conn, events }
    }

    /// Create or refresh the mapping for (tenant, external variant).
    pub async fn upsert(&self, mapping: NewMapping) -> Result<(), DbErr> {
        let now = Utc::now();
        let active = product_mapping::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            tenant_id: Set(mapping.tenant_id),
            external_product_id: Set(mapping.external_product_id),
            external_variant_id: Set(mapping.external_variant_id),
            external_inventory_item_id: Set(mapping.external_inventory_item_id),
            internal_sku: Set(mapping.internal_sku),
            external_sku: Set(mapping.external_sku),
            product_title: Set(mapping.product_title),
            variant_title: Set(mapping.variant_title),
            last_sync_direction: Set(None),
            last_synced_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        ProductMapping::insert(active)
            .on_conflict(
                OnConflict::columns([
                    product_mapping::Column::TenantId,
                    product_mapping::Column::ExternalVariantId,
                ])
                .update_columns([
                    product_mapping::Column::ExternalProductId,
                    product_mapping::Column::ExternalInventoryItemId,
                    product_mapping::Column::InternalSku,
                    product_mapping::Column::ExternalSku,
                    product_mapping::Column::ProductTitle,
                    product_mapping::Column::VariantTitle,
                    product_mapping::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec(&self.conn)
            .await?;

        Ok(())
    }

    pub async fn find_by_inventory_item(
        &self,
        tenant_id: Uuid,
        inventory_item_id: &str,
    ) -> Result<Option<product_mapping::Model>, DbErr> {
        ProductMapping::find()
            .filter(product_mapping::Column::TenantId.eq(tenant_id))
            .filter(product_mapping::Column::ExternalInventoryItemId.eq(inventory_item_id))
            .one(&self.conn)
            .await
    }

    pub async fn find_by_sku(
        &self,
        tenant_id: Uuid,
        sku: &str,
    ) -> Result<Option<product_mapping::Model>, DbErr> {
        ProductMapping::find()
            .filter(product_mapping::Column::TenantId.eq(tenant_id))
            .filter(product_mapping::Column::InternalSku.eq(sku))
            .one(&self.conn)
            .await
    }

    /// Stamp the mapping after a successful sync.
    pub async fn mark_synced(
        &self,
        mapping: product_mapping::Model,
        direction: SyncDirection,
    ) -> Result<(), DbErr> {
        let mut active: product_mapping::ActiveModel = mapping.into();
        active.last_sync_direction = Set(Some(direction));
        active.last_synced_at = Set(Some(Utc::now()));
        active.updated_at = Set(Utc::now());
        active.update(&self.conn).await?;
        Ok(())
    }

    /// Cascade cleanup when an external product is deleted.
    pub async fn delete_for_product(
        &self,
        tenant_id: Uuid,
        external_product_id: &str,
    ) -> Result<u64, DbErr> {
        let result = ProductMapping::delete_many()
            .filter(product_mapping::Column::TenantId.eq(tenant_id))
            .filter(product_mapping::Column::ExternalProductId.eq(external_product_id))
            .exec(&self.conn)
            .await?;

        if result.rows_affected > 0 {
            info!(
                %tenant_id,
                external_product_id,
                count = result.rows_affected,
                "Deleted mappings for removed product"
            );
            self.events.emit(Event::MappingsDeleted {
                tenant_id,
                external_product_id: external_product_id.to_string(),
                count: result.rows_affected,
            });
        }
        Ok(result.rows_affected)
    }
}
