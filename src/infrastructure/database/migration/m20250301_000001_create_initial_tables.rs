//! Create tenants, product mappings, and inventory records

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Tenants::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Tenants::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Tenants::Uuid).text().not_null().unique_key())
                    .col(
                        ColumnDef::new(Tenants::PlatformDomain)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Tenants::AccessTokenCiphertext)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Tenants::WebhookSecretCiphertext)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Tenants::LocationId).string())
                    .col(ColumnDef::new(Tenants::InternalTenantId).string().not_null())
                    .col(ColumnDef::new(Tenants::Active).boolean().not_null())
                    .col(ColumnDef::new(Tenants::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Tenants::UpdatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tenants_active")
                    .table(Tenants::Table)
                    .col(Tenants::Active)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ProductMappings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProductMappings::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ProductMappings::Uuid)
                            .text()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(ProductMappings::TenantId).text().not_null())
                    .col(
                        ColumnDef::new(ProductMappings::ExternalProductId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProductMappings::ExternalVariantId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProductMappings::ExternalInventoryItemId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProductMappings::InternalSku)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ProductMappings::ExternalSku).string())
                    .col(ColumnDef::new(ProductMappings::ProductTitle).string())
                    .col(ColumnDef::new(ProductMappings::VariantTitle).string())
                    .col(ColumnDef::new(ProductMappings::LastSyncDirection).string())
                    .col(ColumnDef::new(ProductMappings::LastSyncedAt).timestamp())
                    .col(
                        ColumnDef::new(ProductMappings::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProductMappings::UpdatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Exactly one mapping per (tenant, external variant)
        manager
            .create_index(
                Index::create()
                    .name("idx_product_mappings_tenant_variant")
                    .table(ProductMappings::Table)
                    .col(ProductMappings::TenantId)
                    .col(ProductMappings::ExternalVariantId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_product_mappings_tenant_item")
                    .table(ProductMappings::Table)
                    .col(ProductMappings::TenantId)
                    .col(ProductMappings::ExternalInventoryItemId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_product_mappings_tenant_sku")
                    .table(ProductMappings::Table)
                    .col(ProductMappings::TenantId)
                    .col(ProductMappings::InternalSku)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_product_mappings_tenant_product")
                    .table(ProductMappings::Table)
                    .col(ProductMappings::TenantId)
                    .col(ProductMappings::ExternalProductId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(InventoryRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(InventoryRecords::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(InventoryRecords::TenantId).text().not_null())
                    .col(ColumnDef::new(InventoryRecords::Sku).string().not_null())
                    .col(
                        ColumnDef::new(InventoryRecords::Quantity)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InventoryRecords::Provenance)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InventoryRecords::UpdatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // One record per (tenant, SKU); the target of all upserts
        manager
            .create_index(
                Index::create()
                    .name("idx_inventory_records_tenant_sku")
                    .table(InventoryRecords::Table)
                    .col(InventoryRecords::TenantId)
                    .col(InventoryRecords::Sku)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(InventoryRecords::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProductMappings::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Tenants::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Tenants {
    Table,
    Id,
    Uuid,
    PlatformDomain,
    AccessTokenCiphertext,
    WebhookSecretCiphertext,
    LocationId,
    InternalTenantId,
    Active,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ProductMappings {
    Table,
    Id,
    Uuid,
    TenantId,
    ExternalProductId,
    ExternalVariantId,
    ExternalInventoryItemId,
    InternalSku,
    ExternalSku,
    ProductTitle,
    VariantTitle,
    LastSyncDirection,
    LastSyncedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum InventoryRecords {
    Table,
    Id,
    TenantId,
    Sku,
    Quantity,
    Provenance,
    UpdatedAt,
}
