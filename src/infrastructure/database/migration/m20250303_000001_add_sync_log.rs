//! Add the append-only sync log table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncLog::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncLog::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SyncLog::Uuid).text().not_null().unique_key())
                    .col(ColumnDef::new(SyncLog::TenantId).text().not_null())
                    .col(ColumnDef::new(SyncLog::EntityKind).string().not_null())
                    .col(ColumnDef::new(SyncLog::Operation).string().not_null())
                    .col(ColumnDef::new(SyncLog::Direction).string())
                    .col(ColumnDef::new(SyncLog::Status).string().not_null())
                    .col(ColumnDef::new(SyncLog::ExternalId).string())
                    .col(ColumnDef::new(SyncLog::InternalSku).string())
                    .col(ColumnDef::new(SyncLog::Message).text())
                    .col(ColumnDef::new(SyncLog::Payload).text())
                    .col(ColumnDef::new(SyncLog::DurationMs).big_integer())
                    .col(ColumnDef::new(SyncLog::CreatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sync_log_tenant_id")
                    .table(SyncLog::Table)
                    .col(SyncLog::TenantId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sync_log_entity_kind")
                    .table(SyncLog::Table)
                    .col(SyncLog::EntityKind)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sync_log_status")
                    .table(SyncLog::Table)
                    .col(SyncLog::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sync_log_created_at")
                    .table(SyncLog::Table)
                    .col(SyncLog::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SyncLog::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SyncLog {
    Table,
    Id,
    Uuid,
    TenantId,
    EntityKind,
    Operation,
    Direction,
    Status,
    ExternalId,
    InternalSku,
    Message,
    Payload,
    DurationMs,
    CreatedAt,
}
