//! Create the durable sync job queue table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncJobs::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SyncJobs::Uuid).text().not_null().unique_key())
                    .col(ColumnDef::new(SyncJobs::TenantId).text().not_null())
                    .col(ColumnDef::new(SyncJobs::Key).string().not_null())
                    .col(ColumnDef::new(SyncJobs::Task).text().not_null())
                    .col(ColumnDef::new(SyncJobs::Status).string().not_null())
                    .col(ColumnDef::new(SyncJobs::Attempts).integer().not_null())
                    .col(ColumnDef::new(SyncJobs::RunAt).timestamp().not_null())
                    .col(ColumnDef::new(SyncJobs::LeasedAt).timestamp())
                    .col(ColumnDef::new(SyncJobs::LastError).text())
                    .col(ColumnDef::new(SyncJobs::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(SyncJobs::UpdatedAt).timestamp().not_null())
                    .col(ColumnDef::new(SyncJobs::CompletedAt).timestamp())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sync_jobs_status_run_at")
                    .table(SyncJobs::Table)
                    .col(SyncJobs::Status)
                    .col(SyncJobs::RunAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sync_jobs_tenant_id")
                    .table(SyncJobs::Table)
                    .col(SyncJobs::TenantId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sync_jobs_key")
                    .table(SyncJobs::Table)
                    .col(SyncJobs::Key)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SyncJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SyncJobs {
    Table,
    Id,
    Uuid,
    TenantId,
    Key,
    Task,
    Status,
    Attempts,
    RunAt,
    LeasedAt,
    LastError,
    CreatedAt,
    UpdatedAt,
    CompletedAt,
}
