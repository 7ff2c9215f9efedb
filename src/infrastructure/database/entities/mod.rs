//! Sea-ORM entity definitions
//!
//! These map the sync engine's domain models to database tables.

pub mod inventory_record;
pub mod product_mapping;
pub mod sync_job;
pub mod sync_log;
pub mod tenant;

// Re-export all entities
pub use inventory_record::Entity as InventoryRecord;
pub use product_mapping::Entity as ProductMapping;
pub use sync_job::Entity as SyncJob;
pub use sync_log::Entity as SyncLog;
pub use tenant::Entity as Tenant;

// Re-export active models for easy access
pub use inventory_record::ActiveModel as InventoryRecordActive;
pub use product_mapping::ActiveModel as ProductMappingActive;
pub use sync_job::ActiveModel as SyncJobActive;
pub use sync_log::ActiveModel as SyncLogActive;
pub use tenant::ActiveModel as TenantActive;
