//! Stores over the shared mutable state: tenants, product mappings, and
//! inventory records. All writes to rows shared between workers go
//! through upserts keyed by their unique constraints.

mod inventory;
mod mappings;
mod tenants;

pub use inventory::InventoryStore;
pub use mappings::{MappingStore, NewMapping};
pub use tenants::{NewTenant, TenantStore};

pub use crate::infrastructure::database::entities::inventory_record::Provenance;
pub use crate::infrastructure::database::entities::product_mapping::SyncDirection;
