//! Event bus for decoupled communication between sync components.

use crate::store::Provenance;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Sync engine events
#[derive(Debug, Clone)]
pub enum Event {
    /// Core has started
    CoreStarted,

    /// Core is shutting down
    CoreShutdown,

    /// An inventory record was written. Carries the provenance tag so the
    /// outbound trigger can branch on it: writes originating from the
    /// external platform must never be propagated back out.
    InventoryChanged {
        tenant_id: Uuid,
        sku: String,
        quantity: i64,
        provenance: Provenance,
    },

    /// A tenant was deactivated (platform app uninstalled)
    TenantDeactivated { tenant_id: Uuid },

    /// Mappings for an external product were removed
    MappingsDeleted {
        tenant_id: Uuid,
        external_product_id: String,
        count: u64,
    },
}

/// Event bus for broadcasting events
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new event bus with specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event
    pub fn emit(&self, event: Event) {
        // Ignore send errors (no receivers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
