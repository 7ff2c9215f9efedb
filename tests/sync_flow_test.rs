//! End-to-end reconciliation behavior over a real migrated database:
//! inbound pulls, outbound pushes, loop suppression, and failure paths.

mod helpers;

use helpers::Harness;
use pretty_assertions::assert_eq;
use serde_json::json;
use stockbridge_core::audit::SyncStatus;
use stockbridge_core::infrastructure::events::Event;
use stockbridge_core::infrastructure::jobs::{NewJob, RetryPolicy, SyncQueue, SyncTask};
use stockbridge_core::store::Provenance;
use uuid::Uuid;

async fn enqueue_webhook(h: &Harness, tenant_id: Uuid, topic: &str, payload: serde_json::Value) {
    h.queue
        .enqueue(NewJob {
            tenant_id,
            key: format!("{}:{}", tenant_id, topic),
            task: SyncTask::InboundWebhook {
                topic: topic.to_string(),
                payload,
            },
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn inbound_change_pulls_live_quantity() {
    let h = Harness::new().await;
    let tenant = h.make_tenant("shop-a.example.com", Some("loc-1")).await;
    h.make_mapping(tenant, "item-1", "SKU-RED").await;
    h.platform.set_level("item-1", "loc-1", 7).await;

    // Payload claims 999; the worker must trust only the live re-fetch
    enqueue_webhook(
        &h,
        tenant,
        "inventory_levels/update",
        json!({ "inventory_item_id": "item-1", "available": 999 }),
    )
    .await;
    h.drain_queue().await;

    let record = h.inventory.get(tenant, "SKU-RED").await.unwrap().unwrap();
    assert_eq!(record.quantity, 7);
    assert_eq!(record.provenance, Provenance::External);

    let entries = h.audit.recent(tenant, 10).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, SyncStatus::Success);
    assert_eq!(entries[0].internal_sku.as_deref(), Some("SKU-RED"));
}

#[tokio::test]
async fn external_origin_write_is_not_pushed_back() {
    let h = Harness::new().await;
    let tenant = h.make_tenant("shop-a.example.com", Some("loc-1")).await;

    let enqueued = h
        .outbound
        .handle_event(&Event::InventoryChanged {
            tenant_id: tenant,
            sku: "SKU-RED".into(),
            quantity: 7,
            provenance: Provenance::External,
        })
        .await
        .unwrap();

    assert_eq!(enqueued, None);
    assert_eq!(h.queue.depth().await.unwrap(), 0);
}

#[tokio::test]
async fn internal_change_pushes_absolute_quantity() {
    let h = Harness::new().await;
    let tenant = h.make_tenant("shop-a.example.com", Some("loc-1")).await;
    h.make_mapping(tenant, "item-1", "SKU-RED").await;

    // Internal write emits an event; feed it to the outbound trigger
    let mut events = h.events.subscribe();
    h.inventory
        .set_quantity(tenant, "SKU-RED", 42, Provenance::Internal)
        .await
        .unwrap();
    let event = events.recv().await.unwrap();

    let enqueued = h.outbound.handle_event(&event).await.unwrap();
    assert!(enqueued.is_some());
    h.drain_queue().await;

    let sets = h.platform.recorded_sets().await;
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].inventory_item_id, "item-1");
    assert_eq!(sets[0].location_id, "loc-1");
    assert_eq!(sets[0].quantity, 42);
    assert_eq!(sets[0].reason, "correction");

    // A repeated internal write makes a second, equally absolute push
    h.inventory
        .set_quantity(tenant, "SKU-RED", 42, Provenance::Internal)
        .await
        .unwrap();
    let event = events.recv().await.unwrap();
    h.outbound.handle_event(&event).await.unwrap();
    h.drain_queue().await;

    assert_eq!(h.platform.recorded_sets().await.len(), 2);
    let entries = h.audit.recent(tenant, 10).await.unwrap();
    assert_eq!(entries.len(), 2);
}

#[tokio::test]
async fn unmapped_item_is_skipped_without_retry() {
    let h = Harness::new().await;
    let tenant = h.make_tenant("shop-a.example.com", Some("loc-1")).await;

    enqueue_webhook(
        &h,
        tenant,
        "inventory_levels/update",
        json!({ "inventory_item_id": "never-seen", "available": 3 }),
    )
    .await;
    h.drain_queue().await;

    assert_eq!(h.queue.depth().await.unwrap(), 0);
    assert_eq!(h.queue.dead_letter_count().await.unwrap(), 0);

    let entries = h.audit.recent(tenant, 10).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, SyncStatus::Skipped);
}

#[tokio::test]
async fn missing_location_dead_letters_the_job() {
    let h = Harness::new().await;
    let tenant = h.make_tenant("shop-a.example.com", None).await;
    h.make_mapping(tenant, "item-1", "SKU-RED").await;

    enqueue_webhook(
        &h,
        tenant,
        "inventory_levels/update",
        json!({ "inventory_item_id": "item-1" }),
    )
    .await;
    h.drain_queue().await;

    // No quantity may be invented for an unconfigured tenant
    assert!(h.inventory.get(tenant, "SKU-RED").await.unwrap().is_none());
    assert_eq!(h.queue.dead_letter_count().await.unwrap(), 1);

    let errors = h.queue.dead_letter_errors().await;
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("no sync location"), "got: {}", errors[0]);

    let entries = h.audit.recent(tenant, 10).await.unwrap();
    assert_eq!(entries[0].status, SyncStatus::Error);
}

#[tokio::test]
async fn transient_platform_failure_is_retried_with_delay() {
    let h = Harness::new().await;
    let tenant = h.make_tenant("shop-a.example.com", Some("loc-1")).await;
    h.make_mapping(tenant, "item-1", "SKU-RED").await;
    h.platform.set_level("item-1", "loc-1", 7).await;
    h.platform
        .fail_next(stockbridge_core::platform::PlatformError::Transient(
            "HTTP 503".into(),
        ))
        .await;

    enqueue_webhook(
        &h,
        tenant,
        "inventory_levels/update",
        json!({ "inventory_item_id": "item-1" }),
    )
    .await;
    h.drain_queue().await;

    // Failed attempt went back on the queue with a future run_at
    assert_eq!(h.queue.depth().await.unwrap(), 1);
    assert_eq!(h.queue.dead_letter_count().await.unwrap(), 0);
    assert!(h.inventory.get(tenant, "SKU-RED").await.unwrap().is_none());

    let entries = h.audit.recent(tenant, 10).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, SyncStatus::Error);
}

#[tokio::test]
async fn zero_delay_retry_recovers_on_second_attempt() {
    let h = Harness::with_policy(RetryPolicy {
        initial_interval: std::time::Duration::ZERO,
        max_attempts: 2,
        ..RetryPolicy::default()
    })
    .await;
    let tenant = h.make_tenant("shop-a.example.com", Some("loc-1")).await;
    h.make_mapping(tenant, "item-1", "SKU-RED").await;
    h.platform.set_level("item-1", "loc-1", 7).await;
    h.platform
        .fail_next(stockbridge_core::platform::PlatformError::Transient("one".into()))
        .await;

    enqueue_webhook(
        &h,
        tenant,
        "inventory_levels/update",
        json!({ "inventory_item_id": "item-1" }),
    )
    .await;

    // First attempt fails, zero-delay retry succeeds on the second
    h.drain_queue().await;
    assert_eq!(h.queue.dead_letter_count().await.unwrap(), 0);
    let record = h.inventory.get(tenant, "SKU-RED").await.unwrap().unwrap();
    assert_eq!(record.quantity, 7);
}

#[tokio::test]
async fn stale_lease_is_recovered_and_completed() {
    let h = Harness::new().await;
    let tenant = h.make_tenant("shop-a.example.com", Some("loc-1")).await;
    h.make_mapping(tenant, "item-1", "SKU-RED").await;
    h.platform.set_level("item-1", "loc-1", 7).await;

    enqueue_webhook(
        &h,
        tenant,
        "inventory_levels/update",
        json!({ "inventory_item_id": "item-1" }),
    )
    .await;

    // Lease without acking, the way a worker that died mid-job would
    h.queue.lease().await.unwrap().unwrap();
    assert!(h.queue.lease().await.unwrap().is_none());
    assert_eq!(h.queue.depth().await.unwrap(), 0);

    let reclaimed = h
        .queue
        .reclaim_stale(std::time::Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(reclaimed, 1);

    h.drain_queue().await;
    let record = h.inventory.get(tenant, "SKU-RED").await.unwrap().unwrap();
    assert_eq!(record.quantity, 7);
}

#[tokio::test]
async fn reprocessing_the_same_payload_is_idempotent() {
    let h = Harness::new().await;
    let tenant = h.make_tenant("shop-a.example.com", Some("loc-1")).await;
    h.make_mapping(tenant, "item-1", "SKU-RED").await;
    h.platform.set_level("item-1", "loc-1", 7).await;

    let payload = json!({ "inventory_item_id": "item-1" });
    enqueue_webhook(&h, tenant, "inventory_levels/update", payload.clone()).await;
    enqueue_webhook(&h, tenant, "inventory_levels/update", payload).await;
    h.drain_queue().await;

    let record = h.inventory.get(tenant, "SKU-RED").await.unwrap().unwrap();
    assert_eq!(record.quantity, 7);

    let entries = h.audit.recent(tenant, 10).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.status == SyncStatus::Success));
}

#[tokio::test]
async fn product_delete_cascades_mapping_cleanup() {
    let h = Harness::new().await;
    let tenant = h.make_tenant("shop-a.example.com", Some("loc-1")).await;
    h.make_mapping(tenant, "item-1", "SKU-RED").await;

    enqueue_webhook(
        &h,
        tenant,
        "products/delete",
        json!({ "id": "product-for-item-1" }),
    )
    .await;
    h.drain_queue().await;

    assert!(h
        .mappings
        .find_by_inventory_item(tenant, "item-1")
        .await
        .unwrap()
        .is_none());

    let entries = h.audit.recent(tenant, 10).await.unwrap();
    assert_eq!(entries[0].status, SyncStatus::Success);
    assert_eq!(entries[0].message.as_deref(), Some("Removed 1 mapping(s)"));
}

#[tokio::test]
async fn uninstall_deactivates_and_later_jobs_skip() {
    let h = Harness::new().await;
    let tenant = h.make_tenant("shop-a.example.com", Some("loc-1")).await;
    h.make_mapping(tenant, "item-1", "SKU-RED").await;
    h.platform.set_level("item-1", "loc-1", 7).await;

    enqueue_webhook(&h, tenant, "app/uninstalled", json!({})).await;
    h.drain_queue().await;

    let model = h.tenants.find_by_uuid(tenant).await.unwrap().unwrap();
    assert!(!model.active);

    // Inventory jobs for the deactivated tenant are skipped, not failed
    enqueue_webhook(
        &h,
        tenant,
        "inventory_levels/update",
        json!({ "inventory_item_id": "item-1" }),
    )
    .await;
    h.drain_queue().await;

    assert!(h.inventory.get(tenant, "SKU-RED").await.unwrap().is_none());
    assert_eq!(h.queue.dead_letter_count().await.unwrap(), 0);
}

#[tokio::test]
async fn unknown_topic_is_acknowledged_and_skipped() {
    let h = Harness::new().await;
    let tenant = h.make_tenant("shop-a.example.com", Some("loc-1")).await;

    enqueue_webhook(&h, tenant, "orders/create", json!({ "id": 1 })).await;
    h.drain_queue().await;

    assert_eq!(h.queue.depth().await.unwrap(), 0);
    assert_eq!(h.queue.dead_letter_count().await.unwrap(), 0);
    let entries = h.audit.recent(tenant, 10).await.unwrap();
    assert_eq!(entries[0].status, SyncStatus::Skipped);
}

#[tokio::test]
async fn push_for_unmapped_sku_is_skipped() {
    let h = Harness::new().await;
    let tenant = h.make_tenant("shop-a.example.com", Some("loc-1")).await;

    let mut events = h.events.subscribe();
    h.inventory
        .set_quantity(tenant, "SKU-UNMAPPED", 5, Provenance::Internal)
        .await
        .unwrap();
    let event = events.recv().await.unwrap();
    h.outbound.handle_event(&event).await.unwrap();
    h.drain_queue().await;

    assert!(h.platform.recorded_sets().await.is_empty());
    let entries = h.audit.recent(tenant, 10).await.unwrap();
    assert_eq!(entries[0].status, SyncStatus::Skipped);
}
