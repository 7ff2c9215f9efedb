//! Sync health heuristic and audit retention behavior.

mod helpers;

use helpers::Harness;
use pretty_assertions::assert_eq;
use stockbridge_core::audit::{EntityKind, LogEntry, SyncHealth, SyncOperation, SyncStatus};
use stockbridge_core::store::SyncDirection;
use uuid::Uuid;

fn entry(tenant_id: Uuid, status: SyncStatus) -> LogEntry {
    LogEntry {
        tenant_id,
        entity_kind: EntityKind::Inventory,
        operation: SyncOperation::Sync,
        direction: Some(SyncDirection::Pull),
        status,
        external_id: Some("item-1".into()),
        internal_sku: Some("SKU-RED".into()),
        message: None,
        payload: None,
        duration_ms: Some(3),
    }
}

async fn record_many(h: &Harness, tenant: Uuid, status: SyncStatus, count: usize) {
    for _ in 0..count {
        h.audit.record(entry(tenant, status)).await.unwrap();
    }
}

#[tokio::test]
async fn errors_below_half_stay_healthy() {
    let h = Harness::new().await;
    let tenant = Uuid::new_v4();

    record_many(&h, tenant, SyncStatus::Success, 12).await;
    record_many(&h, tenant, SyncStatus::Error, 8).await;

    assert_eq!(h.audit.sync_health(tenant).await.unwrap(), SyncHealth::Healthy);
}

#[tokio::test]
async fn errors_above_half_mark_degraded() {
    let h = Harness::new().await;
    let tenant = Uuid::new_v4();

    record_many(&h, tenant, SyncStatus::Success, 4).await;
    record_many(&h, tenant, SyncStatus::Error, 6).await;

    assert_eq!(
        h.audit.sync_health(tenant).await.unwrap(),
        SyncHealth::Degraded
    );
}

#[tokio::test]
async fn exactly_half_is_not_degraded() {
    let h = Harness::new().await;
    let tenant = Uuid::new_v4();

    record_many(&h, tenant, SyncStatus::Success, 5).await;
    record_many(&h, tenant, SyncStatus::Error, 5).await;

    assert_eq!(h.audit.sync_health(tenant).await.unwrap(), SyncHealth::Healthy);
}

#[tokio::test]
async fn small_samples_never_degrade() {
    let h = Harness::new().await;
    let tenant = Uuid::new_v4();

    // All errors, but below the minimum sample size
    record_many(&h, tenant, SyncStatus::Error, 4).await;

    assert_eq!(h.audit.sync_health(tenant).await.unwrap(), SyncHealth::Healthy);
}

#[tokio::test]
async fn health_window_ignores_older_entries() {
    let h = Harness::new().await;
    let tenant = Uuid::new_v4();

    // Old error burst fully displaced by 20 newer successes
    record_many(&h, tenant, SyncStatus::Error, 25).await;
    record_many(&h, tenant, SyncStatus::Success, 20).await;

    assert_eq!(h.audit.sync_health(tenant).await.unwrap(), SyncHealth::Healthy);
}

#[tokio::test]
async fn health_is_scoped_per_tenant() {
    let h = Harness::new().await;
    let failing = Uuid::new_v4();
    let fine = Uuid::new_v4();

    record_many(&h, failing, SyncStatus::Error, 10).await;
    record_many(&h, fine, SyncStatus::Success, 10).await;

    assert_eq!(
        h.audit.sync_health(failing).await.unwrap(),
        SyncHealth::Degraded
    );
    assert_eq!(h.audit.sync_health(fine).await.unwrap(), SyncHealth::Healthy);
}

#[tokio::test]
async fn prune_respects_the_retention_cutoff() {
    let h = Harness::new().await;
    let tenant = Uuid::new_v4();

    record_many(&h, tenant, SyncStatus::Success, 3).await;

    // Everything is newer than a 30-day cutoff
    assert_eq!(h.audit.prune_older_than(30).await.unwrap(), 0);
    assert_eq!(h.audit.recent(tenant, 10).await.unwrap().len(), 3);

    // A zero-day cutoff makes every existing entry prunable
    assert_eq!(h.audit.prune_older_than(0).await.unwrap(), 3);
    assert!(h.audit.recent(tenant, 10).await.unwrap().is_empty());
}
