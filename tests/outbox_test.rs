//! Outbox tests: delivery, failure retention, recovery, and the retry cap.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use tally::notify::{
    spawn_recovery_task, Notification, NotificationOutbox, Notifier, NotifyError, OutboxConfig,
};

/// Fails the first `failures` deliveries, then succeeds; counts attempts.
struct FlakyNotifier {
    failures: u32,
    attempts: AtomicU32,
}

impl FlakyNotifier {
    fn new(failures: u32) -> Self {
        Self {
            failures,
            attempts: AtomicU32::new(0),
        }
    }

    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for FlakyNotifier {
    async fn deliver(&self, _notification: &Notification) -> Result<(), NotifyError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            Err(NotifyError::Status { code: 503 })
        } else {
            Ok(())
        }
    }
}

fn outbox_with(
    pool: sqlx::SqlitePool,
    notifier: Arc<dyn Notifier>,
    config: OutboxConfig,
) -> NotificationOutbox {
    NotificationOutbox::new(pool, notifier, config)
}

#[tokio::test]
async fn test_successful_dispatch_leaves_nothing_behind() {
    let h = common::setup().await;

    h.outbox
        .dispatch(Notification::new("test.event", json!({"n": 1})))
        .await;

    let delivered = h.notifier.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].kind, "test.event");
    assert_eq!(h.outbox.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_failed_delivery_is_retained_and_recovered() {
    let h = common::setup().await;
    let notifier = Arc::new(FlakyNotifier::new(1));
    let outbox = outbox_with(
        h.store.pool().clone(),
        notifier.clone(),
        OutboxConfig {
            orphan_age_secs: 0,
            ..OutboxConfig::default()
        },
    );
    outbox.init().await.unwrap();

    // First delivery fails; the notification stays in the outbox.
    outbox
        .dispatch(Notification::new("test.event", json!({"n": 2})))
        .await;
    assert_eq!(outbox.pending_count().await.unwrap(), 1);
    assert_eq!(notifier.attempts(), 1);

    // Recovery re-attempts and succeeds.
    let recovered = outbox.recover_orphaned().await.unwrap();
    assert_eq!(recovered, 1);
    assert_eq!(outbox.pending_count().await.unwrap(), 0);
    assert_eq!(notifier.attempts(), 2);
}

#[tokio::test]
async fn test_retry_cap_stops_recovery_attempts() {
    let h = common::setup().await;
    let notifier = Arc::new(FlakyNotifier::new(u32::MAX));
    let outbox = outbox_with(
        h.store.pool().clone(),
        notifier.clone(),
        OutboxConfig {
            max_retries: 2,
            orphan_age_secs: 0,
            ..OutboxConfig::default()
        },
    );
    outbox.init().await.unwrap();

    outbox
        .dispatch(Notification::new("test.event", json!({"n": 3})))
        .await;
    assert_eq!(notifier.attempts(), 1);

    // Two recovery rounds consume the retry budget.
    assert_eq!(outbox.recover_orphaned().await.unwrap(), 0);
    assert_eq!(outbox.recover_orphaned().await.unwrap(), 0);
    assert_eq!(notifier.attempts(), 3);

    // The exhausted row is no longer attempted but remains for audit.
    assert_eq!(outbox.recover_orphaned().await.unwrap(), 0);
    assert_eq!(notifier.attempts(), 3);
    assert_eq!(outbox.pending_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_background_recovery_task_drains_outbox() {
    let h = common::setup().await;
    let notifier = Arc::new(FlakyNotifier::new(1));
    let outbox = Arc::new(outbox_with(
        h.store.pool().clone(),
        notifier.clone(),
        OutboxConfig {
            orphan_age_secs: 0,
            recovery_interval_secs: 1,
            ..OutboxConfig::default()
        },
    ));
    outbox.init().await.unwrap();

    outbox
        .dispatch(Notification::new("test.event", json!({"n": 4})))
        .await;
    assert_eq!(outbox.pending_count().await.unwrap(), 1);

    let handle = spawn_recovery_task(outbox.clone(), 1);
    tokio::time::sleep(std::time::Duration::from_millis(2500)).await;
    assert_eq!(outbox.pending_count().await.unwrap(), 0);
    handle.stop();
}

#[tokio::test]
async fn test_recovered_notification_round_trips_payload() {
    let h = common::setup().await;
    let failing = Arc::new(FlakyNotifier::new(1));
    let outbox = outbox_with(
        h.store.pool().clone(),
        failing.clone(),
        OutboxConfig {
            orphan_age_secs: 0,
            ..OutboxConfig::default()
        },
    );
    outbox.init().await.unwrap();

    let original = Notification::new("batch.printed", json!({"batch_id": "b-1", "count": 6}));
    let original_id = original.id;
    outbox.dispatch(original).await;

    // Swap in a collector sharing the same outbox table to observe what
    // recovery replays.
    let collector = Arc::new(tally::notify::MemoryNotifier::new());
    let recovering = outbox_with(
        h.store.pool().clone(),
        collector.clone(),
        OutboxConfig {
            orphan_age_secs: 0,
            ..OutboxConfig::default()
        },
    );
    assert_eq!(recovering.recover_orphaned().await.unwrap(), 1);

    let replayed = collector.delivered();
    assert_eq!(replayed.len(), 1);
    assert_eq!(replayed[0].id, original_id);
    assert_eq!(replayed[0].kind, "batch.printed");
    assert_eq!(replayed[0].payload, json!({"batch_id": "b-1", "count": 6}));
}
