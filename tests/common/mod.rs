//! Shared test harness: tempfile-backed SQLite store, in-memory notifier,
//! and service constructors.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use tempfile::TempDir;
use uuid::Uuid;

use tally::interfaces::LedgerStore;
use tally::model::{DiscountKind, LedgerReference, NewBatch, Principal};
use tally::notify::{MemoryNotifier, NotificationOutbox, OutboxConfig};
use tally::services::{
    AccessGate, CreditRequestService, IssuanceService, LifecycleService, RedemptionService,
};
use tally::storage::{init_storage, SqliteStore, StorageConfig};

pub struct Harness {
    pub store: Arc<SqliteStore>,
    pub outbox: Arc<NotificationOutbox>,
    pub notifier: Arc<MemoryNotifier>,
    _dir: TempDir,
}

pub async fn setup() -> Harness {
    let dir = tempfile::tempdir().expect("create temp dir");
    let config = StorageConfig {
        storage_type: "sqlite".to_string(),
        path: dir
            .path()
            .join("tally.db")
            .to_string_lossy()
            .into_owned(),
        busy_timeout_secs: 5,
    };
    let store = init_storage(&config).await.expect("init storage");

    let notifier = Arc::new(MemoryNotifier::new());
    let outbox = Arc::new(NotificationOutbox::new(
        store.pool().clone(),
        notifier.clone(),
        OutboxConfig::default(),
    ));
    outbox.init().await.expect("init outbox");

    Harness {
        store,
        outbox,
        notifier,
        _dir: dir,
    }
}

impl Harness {
    pub fn credit_requests(&self) -> CreditRequestService {
        CreditRequestService::new(self.store.clone(), self.store.clone(), self.outbox.clone())
    }

    pub fn issuance(&self) -> IssuanceService {
        IssuanceService::new(self.store.clone(), self.store.clone())
    }

    pub fn lifecycle(&self) -> LifecycleService {
        LifecycleService::new(self.store.clone(), self.outbox.clone())
    }

    pub fn redemption(&self) -> RedemptionService {
        RedemptionService::new(self.store.clone())
    }

    pub fn access_gate(&self) -> AccessGate {
        AccessGate::new(
            self.store.clone(),
            self.store.clone(),
            self.store.clone(),
            self.store.clone(),
        )
    }

    /// Seed a tenant's credit balance directly through the ledger.
    pub async fn seed_credits(&self, tenant_id: Uuid, amount: i64) {
        let reference = LedgerReference::new(None, "seed", "test seed", "test");
        self.store
            .apply_credit_delta(tenant_id, amount, &reference)
            .await
            .expect("seed credits");
    }
}

/// A batch of plain fixed-discount coupons expiring tomorrow.
pub fn batch(discount_value: i64, quantity: i64) -> NewBatch {
    NewBatch {
        description: "test batch".to_string(),
        discount_value,
        discount_kind: DiscountKind::Fixed,
        quantity,
        expiry_date: Utc::now() + Duration::days(1),
        usage_limit: 1,
        coupon_points: 0,
    }
}

/// Like [`batch`] but with a usage limit and per-scan points.
pub fn batch_with(
    discount_value: i64,
    quantity: i64,
    usage_limit: i64,
    coupon_points: i64,
) -> NewBatch {
    NewBatch {
        usage_limit,
        coupon_points,
        ..batch(discount_value, quantity)
    }
}

pub fn operator() -> Principal {
    Principal::operator(Uuid::new_v4())
}

pub fn tenant_principal(tenant_id: Uuid) -> Principal {
    Principal::tenant(Uuid::new_v4(), tenant_id)
}

/// Rewrite a coupon's expiry date behind the store's back, simulating a
/// coupon that aged past its expiry while active.
pub async fn force_expiry(store: &SqliteStore, tenant_id: Uuid, code: &str) {
    let yesterday = (Utc::now() - Duration::days(1)).to_rfc3339();
    sqlx::query("UPDATE coupons SET expiry_date = ? WHERE tenant_id = ? AND code = ?")
        .bind(yesterday)
        .bind(tenant_id.to_string())
        .bind(code)
        .execute(store.pool())
        .await
        .expect("force expiry");
}

/// Rewrite a single coupon's status behind the store's back, creating the
/// mixed-state batches the atomicity tests need.
pub async fn force_status(store: &SqliteStore, tenant_id: Uuid, code: &str, status: &str) {
    sqlx::query("UPDATE coupons SET status = ? WHERE tenant_id = ? AND code = ?")
        .bind(status)
        .bind(tenant_id.to_string())
        .bind(code)
        .execute(store.pool())
        .await
        .expect("force status");
}
