//! Redemption tests: validation order, usage limits, points award,
//! lazy expiry, and the concurrent single-use race.

mod common;

use std::sync::Arc;

use common::{batch_with, force_expiry, setup, tenant_principal};
use tokio::sync::Barrier;
use uuid::Uuid;

use tally::interfaces::{AccessStore, CouponStore, LedgerStore, ScanStore};
use tally::model::{CouponStatus, Principal, ScanContext, ScanStatus};
use tally::EngineError;

/// Issue, print, and activate one batch; returns its coupon codes.
async fn active_coupons(
    h: &common::Harness,
    principal: &Principal,
    tenant: Uuid,
    quantity: i64,
    usage_limit: i64,
    coupon_points: i64,
) -> Vec<String> {
    h.seed_credits(tenant, 10_000).await;
    let app = h
        .store
        .register_app(tenant, "pos", &format!("hash-{}", Uuid::new_v4()))
        .await
        .unwrap();
    let receipt = h
        .issuance()
        .create_batch(
            principal,
            app.id,
            batch_with(50, quantity, usage_limit, coupon_points),
        )
        .await
        .unwrap();
    let batch_id = receipt.batches[0].batch.id;

    let lifecycle = h.lifecycle();
    lifecycle.print_batch(principal, batch_id, None).await.unwrap();
    lifecycle.activate_batch(principal, batch_id).await.unwrap();

    receipt.batches[0]
        .coupons
        .iter()
        .map(|c| c.code.clone())
        .collect()
}

#[tokio::test]
async fn test_successful_scan_awards_points_and_marks_used() {
    let h = setup().await;
    let redemption = h.redemption();
    let tenant = Uuid::new_v4();
    let principal = tenant_principal(tenant);
    let codes = active_coupons(&h, &principal, tenant, 1, 1, 10).await;

    let receipt = redemption
        .scan(tenant, &codes[0], "cust-1", &ScanContext::default())
        .await
        .unwrap();
    assert_eq!(receipt.points_awarded, 10);
    assert_eq!(receipt.points_balance, 10);
    assert_eq!(receipt.coupon.status, CouponStatus::Used);

    let stored = h.store.get_coupon(tenant, &codes[0]).await.unwrap();
    assert_eq!(stored.status, CouponStatus::Used);

    let scans = redemption.history(tenant, &codes[0]).await.unwrap();
    assert_eq!(scans.len(), 1);
    assert_eq!(scans[0].status, ScanStatus::Success);
    assert_eq!(scans[0].customer_id, "cust-1");

    let balance = h.store.points_balance(tenant, "cust-1").await.unwrap();
    assert_eq!(balance.balance, 10);
    let transactions = h.store.points_transactions(tenant, "cust-1").await.unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].reference_id, Some(receipt.scan_id));
}

#[tokio::test]
async fn test_single_use_coupon_rejects_second_scan() {
    let h = setup().await;
    let redemption = h.redemption();
    let tenant = Uuid::new_v4();
    let principal = tenant_principal(tenant);
    let codes = active_coupons(&h, &principal, tenant, 1, 1, 0).await;

    redemption
        .scan(tenant, &codes[0], "cust-1", &ScanContext::default())
        .await
        .unwrap();

    // Single-use is global: a different customer is rejected too.
    let err = redemption
        .scan(tenant, &codes[0], "cust-2", &ScanContext::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyUsed));

    let scans = redemption.history(tenant, &codes[0]).await.unwrap();
    assert_eq!(scans.len(), 1, "the rejected scan leaves no row");
}

#[tokio::test]
async fn test_parallel_scans_yield_exactly_one_success() {
    let h = setup().await;
    let tenant = Uuid::new_v4();
    let principal = tenant_principal(tenant);
    let codes = active_coupons(&h, &principal, tenant, 1, 1, 5).await;
    let code = codes[0].clone();

    // Scenario E: race N scans on the same single-use code.
    let num_concurrent = 5;
    let barrier = Arc::new(Barrier::new(num_concurrent));
    let mut handles = Vec::new();
    for i in 0..num_concurrent {
        let store = h.store.clone();
        let barrier = Arc::clone(&barrier);
        let code = code.clone();
        handles.push(tokio::spawn(async move {
            let customer = format!("cust-{i}");
            barrier.wait().await;
            store
                .redeem(tenant, &code, &customer, &ScanContext::default())
                .await
        }));
    }

    let mut successes = 0;
    let mut already_used = 0;
    for result in futures::future::join_all(handles).await {
        match result.unwrap() {
            Ok(_) => successes += 1,
            Err(EngineError::AlreadyUsed) => already_used += 1,
            Err(e) => panic!("unexpected error: {e:?}"),
        }
    }
    assert_eq!(successes, 1, "exactly one scan must win");
    assert_eq!(already_used, num_concurrent - 1);

    let scans = h.store.scans_for_coupon(tenant, &code).await.unwrap();
    assert_eq!(scans.len(), 1);
}

#[tokio::test]
async fn test_expired_coupon_fails_and_is_lazily_marked() {
    let h = setup().await;
    let redemption = h.redemption();
    let tenant = Uuid::new_v4();
    let principal = tenant_principal(tenant);
    let codes = active_coupons(&h, &principal, tenant, 1, 1, 10).await;

    // Scenario F: active coupon whose expiry was yesterday.
    force_expiry(&h.store, tenant, &codes[0]).await;

    let err = redemption
        .scan(tenant, &codes[0], "cust-1", &ScanContext::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CouponExpired));

    let stored = h.store.get_coupon(tenant, &codes[0]).await.unwrap();
    assert_eq!(stored.status, CouponStatus::Expired);

    // Nothing else happened: no scan row, no points.
    assert!(redemption.history(tenant, &codes[0]).await.unwrap().is_empty());
    let balance = h.store.points_balance(tenant, "cust-1").await.unwrap();
    assert_eq!(balance.balance, 0);
}

#[tokio::test]
async fn test_lifecycle_gates_redemption() {
    let h = setup().await;
    let redemption = h.redemption();
    let tenant = Uuid::new_v4();
    let principal = tenant_principal(tenant);

    let err = redemption
        .scan(tenant, "NOSUCHCODE", "cust-1", &ScanContext::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CouponNotFound));

    // A draft (never printed/activated) coupon is not scannable.
    h.seed_credits(tenant, 10_000).await;
    let app = h.store.register_app(tenant, "pos", "hash-j").await.unwrap();
    let receipt = h
        .issuance()
        .create_batch(&principal, app.id, batch_with(50, 1, 1, 0))
        .await
        .unwrap();
    let code = receipt.batches[0].coupons[0].code.clone();

    let err = redemption
        .scan(tenant, &code, "cust-1", &ScanContext::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::CouponNotActive {
            status: CouponStatus::Draft
        }
    ));

    // Deactivated coupons are rejected the same way.
    let batch_id = receipt.batches[0].batch.id;
    let lifecycle = h.lifecycle();
    lifecycle.print_batch(&principal, batch_id, None).await.unwrap();
    lifecycle.activate_batch(&principal, batch_id).await.unwrap();
    lifecycle.deactivate(&principal, &code, "lost").await.unwrap();

    let err = redemption
        .scan(tenant, &code, "cust-1", &ScanContext::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::CouponNotActive {
            status: CouponStatus::Deactivated
        }
    ));
}

#[tokio::test]
async fn test_multi_use_limit_and_terminal_used() {
    let h = setup().await;
    let redemption = h.redemption();
    let tenant = Uuid::new_v4();
    let principal = tenant_principal(tenant);
    let codes = active_coupons(&h, &principal, tenant, 1, 3, 2).await;
    let code = &codes[0];

    for i in 0..3 {
        redemption
            .scan(tenant, code, &format!("cust-{i}"), &ScanContext::default())
            .await
            .unwrap();
    }

    // The third scan reached the limit and marked the coupon used.
    let stored = h.store.get_coupon(tenant, code).await.unwrap();
    assert_eq!(stored.status, CouponStatus::Used);

    let err = redemption
        .scan(tenant, code, "cust-9", &ScanContext::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UsageLimitExceeded { limit: 3 }));

    let scans = redemption.history(tenant, code).await.unwrap();
    assert_eq!(scans.len(), 3);
}

#[tokio::test]
async fn test_unlimited_coupon_stays_active() {
    let h = setup().await;
    let redemption = h.redemption();
    let tenant = Uuid::new_v4();
    let principal = tenant_principal(tenant);
    let codes = active_coupons(&h, &principal, tenant, 1, 0, 5).await;
    let code = &codes[0];

    for i in 0..4 {
        redemption
            .scan(tenant, code, &format!("cust-{i}"), &ScanContext::default())
            .await
            .unwrap();
    }

    let stored = h.store.get_coupon(tenant, code).await.unwrap();
    assert_eq!(stored.status, CouponStatus::Active);

    // Points accumulate per customer across scans.
    redemption
        .scan(tenant, code, "cust-0", &ScanContext::default())
        .await
        .unwrap();
    let balance = h.store.points_balance(tenant, "cust-0").await.unwrap();
    assert_eq!(balance.balance, 10);
}

#[tokio::test]
async fn test_per_customer_policy_rejects_repeat_scans() {
    let h = setup().await;
    let redemption = h.redemption();
    let tenant = Uuid::new_v4();
    let principal = tenant_principal(tenant);
    let codes = active_coupons(&h, &principal, tenant, 1, 0, 0).await;
    let code = &codes[0];

    let context = ScanContext {
        per_customer: true,
        ..ScanContext::default()
    };

    redemption.scan(tenant, code, "cust-1", &context).await.unwrap();

    // Even on an unlimited coupon, the authenticated-customer path rejects
    // a repeat by the same customer.
    let err = redemption
        .scan(tenant, code, "cust-1", &context)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyUsed));

    // Another customer still passes.
    redemption.scan(tenant, code, "cust-2", &context).await.unwrap();
}

#[tokio::test]
async fn test_app_context_mismatch_rejected() {
    let h = setup().await;
    let redemption = h.redemption();
    let tenant = Uuid::new_v4();
    let principal = tenant_principal(tenant);
    let codes = active_coupons(&h, &principal, tenant, 1, 1, 0).await;

    let context = ScanContext {
        verification_app_id: Some(Uuid::new_v4()),
        ..ScanContext::default()
    };
    let err = redemption
        .scan(tenant, &codes[0], "cust-1", &context)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AppMismatch));

    // The rejected attempt left nothing behind.
    assert!(redemption.history(tenant, &codes[0]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_tenant_isolation() {
    let h = setup().await;
    let redemption = h.redemption();
    let tenant = Uuid::new_v4();
    let principal = tenant_principal(tenant);
    let codes = active_coupons(&h, &principal, tenant, 1, 1, 0).await;

    // The same code does not resolve under another tenant.
    let err = redemption
        .scan(Uuid::new_v4(), &codes[0], "cust-1", &ScanContext::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CouponNotFound));
}
