//! External access gate tests: key resolution, cross-app defense, and
//! product redemption against points.

mod common;

use common::{batch_with, operator, setup, tenant_principal};
use uuid::Uuid;

use tally::interfaces::{AccessStore, LedgerStore, ScanStore};
use tally::model::{Principal, TransactionKind};
use tally::EngineError;

/// Register an app through the gate and return (app, plaintext key).
async fn gate_app(
    h: &common::Harness,
    tenant: Uuid,
    code: &str,
) -> (tally::model::VerificationApp, String) {
    h.access_gate()
        .register_app(&operator(), tenant, code)
        .await
        .unwrap()
}

/// Issue, print, and activate one batch under the given app.
async fn active_coupon_for_app(
    h: &common::Harness,
    principal: &Principal,
    tenant: Uuid,
    app_id: Uuid,
    coupon_points: i64,
) -> String {
    let receipt = h
        .issuance()
        .create_batch(principal, app_id, batch_with(50, 1, 1, coupon_points))
        .await
        .unwrap();
    let batch_id = receipt.batches[0].batch.id;
    let lifecycle = h.lifecycle();
    lifecycle.print_batch(principal, batch_id, None).await.unwrap();
    lifecycle.activate_batch(principal, batch_id).await.unwrap();
    receipt.batches[0].coupons[0].code.clone()
}

#[tokio::test]
async fn test_register_and_resolve_api_key() {
    let h = setup().await;
    let gate = h.access_gate();
    let tenant = Uuid::new_v4();

    // Registration is operator-scoped.
    let err = gate
        .register_app(&tenant_principal(tenant), tenant, "mobile")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden));

    let (app, key) = gate_app(&h, tenant, "mobile").await;
    assert!(key.starts_with("tk_"));

    let ctx = gate.resolve(&key).await.unwrap();
    assert_eq!(ctx.verification_app_id, app.id);
    assert_eq!(ctx.tenant_id, tenant);
    assert_eq!(ctx.app_code, "mobile");

    // Only the hash is stored.
    let stored = h.store.get_app(app.id).await.unwrap().unwrap();
    assert_eq!(stored.app_code, "mobile");
}

#[tokio::test]
async fn test_unknown_key_is_unauthorized() {
    let h = setup().await;
    let err = h.access_gate().resolve("tk_bogus").await.unwrap_err();
    assert!(matches!(err, EngineError::Unauthorized));
}

#[tokio::test]
async fn test_inactive_app_is_forbidden() {
    let h = setup().await;
    let gate = h.access_gate();
    let tenant = Uuid::new_v4();
    let (app, key) = gate_app(&h, tenant, "mobile").await;

    gate.set_app_active(&operator(), app.id, false).await.unwrap();
    let err = gate.resolve(&key).await.unwrap_err();
    assert!(matches!(err, EngineError::Forbidden));

    gate.set_app_active(&operator(), app.id, true).await.unwrap();
    gate.resolve(&key).await.unwrap();
}

#[tokio::test]
async fn test_gate_scan_checks_app_ownership() {
    let h = setup().await;
    let gate = h.access_gate();
    let tenant = Uuid::new_v4();
    let principal = tenant_principal(tenant);
    h.seed_credits(tenant, 10_000).await;

    let (app_a, key_a) = gate_app(&h, tenant, "app-a").await;
    let (_app_b, key_b) = gate_app(&h, tenant, "app-b").await;

    let code = active_coupon_for_app(&h, &principal, tenant, app_a.id, 5).await;

    // A sibling app of the same tenant must not redeem app A's coupon.
    let err = gate
        .scan(&key_b, &code, "cust-1", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CrossAppAccess));

    let receipt = gate
        .scan(&key_a, &code, "cust-1", Some("store 7".to_string()), None)
        .await
        .unwrap();
    assert_eq!(receipt.points_awarded, 5);

    let scans = h.store.scans_for_coupon(tenant, &code).await.unwrap();
    assert_eq!(scans.len(), 1);
    assert_eq!(scans[0].location.as_deref(), Some("store 7"));
}

#[tokio::test]
async fn test_gate_scan_is_per_customer() {
    let h = setup().await;
    let gate = h.access_gate();
    let tenant = Uuid::new_v4();
    let principal = tenant_principal(tenant);
    h.seed_credits(tenant, 10_000).await;

    let (app, key) = gate_app(&h, tenant, "mobile").await;

    // Unlimited coupon, but the mobile path still rejects a repeat by the
    // same customer.
    let receipt = h
        .issuance()
        .create_batch(&principal, app.id, batch_with(50, 1, 0, 0))
        .await
        .unwrap();
    let batch_id = receipt.batches[0].batch.id;
    let lifecycle = h.lifecycle();
    lifecycle.print_batch(&principal, batch_id, None).await.unwrap();
    lifecycle.activate_batch(&principal, batch_id).await.unwrap();
    let code = receipt.batches[0].coupons[0].code.clone();

    gate.scan(&key, &code, "cust-1", None, None).await.unwrap();
    let err = gate.scan(&key, &code, "cust-1", None, None).await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadyUsed));
    gate.scan(&key, &code, "cust-2", None, None).await.unwrap();
}

#[tokio::test]
async fn test_product_redemption_spends_points() {
    let h = setup().await;
    let gate = h.access_gate();
    let tenant = Uuid::new_v4();
    let principal = tenant_principal(tenant);
    h.seed_credits(tenant, 10_000).await;

    let (app, key) = gate_app(&h, tenant, "shop").await;
    let code = active_coupon_for_app(&h, &principal, tenant, app.id, 50).await;
    gate.scan(&key, &code, "cust-1", None, None).await.unwrap();

    let product = h
        .store
        .register_product(tenant, app.id, 30)
        .await
        .unwrap();

    let receipt = gate.redeem_product(&key, "cust-1", product.id).await.unwrap();
    assert_eq!(receipt.balance_before, 50);
    assert_eq!(receipt.balance_after, 20);

    let transactions = h.store.points_transactions(tenant, "cust-1").await.unwrap();
    let debit = transactions
        .iter()
        .find(|t| t.kind == TransactionKind::Debit)
        .unwrap();
    assert_eq!(debit.amount, 30);
    assert_eq!(debit.reference_kind, "product_redemption");
    assert_eq!(debit.reference_id, Some(product.id));

    // Spending more than the balance is rejected.
    let pricey = h
        .store
        .register_product(tenant, app.id, 100)
        .await
        .unwrap();
    let err = gate.redeem_product(&key, "cust-1", pricey.id).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::InsufficientPoints {
            balance: 20,
            required: 100
        }
    ));

    let balance = gate.points_balance(&key, "cust-1").await.unwrap();
    assert_eq!(balance.balance, 20);
}

#[tokio::test]
async fn test_product_redemption_checks_app_ownership() {
    let h = setup().await;
    let gate = h.access_gate();
    let tenant = Uuid::new_v4();
    let principal = tenant_principal(tenant);
    h.seed_credits(tenant, 10_000).await;

    let (app_a, key_a) = gate_app(&h, tenant, "app-a").await;
    let (app_b, _key_b) = gate_app(&h, tenant, "app-b").await;

    // Give the customer a points balance under app A.
    let code = active_coupon_for_app(&h, &principal, tenant, app_a.id, 50).await;
    gate.scan(&key_a, &code, "cust-1", None, None).await.unwrap();

    let err = gate
        .redeem_product(&key_a, "cust-1", Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));

    // A product registered under app B is out of app A's scope.
    let foreign = h
        .store
        .register_product(tenant, app_b.id, 10)
        .await
        .unwrap();
    let err = gate
        .redeem_product(&key_a, "cust-1", foreign.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CrossAppAccess));

    let balance = h.store.points_balance(tenant, "cust-1").await.unwrap();
    assert_eq!(balance.balance, 50, "failed redemptions never touch the balance");
}
