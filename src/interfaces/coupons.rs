//! Coupon storage interface: issuance and lifecycle transitions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::model::{Coupon, CouponBatch, CouponStatus, LedgerReceipt, NewBatch};

/// One issued batch with its minted coupons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedBatch {
    pub batch: CouponBatch,
    pub coupons: Vec<Coupon>,
}

/// Outcome of an issuance call: the batches created and the single debit
/// that paid for all of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueReceipt {
    pub batches: Vec<IssuedBatch>,
    pub total_cost: i64,
    pub ledger: LedgerReceipt,
}

/// Interface for coupon batch issuance and lifecycle persistence.
#[async_trait]
pub trait CouponStore: Send + Sync {
    /// Debit `total_cost` and create every batch's coupons in one
    /// transaction. A debit never survives without its coupons and vice
    /// versa; `InsufficientCredit` propagates with no rows created.
    async fn issue(
        &self,
        tenant_id: Uuid,
        verification_app_id: Uuid,
        batches: &[NewBatch],
        total_cost: i64,
        created_by: &str,
    ) -> Result<IssueReceipt>;

    /// Transition a whole batch `draft -> printed`, all-or-nothing.
    ///
    /// Returns the number of coupons printed. Fails with `AlreadyPrinted`
    /// or `InvalidState` (leaving every member untouched) when any member
    /// is not in draft.
    async fn print_batch(
        &self,
        tenant_id: Uuid,
        batch_id: Uuid,
        note: Option<&str>,
    ) -> Result<u64>;

    /// Transition a whole batch `printed -> active`, all-or-nothing.
    ///
    /// Fails with `MustPrintFirst` when any member is still draft.
    async fn activate_batch(&self, tenant_id: Uuid, batch_id: Uuid) -> Result<u64>;

    /// Terminally deactivate a single active coupon; the reason is stored
    /// for audit.
    async fn deactivate(&self, tenant_id: Uuid, code: &str, reason: &str) -> Result<Coupon>;

    async fn get_coupon(&self, tenant_id: Uuid, code: &str) -> Result<Coupon>;

    async fn get_batch(&self, tenant_id: Uuid, batch_id: Uuid) -> Result<CouponBatch>;

    /// Coupons of one batch in stable (code-ascending) order.
    async fn list_by_batch(&self, tenant_id: Uuid, batch_id: Uuid) -> Result<Vec<Coupon>>;

    /// Coupons whose *effective* status matches: an active coupon past its
    /// expiry is reported as expired even before the row is rewritten.
    async fn list_by_status(&self, tenant_id: Uuid, status: CouponStatus)
        -> Result<Vec<Coupon>>;
}
