//! Coupon batch issuance.
//!
//! Computes the credit cost of a batch, verifies the verification app,
//! and delegates the atomic debit-plus-mint to the coupon store. The cost
//! function is deterministic and previewable so tenants can check a batch
//! before committing credit.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::interfaces::{AccessStore, CouponStore, IssueReceipt};
use crate::model::{Coupon, CouponBatch, CouponStatus, NewBatch, Principal};

use super::require_tenant;

/// Credit cost of a batch: discount value per coupon times quantity.
/// Monotonic in both inputs.
pub fn credit_cost(discount_value: i64, quantity: i64) -> i64 {
    discount_value * quantity
}

pub struct IssuanceService {
    coupons: Arc<dyn CouponStore>,
    access: Arc<dyn AccessStore>,
}

impl IssuanceService {
    pub fn new(coupons: Arc<dyn CouponStore>, access: Arc<dyn AccessStore>) -> Self {
        Self { coupons, access }
    }

    /// Cost a batch would debit, without touching the ledger.
    pub fn preview_cost(&self, batches: &[NewBatch]) -> i64 {
        batches
            .iter()
            .map(|b| credit_cost(b.discount_value, b.quantity))
            .sum()
    }

    /// Issue one batch of draft coupons, debiting its cost.
    pub async fn create_batch(
        &self,
        principal: &Principal,
        verification_app_id: Uuid,
        batch: NewBatch,
    ) -> Result<IssueReceipt> {
        self.create_multi_batch(principal, verification_app_id, vec![batch])
            .await
    }

    /// Issue several batches at once: every batch is validated up front,
    /// the sum of all costs is debited as a single ledger operation, and
    /// all coupons are created in one transaction. Any validation failure
    /// fails the whole call with no partial issuance and no partial debit.
    pub async fn create_multi_batch(
        &self,
        principal: &Principal,
        verification_app_id: Uuid,
        batches: Vec<NewBatch>,
    ) -> Result<IssueReceipt> {
        let tenant_id = require_tenant(principal)?;

        if batches.is_empty() {
            return Err(EngineError::validation("at least one batch is required"));
        }
        for batch in &batches {
            validate_batch(batch)?;
        }

        let app = self
            .access
            .get_app(verification_app_id)
            .await?
            .filter(|app| app.tenant_id == tenant_id)
            .ok_or_else(|| EngineError::not_found("verification app"))?;

        let total_cost = self.preview_cost(&batches);
        let receipt = self
            .coupons
            .issue(
                tenant_id,
                app.id,
                &batches,
                total_cost,
                &principal.user_id.to_string(),
            )
            .await?;

        info!(
            tenant_id = %tenant_id,
            batches = receipt.batches.len(),
            total_cost = total_cost,
            balance_after = receipt.ledger.balance_after,
            "Coupon batches issued"
        );
        Ok(receipt)
    }

    pub async fn get_coupon(&self, principal: &Principal, code: &str) -> Result<Coupon> {
        let tenant_id = require_tenant(principal)?;
        self.coupons.get_coupon(tenant_id, code).await
    }

    pub async fn get_batch(&self, principal: &Principal, batch_id: Uuid) -> Result<CouponBatch> {
        let tenant_id = require_tenant(principal)?;
        self.coupons.get_batch(tenant_id, batch_id).await
    }

    pub async fn list_by_batch(
        &self,
        principal: &Principal,
        batch_id: Uuid,
    ) -> Result<Vec<Coupon>> {
        let tenant_id = require_tenant(principal)?;
        self.coupons.list_by_batch(tenant_id, batch_id).await
    }

    pub async fn list_by_status(
        &self,
        principal: &Principal,
        status: CouponStatus,
    ) -> Result<Vec<Coupon>> {
        let tenant_id = require_tenant(principal)?;
        self.coupons.list_by_status(tenant_id, status).await
    }

    /// Textual export of a batch's coupons, one row per coupon in stable
    /// code order.
    pub async fn export_batch_csv(
        &self,
        principal: &Principal,
        batch_id: Uuid,
    ) -> Result<String> {
        let tenant_id = require_tenant(principal)?;
        let batch = self.coupons.get_batch(tenant_id, batch_id).await?;
        let coupons = self.coupons.list_by_batch(tenant_id, batch_id).await?;
        let now = Utc::now();

        let mut csv = String::from("Reference,Code,Discount Value,Discount Type,Status,Expiry Date\n");
        for coupon in &coupons {
            csv.push_str(&format!(
                "{},{},{},{},{},{}\n",
                batch.id,
                coupon.code,
                coupon.discount_value,
                coupon.discount_kind,
                coupon.effective_status(now),
                coupon.expiry_date.format("%Y-%m-%d"),
            ));
        }
        Ok(csv)
    }
}

fn validate_batch(batch: &NewBatch) -> Result<()> {
    if batch.quantity <= 0 {
        return Err(EngineError::validation("quantity must be positive"));
    }
    if batch.discount_value <= 0 {
        return Err(EngineError::validation("discount value must be positive"));
    }
    if batch.expiry_date <= Utc::now() {
        return Err(EngineError::validation("expiry date must be in the future"));
    }
    if batch.usage_limit < 0 {
        return Err(EngineError::validation("usage limit cannot be negative"));
    }
    if batch.coupon_points < 0 {
        return Err(EngineError::validation("coupon points cannot be negative"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credit_cost_matches_unit_times_quantity() {
        assert_eq!(credit_cost(50, 6), 300);
        assert_eq!(credit_cost(1, 1), 1);
    }

    #[test]
    fn test_credit_cost_is_monotonic() {
        assert!(credit_cost(50, 7) > credit_cost(50, 6));
        assert!(credit_cost(51, 6) > credit_cost(50, 6));
    }
}
