//! Redemption entry point for session-authenticated callers.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::interfaces::ScanStore;
use crate::model::{RedeemReceipt, Scan, ScanContext};

pub struct RedemptionService {
    scans: Arc<dyn ScanStore>,
}

impl RedemptionService {
    pub fn new(scans: Arc<dyn ScanStore>) -> Self {
        Self { scans }
    }

    /// Validate and redeem a coupon for a customer.
    ///
    /// The tenant scope comes from the authenticated principal upstream;
    /// the engine performs no credential verification.
    pub async fn scan(
        &self,
        tenant_id: Uuid,
        code: &str,
        customer_id: &str,
        context: &ScanContext,
    ) -> Result<RedeemReceipt> {
        if code.trim().is_empty() {
            return Err(EngineError::validation("coupon code cannot be empty"));
        }
        if customer_id.trim().is_empty() {
            return Err(EngineError::validation("customer identity cannot be empty"));
        }

        let receipt = self.scans.redeem(tenant_id, code, customer_id, context).await?;
        info!(
            tenant_id = %tenant_id,
            code = %code,
            scan_id = %receipt.scan_id,
            points_awarded = receipt.points_awarded,
            "Coupon redeemed"
        );
        Ok(receipt)
    }

    /// Scan history for one coupon.
    pub async fn history(&self, tenant_id: Uuid, code: &str) -> Result<Vec<Scan>> {
        self.scans.scans_for_coupon(tenant_id, code).await
    }
}
