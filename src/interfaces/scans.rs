//! Redemption storage interface.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{RedeemReceipt, Scan, ScanContext};

/// Interface for the redemption transaction.
#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Validate and redeem a coupon in one transaction holding the write
    /// lock: lifecycle/expiry/usage-limit checks, the scan insert, the
    /// points award, and the used-marking commit or roll back together.
    ///
    /// Concurrent redemptions of the same coupon serialize on the lock;
    /// exactly one can observe an under-limit active coupon.
    async fn redeem(
        &self,
        tenant_id: Uuid,
        code: &str,
        customer_id: &str,
        context: &ScanContext,
    ) -> Result<RedeemReceipt>;

    /// Scan history for one coupon, oldest first.
    async fn scans_for_coupon(&self, tenant_id: Uuid, code: &str) -> Result<Vec<Scan>>;
}
