//! Redemption scan records and receipts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::coupon::{CouponStatus, DiscountKind};

/// Outcome recorded on a scan row. Only `Success` rows count against a
/// coupon's usage limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Success,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
        }
    }
}

/// One validated redemption of a coupon by a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scan {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub coupon_code: String,
    pub customer_id: String,
    pub status: ScanStatus,
    pub location: Option<String>,
    pub device_info: Option<String>,
    pub scanned_at: DateTime<Utc>,
}

/// Caller-supplied context for a scan attempt.
#[derive(Debug, Clone, Default)]
pub struct ScanContext {
    /// When set, the coupon must belong to this verification app.
    pub verification_app_id: Option<Uuid>,
    pub location: Option<String>,
    pub device_info: Option<String>,
    /// Authenticated-customer path: additionally reject a repeat scan by
    /// this customer even before the global usage limit is reached.
    pub per_customer: bool,
}

/// Coupon fields echoed back to the scanning client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponSummary {
    pub code: String,
    pub discount_value: i64,
    pub discount_kind: DiscountKind,
    pub status: CouponStatus,
}

/// Result of a successful redemption: the scan record plus the reward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemReceipt {
    pub scan_id: Uuid,
    pub coupon: CouponSummary,
    pub points_awarded: i64,
    pub points_balance: i64,
}
