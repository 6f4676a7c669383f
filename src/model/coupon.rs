//! Coupon, batch, and the coupon lifecycle state machine.
//!
//! `CouponStatus::transition` is the only place a status change is decided.
//! Storage applies the returned status; nothing else writes the column.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

/// Lifecycle states of a coupon.
///
/// Transitions form a directed acyclic graph:
/// `Draft -> Printed -> Active -> {Used | Expired | Deactivated}`.
/// The last three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CouponStatus {
    Draft,
    Printed,
    Active,
    Used,
    Expired,
    Deactivated,
}

/// Actions that may move a coupon along the lifecycle graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouponAction {
    Print,
    Activate,
    Scan,
    Expire,
    Deactivate,
}

impl CouponStatus {
    /// Apply a lifecycle action, returning the next status or the precise
    /// violation. Centralizes every legality check.
    pub fn transition(self, action: CouponAction) -> Result<CouponStatus, EngineError> {
        match (self, action) {
            (Self::Draft, CouponAction::Print) => Ok(Self::Printed),
            (Self::Printed, CouponAction::Print) => Err(EngineError::AlreadyPrinted),
            (_, CouponAction::Print) => Err(EngineError::InvalidState {
                expected: Self::Draft.to_string(),
                actual: self.to_string(),
            }),

            (Self::Printed, CouponAction::Activate) => Ok(Self::Active),
            (Self::Draft, CouponAction::Activate) => Err(EngineError::MustPrintFirst),
            (_, CouponAction::Activate) => Err(EngineError::InvalidState {
                expected: Self::Printed.to_string(),
                actual: self.to_string(),
            }),

            (Self::Active, CouponAction::Scan) => Ok(Self::Used),
            (Self::Active, CouponAction::Expire) => Ok(Self::Expired),
            (Self::Active, CouponAction::Deactivate) => Ok(Self::Deactivated),
            (_, CouponAction::Scan | CouponAction::Expire | CouponAction::Deactivate) => {
                Err(EngineError::InvalidState {
                    expected: Self::Active.to_string(),
                    actual: self.to_string(),
                })
            }
        }
    }

    /// Whether the status is terminal (no outgoing transitions).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Used | Self::Expired | Self::Deactivated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Printed => "printed",
            Self::Active => "active",
            Self::Used => "used",
            Self::Expired => "expired",
            Self::Deactivated => "deactivated",
        }
    }

    pub fn parse(s: &str) -> Result<Self, EngineError> {
        match s {
            "draft" => Ok(Self::Draft),
            "printed" => Ok(Self::Printed),
            "active" => Ok(Self::Active),
            "used" => Ok(Self::Used),
            "expired" => Ok(Self::Expired),
            "deactivated" => Ok(Self::Deactivated),
            other => Err(EngineError::validation(format!(
                "unknown coupon status: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for CouponStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a coupon's discount is interpreted by the point of sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountKind {
    Fixed,
    Percent,
}

impl DiscountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Percent => "percent",
        }
    }

    pub fn parse(s: &str) -> Result<Self, EngineError> {
        match s {
            "fixed" => Ok(Self::Fixed),
            "percent" => Ok(Self::Percent),
            other => Err(EngineError::validation(format!(
                "unknown discount kind: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for DiscountKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A group of coupons created together, sharing discount and expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponBatch {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub verification_app_id: Uuid,
    pub description: String,
    pub discount_value: i64,
    pub discount_kind: DiscountKind,
    pub quantity: i64,
    pub expiry_date: DateTime<Utc>,
    pub printed_at: Option<DateTime<Utc>>,
    pub print_note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A single redeemable coupon. `code` is unique within its tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    pub tenant_id: Uuid,
    pub batch_id: Uuid,
    pub verification_app_id: Uuid,
    pub discount_value: i64,
    pub discount_kind: DiscountKind,
    pub status: CouponStatus,
    /// Maximum successful scans; 0 means unlimited.
    pub usage_limit: i64,
    /// Points awarded to the redeeming customer per successful scan.
    pub coupon_points: i64,
    pub expiry_date: DateTime<Utc>,
    pub deactivation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    /// Whether the stored expiry has passed at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date < now
    }

    /// Status as observed by readers: an `Active` coupon whose expiry has
    /// passed reports `Expired` even before the row is rewritten.
    pub fn effective_status(&self, now: DateTime<Utc>) -> CouponStatus {
        if self.status == CouponStatus::Active && self.is_expired_at(now) {
            CouponStatus::Expired
        } else {
            self.status
        }
    }
}

/// Parameters for minting one batch of coupons.
#[derive(Debug, Clone)]
pub struct NewBatch {
    pub description: String,
    pub discount_value: i64,
    pub discount_kind: DiscountKind,
    pub quantity: i64,
    pub expiry_date: DateTime<Utc>,
    pub usage_limit: i64,
    pub coupon_points: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let printed = CouponStatus::Draft.transition(CouponAction::Print).unwrap();
        assert_eq!(printed, CouponStatus::Printed);
        let active = printed.transition(CouponAction::Activate).unwrap();
        assert_eq!(active, CouponStatus::Active);
        assert_eq!(
            active.transition(CouponAction::Scan).unwrap(),
            CouponStatus::Used
        );
        assert_eq!(
            active.transition(CouponAction::Expire).unwrap(),
            CouponStatus::Expired
        );
        assert_eq!(
            active.transition(CouponAction::Deactivate).unwrap(),
            CouponStatus::Deactivated
        );
    }

    #[test]
    fn test_print_twice_is_already_printed() {
        let err = CouponStatus::Printed
            .transition(CouponAction::Print)
            .unwrap_err();
        assert!(matches!(err, EngineError::AlreadyPrinted));
    }

    #[test]
    fn test_activate_from_draft_is_must_print_first() {
        let err = CouponStatus::Draft
            .transition(CouponAction::Activate)
            .unwrap_err();
        assert!(matches!(err, EngineError::MustPrintFirst));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for status in [
            CouponStatus::Used,
            CouponStatus::Expired,
            CouponStatus::Deactivated,
        ] {
            assert!(status.is_terminal());
            for action in [
                CouponAction::Print,
                CouponAction::Activate,
                CouponAction::Scan,
                CouponAction::Expire,
                CouponAction::Deactivate,
            ] {
                assert!(status.transition(action).is_err());
            }
        }
    }

    #[test]
    fn test_effective_status_reports_expiry() {
        let now = Utc::now();
        let coupon = Coupon {
            code: "AB12CD34EF56".to_string(),
            tenant_id: Uuid::new_v4(),
            batch_id: Uuid::new_v4(),
            verification_app_id: Uuid::new_v4(),
            discount_value: 50,
            discount_kind: DiscountKind::Fixed,
            status: CouponStatus::Active,
            usage_limit: 1,
            coupon_points: 0,
            expiry_date: now - chrono::Duration::days(1),
            deactivation_reason: None,
            created_at: now,
        };
        assert_eq!(coupon.effective_status(now), CouponStatus::Expired);
        assert_eq!(coupon.status, CouponStatus::Active);
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            CouponStatus::Draft,
            CouponStatus::Printed,
            CouponStatus::Active,
            CouponStatus::Used,
            CouponStatus::Expired,
            CouponStatus::Deactivated,
        ] {
            assert_eq!(CouponStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(CouponStatus::parse("bogus").is_err());
    }
}
