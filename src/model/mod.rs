//! Domain types for the coupon and credit ledger engine.

mod access;
mod coupon;
mod credit;
mod points;
mod scan;

pub use access::{AppContext, Principal, Product, Role, VerificationApp};
pub use coupon::{
    Coupon, CouponAction, CouponBatch, CouponStatus, DiscountKind, NewBatch,
};
pub use credit::{
    CreditBalance, CreditRequest, CreditTransaction, LedgerReceipt, LedgerReference,
    RequestStatus, TransactionKind, MIN_CREDIT_REQUEST,
};
pub use points::{PointsBalance, PointsTransaction};
pub use scan::{CouponSummary, RedeemReceipt, Scan, ScanContext, ScanStatus};
