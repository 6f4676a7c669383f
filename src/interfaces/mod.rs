//! Storage interfaces.
//!
//! Services depend on these traits (`Arc<dyn …>`); the SQLite
//! implementations live in [`crate::storage`].

mod access;
mod coupons;
mod ledger;
mod requests;
mod scans;

pub use access::AccessStore;
pub use coupons::{CouponStore, IssueReceipt, IssuedBatch};
pub use ledger::LedgerStore;
pub use requests::RequestStore;
pub use scans::ScanStore;
