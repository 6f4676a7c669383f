//! Tally - Coupon & Credit Ledger Engine
//!
//! Multi-tenant loyalty core: tenants spend a prepaid credit balance to
//! mint coupon batches, coupons move through a print/activate/redeem
//! lifecycle, and successful redemptions award customer points from a
//! parallel ledger. Every balance mutation is backed by an append-only
//! transaction log.

pub mod config;
pub mod error;
pub mod interfaces;
pub mod model;
pub mod notify;
pub mod services;
pub mod storage;
pub mod utils;

pub use error::{EngineError, Result};
