//! Customer reward-points ledger types.
//!
//! Points are a secondary currency earned on successful redemptions and
//! spent on product rewards. The ledger carries the same before/after
//! auditability invariant as the tenant credit ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::credit::TransactionKind;

/// Reward balance for one customer identity within one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsBalance {
    pub tenant_id: Uuid,
    pub customer_id: String,
    pub balance: i64,
    pub total_earned: i64,
    pub total_spent: i64,
    pub last_updated: DateTime<Utc>,
}

impl PointsBalance {
    pub fn empty(tenant_id: Uuid, customer_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            tenant_id,
            customer_id: customer_id.to_string(),
            balance: 0,
            total_earned: 0,
            total_spent: 0,
            last_updated: now,
        }
    }
}

/// Append-only audit record of one points-balance mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsTransaction {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub customer_id: String,
    pub kind: TransactionKind,
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub reference_id: Option<Uuid>,
    pub reference_kind: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}
