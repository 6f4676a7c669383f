//! Tenant credit ledger types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

/// Minimum amount a tenant may request in one credit request.
pub const MIN_CREDIT_REQUEST: i64 = 100;

/// Direction of a ledger transaction. Amounts are always stored positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionKind {
    Credit,
    Debit,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "CREDIT",
            Self::Debit => "DEBIT",
        }
    }

    pub fn parse(s: &str) -> Result<Self, EngineError> {
        match s {
            "CREDIT" => Ok(Self::Credit),
            "DEBIT" => Ok(Self::Debit),
            other => Err(EngineError::validation(format!(
                "unknown transaction kind: {other}"
            ))),
        }
    }
}

/// One tenant's prepaid credit balance.
///
/// `balance == total_received - total_spent` holds at all times; the row is
/// created lazily on the first credit event and mutated only through
/// [`crate::interfaces::LedgerStore::apply_credit_delta`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditBalance {
    pub tenant_id: Uuid,
    pub balance: i64,
    pub total_received: i64,
    pub total_spent: i64,
    pub last_updated: DateTime<Utc>,
}

impl CreditBalance {
    /// A zero balance for tenants with no ledger activity yet.
    pub fn empty(tenant_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            tenant_id,
            balance: 0,
            total_received: 0,
            total_spent: 0,
            last_updated: now,
        }
    }
}

/// Append-only audit record of one balance mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub kind: TransactionKind,
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub reference_id: Option<Uuid>,
    pub reference_kind: String,
    pub description: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// What a ledger mutation was for, recorded on the transaction row.
#[derive(Debug, Clone)]
pub struct LedgerReference {
    pub id: Option<Uuid>,
    pub kind: String,
    pub description: String,
    pub actor: String,
}

impl LedgerReference {
    pub fn new(
        id: Option<Uuid>,
        kind: impl Into<String>,
        description: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            id,
            kind: kind.into(),
            description: description.into(),
            actor: actor.into(),
        }
    }
}

/// Outcome of a committed ledger mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    pub transaction_id: Uuid,
    pub balance_before: i64,
    pub balance_after: i64,
}

/// Lifecycle of a tenant-initiated credit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Result<Self, EngineError> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(EngineError::validation(format!(
                "unknown request status: {other}"
            ))),
        }
    }
}

/// A tenant's request for additional prepaid credit, resolved by a platform
/// operator. At most one pending request may exist per tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditRequest {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub requested_amount: i64,
    pub justification: String,
    pub status: RequestStatus,
    pub requested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub processed_by: Option<String>,
    pub rejection_reason: Option<String>,
}
