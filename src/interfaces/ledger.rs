//! Ledger storage interface.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{
    CreditBalance, CreditTransaction, LedgerReceipt, LedgerReference, PointsBalance,
    PointsTransaction,
};

/// Interface for the tenant credit ledger and the customer points ledger.
///
/// Both ledgers share the same contract: every mutation runs in a single
/// transaction that reads the balance under the write lock, rejects
/// overdraws, upserts the balance row, and appends an audit transaction
/// with before/after captured atomically. Any failure rolls back both
/// writes. The balance-row lock is the serialization point that prevents
/// concurrent overdraft.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Apply a signed credit delta to a tenant's balance.
    ///
    /// Fails with `InsufficientCredit` when a negative delta exceeds the
    /// current balance; the balance is never observably negative.
    async fn apply_credit_delta(
        &self,
        tenant_id: Uuid,
        delta: i64,
        reference: &LedgerReference,
    ) -> Result<LedgerReceipt>;

    /// Current credit balance; zero for tenants with no ledger activity.
    async fn credit_balance(&self, tenant_id: Uuid) -> Result<CreditBalance>;

    /// Full credit transaction log for a tenant, oldest first.
    async fn credit_transactions(&self, tenant_id: Uuid) -> Result<Vec<CreditTransaction>>;

    /// Apply a signed points delta to a customer's reward balance.
    ///
    /// Fails with `InsufficientPoints` on overdraw.
    async fn apply_points_delta(
        &self,
        tenant_id: Uuid,
        customer_id: &str,
        delta: i64,
        reference: &LedgerReference,
    ) -> Result<LedgerReceipt>;

    /// Current points balance; zero when the customer has none yet.
    async fn points_balance(&self, tenant_id: Uuid, customer_id: &str) -> Result<PointsBalance>;

    /// Full points transaction log for a customer, oldest first.
    async fn points_transactions(
        &self,
        tenant_id: Uuid,
        customer_id: &str,
    ) -> Result<Vec<PointsTransaction>>;
}
