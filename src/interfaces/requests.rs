//! Credit request storage interface.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{CreditRequest, LedgerReceipt};

/// Interface for credit request persistence and resolution.
///
/// A tenant may hold at most one pending request; the store enforces this
/// both by checking and by a partial unique index as the backstop.
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Insert a new pending request.
    ///
    /// Fails with `DuplicatePendingRequest` when a pending row already
    /// exists for the tenant.
    async fn create_request(
        &self,
        tenant_id: Uuid,
        amount: i64,
        justification: &str,
    ) -> Result<CreditRequest>;

    /// Approve a pending request: credits the ledger and marks the row
    /// approved in one transaction.
    ///
    /// Fails with `NotFound` when no pending row with that id exists.
    async fn approve_request(
        &self,
        request_id: Uuid,
        actor: &str,
    ) -> Result<(CreditRequest, LedgerReceipt)>;

    /// Reject a pending request with a reason; never touches the ledger.
    async fn reject_request(
        &self,
        request_id: Uuid,
        actor: &str,
        reason: &str,
    ) -> Result<CreditRequest>;

    async fn get_request(&self, request_id: Uuid) -> Result<CreditRequest>;

    /// All requests for a tenant, newest first.
    async fn list_requests(&self, tenant_id: Uuid) -> Result<Vec<CreditRequest>>;

    /// Operator work queue: every pending request across tenants.
    async fn list_pending(&self) -> Result<Vec<CreditRequest>>;
}
