//! Credit request workflow.
//!
//! Tenants request additional prepaid credit; a platform operator approves
//! (crediting the ledger) or rejects. Resolutions emit fire-and-forget
//! notifications through the outbox.

use std::sync::Arc;

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::interfaces::{LedgerStore, RequestStore};
use crate::model::{
    CreditBalance, CreditRequest, CreditTransaction, LedgerReceipt, Principal,
    MIN_CREDIT_REQUEST,
};
use crate::notify::{Notification, NotificationOutbox};

use super::{require_operator, require_tenant};

pub struct CreditRequestService {
    requests: Arc<dyn RequestStore>,
    ledger: Arc<dyn LedgerStore>,
    outbox: Arc<NotificationOutbox>,
}

impl CreditRequestService {
    pub fn new(
        requests: Arc<dyn RequestStore>,
        ledger: Arc<dyn LedgerStore>,
        outbox: Arc<NotificationOutbox>,
    ) -> Self {
        Self {
            requests,
            ledger,
            outbox,
        }
    }

    /// A tenant's current credit balance.
    pub async fn balance(&self, principal: &Principal) -> Result<CreditBalance> {
        let tenant_id = require_tenant(principal)?;
        self.ledger.credit_balance(tenant_id).await
    }

    /// A tenant's full credit transaction log, oldest first.
    pub async fn transactions(&self, principal: &Principal) -> Result<Vec<CreditTransaction>> {
        let tenant_id = require_tenant(principal)?;
        self.ledger.credit_transactions(tenant_id).await
    }

    /// Create a pending request for additional credit.
    ///
    /// Only a tenant-scoped actor may request; the platform operator
    /// grants, it does not ask.
    pub async fn request_credits(
        &self,
        principal: &Principal,
        amount: i64,
        justification: &str,
    ) -> Result<CreditRequest> {
        let tenant_id = require_tenant(principal)?;

        if amount <= 0 {
            return Err(EngineError::InvalidAmount);
        }
        if amount < MIN_CREDIT_REQUEST {
            return Err(EngineError::BelowMinimum {
                minimum: MIN_CREDIT_REQUEST,
                got: amount,
            });
        }

        let request = self
            .requests
            .create_request(tenant_id, amount, justification)
            .await?;
        info!(tenant_id = %tenant_id, request_id = %request.id, amount = amount, "Credit request created");
        Ok(request)
    }

    /// Approve a pending request, crediting the tenant's ledger.
    pub async fn approve(
        &self,
        principal: &Principal,
        request_id: Uuid,
    ) -> Result<(CreditRequest, LedgerReceipt)> {
        require_operator(principal)?;

        let (request, receipt) = self
            .requests
            .approve_request(request_id, &principal.user_id.to_string())
            .await?;

        info!(
            request_id = %request.id,
            tenant_id = %request.tenant_id,
            balance_after = receipt.balance_after,
            "Credit request approved"
        );

        self.outbox
            .dispatch(Notification::new(
                "credit_request.approved",
                json!({
                    "request_id": request.id,
                    "tenant_id": request.tenant_id,
                    "amount": request.requested_amount,
                    "balance_after": receipt.balance_after,
                }),
            ))
            .await;

        Ok((request, receipt))
    }

    /// Reject a pending request with a non-empty reason; the ledger is
    /// untouched.
    pub async fn reject(
        &self,
        principal: &Principal,
        request_id: Uuid,
        reason: &str,
    ) -> Result<CreditRequest> {
        require_operator(principal)?;

        if reason.trim().is_empty() {
            return Err(EngineError::validation("rejection reason cannot be empty"));
        }

        let request = self
            .requests
            .reject_request(request_id, &principal.user_id.to_string(), reason)
            .await?;

        info!(request_id = %request.id, tenant_id = %request.tenant_id, "Credit request rejected");

        self.outbox
            .dispatch(Notification::new(
                "credit_request.rejected",
                json!({
                    "request_id": request.id,
                    "tenant_id": request.tenant_id,
                    "reason": reason,
                }),
            ))
            .await;

        Ok(request)
    }

    pub async fn get_request(&self, request_id: Uuid) -> Result<CreditRequest> {
        self.requests.get_request(request_id).await
    }

    /// A tenant's own request history; operators may list any tenant's.
    pub async fn list_requests(
        &self,
        principal: &Principal,
        tenant_id: Uuid,
    ) -> Result<Vec<CreditRequest>> {
        if require_operator(principal).is_err() && require_tenant(principal)? != tenant_id {
            return Err(EngineError::Forbidden);
        }
        self.requests.list_requests(tenant_id).await
    }

    /// Operator work queue of pending requests across all tenants.
    pub async fn list_pending(&self, principal: &Principal) -> Result<Vec<CreditRequest>> {
        require_operator(principal)?;
        self.requests.list_pending().await
    }
}
