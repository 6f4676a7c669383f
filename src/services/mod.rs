//! Component services.
//!
//! Services orchestrate the storage traits, gate operations on principal
//! role, and emit notifications through the outbox. They hold `Arc<dyn …>`
//! store handles so callers can wire any backend.

mod access;
mod credit_requests;
mod issuance;
mod lifecycle;
mod redemption;

pub use access::AccessGate;
pub use credit_requests::CreditRequestService;
pub use issuance::{credit_cost, IssuanceService};
pub use lifecycle::LifecycleService;
pub use redemption::RedemptionService;

use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::model::{Principal, Role};

/// Require a platform operator.
pub(crate) fn require_operator(principal: &Principal) -> Result<()> {
    if principal.role == Role::Operator {
        Ok(())
    } else {
        Err(EngineError::Forbidden)
    }
}

/// Require a tenant-scoped actor and return its tenant id.
pub(crate) fn require_tenant(principal: &Principal) -> Result<Uuid> {
    match (principal.role, principal.tenant_id) {
        (Role::Tenant, Some(tenant_id)) => Ok(tenant_id),
        _ => Err(EngineError::Forbidden),
    }
}
