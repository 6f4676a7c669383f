//! Principals, verification apps, and external-access context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of an authenticated principal, as resolved by the auth collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Platform operator; approves credit requests, manages apps.
    Operator,
    /// Tenant-scoped actor; requests credits, issues and manages coupons.
    Tenant,
}

/// Authenticated caller identity. Credential verification happens upstream;
/// the engine only gates operations on role and tenant scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub role: Role,
}

impl Principal {
    pub fn operator(user_id: Uuid) -> Self {
        Self {
            user_id,
            tenant_id: None,
            role: Role::Operator,
        }
    }

    pub fn tenant(user_id: Uuid, tenant_id: Uuid) -> Self {
        Self {
            user_id,
            tenant_id: Some(tenant_id),
            role: Role::Tenant,
        }
    }
}

/// An external mobile/e-commerce integration point. API keys are stored
/// only as SHA-256 digests; the plaintext key is returned once at
/// registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationApp {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub app_code: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Scope resolved from an API key; every operation through the external
/// access gate re-verifies references against this pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppContext {
    pub verification_app_id: Uuid,
    pub tenant_id: Uuid,
    pub app_code: String,
}

/// A product redeemable against customer points. Catalog attributes beyond
/// ownership and price are opaque to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub verification_app_id: Uuid,
    pub points_price: i64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}
