//! External access gate.
//!
//! Resolves API keys to a `(tenant, verification app)` scope for mobile and
//! e-commerce callers that hold no session. Every operation through the
//! gate re-verifies that referenced coupons and products belong to the
//! resolved pair before touching the ledgers.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::interfaces::{AccessStore, CouponStore, LedgerStore, ScanStore};
use crate::model::{
    AppContext, LedgerReceipt, LedgerReference, PointsBalance, Principal, RedeemReceipt,
    ScanContext, VerificationApp,
};

use super::require_operator;

/// SHA-256 hex digest of an API key; the only form the store ever sees.
pub fn hash_api_key(api_key: &str) -> String {
    hex::encode(Sha256::digest(api_key.as_bytes()))
}

pub struct AccessGate {
    access: Arc<dyn AccessStore>,
    coupons: Arc<dyn CouponStore>,
    scans: Arc<dyn ScanStore>,
    ledger: Arc<dyn LedgerStore>,
}

impl AccessGate {
    pub fn new(
        access: Arc<dyn AccessStore>,
        coupons: Arc<dyn CouponStore>,
        scans: Arc<dyn ScanStore>,
        ledger: Arc<dyn LedgerStore>,
    ) -> Self {
        Self {
            access,
            coupons,
            scans,
            ledger,
        }
    }

    /// Register a verification app for a tenant. Returns the app and the
    /// plaintext API key, which is never recoverable afterwards.
    pub async fn register_app(
        &self,
        principal: &Principal,
        tenant_id: Uuid,
        app_code: &str,
    ) -> Result<(VerificationApp, String)> {
        require_operator(principal)?;

        if app_code.trim().is_empty() {
            return Err(EngineError::validation("app code cannot be empty"));
        }

        let api_key = format!("tk_{}", Uuid::new_v4().simple());
        let app = self
            .access
            .register_app(tenant_id, app_code, &hash_api_key(&api_key))
            .await?;

        info!(tenant_id = %tenant_id, app_id = %app.id, app_code = %app_code, "Verification app registered");
        Ok((app, api_key))
    }

    /// Enable or disable an app.
    pub async fn set_app_active(
        &self,
        principal: &Principal,
        app_id: Uuid,
        active: bool,
    ) -> Result<()> {
        require_operator(principal)?;
        self.access.set_app_active(app_id, active).await
    }

    /// Resolve an API key to its app scope.
    ///
    /// Fails `Unauthorized` for unknown keys and `Forbidden` for inactive
    /// apps.
    pub async fn resolve(&self, api_key: &str) -> Result<AppContext> {
        let app = self
            .access
            .resolve_key(&hash_api_key(api_key))
            .await?
            .ok_or(EngineError::Unauthorized)?;

        if !app.active {
            return Err(EngineError::Forbidden);
        }

        Ok(AppContext {
            verification_app_id: app.id,
            tenant_id: app.tenant_id,
            app_code: app.app_code,
        })
    }

    /// Redeem a coupon through the gate.
    ///
    /// The coupon must belong to the resolved app; a coupon of a sibling
    /// app in the same tenant fails `CrossAppAccess` before the redemption
    /// transaction starts, and the scan context re-checks inside it.
    pub async fn scan(
        &self,
        api_key: &str,
        code: &str,
        customer_id: &str,
        location: Option<String>,
        device_info: Option<String>,
    ) -> Result<RedeemReceipt> {
        let ctx = self.resolve(api_key).await?;

        let coupon = self.coupons.get_coupon(ctx.tenant_id, code).await?;
        if coupon.verification_app_id != ctx.verification_app_id {
            return Err(EngineError::CrossAppAccess);
        }

        let scan_context = ScanContext {
            verification_app_id: Some(ctx.verification_app_id),
            location,
            device_info,
            per_customer: true,
        };
        self.scans
            .redeem(ctx.tenant_id, code, customer_id, &scan_context)
            .await
    }

    /// Spend customer points on a product reward.
    pub async fn redeem_product(
        &self,
        api_key: &str,
        customer_id: &str,
        product_id: Uuid,
    ) -> Result<LedgerReceipt> {
        let ctx = self.resolve(api_key).await?;

        let product = self
            .access
            .get_product(ctx.tenant_id, product_id)
            .await?
            .filter(|p| p.active)
            .ok_or_else(|| EngineError::not_found("product"))?;

        if product.verification_app_id != ctx.verification_app_id {
            return Err(EngineError::CrossAppAccess);
        }

        let reference = LedgerReference::new(
            Some(product.id),
            "product_redemption",
            format!("redeem product {}", product.id),
            customer_id,
        );
        let receipt = self
            .ledger
            .apply_points_delta(
                ctx.tenant_id,
                customer_id,
                -product.points_price,
                &reference,
            )
            .await?;

        info!(
            tenant_id = %ctx.tenant_id,
            product_id = %product.id,
            points = product.points_price,
            balance_after = receipt.balance_after,
            "Product redeemed against points"
        );
        Ok(receipt)
    }

    /// Customer points balance within the app's tenant.
    pub async fn points_balance(&self, api_key: &str, customer_id: &str) -> Result<PointsBalance> {
        let ctx = self.resolve(api_key).await?;
        self.ledger.points_balance(ctx.tenant_id, customer_id).await
    }
}
