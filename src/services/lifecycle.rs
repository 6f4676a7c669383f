//! Coupon lifecycle operations: print, activate, deactivate.

use std::sync::Arc;

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::interfaces::CouponStore;
use crate::model::{Coupon, Principal};
use crate::notify::{Notification, NotificationOutbox};

use super::require_tenant;

pub struct LifecycleService {
    coupons: Arc<dyn CouponStore>,
    outbox: Arc<NotificationOutbox>,
}

impl LifecycleService {
    pub fn new(coupons: Arc<dyn CouponStore>, outbox: Arc<NotificationOutbox>) -> Self {
        Self { coupons, outbox }
    }

    /// Print a whole batch. Every coupon must be draft; returns the count
    /// printed.
    pub async fn print_batch(
        &self,
        principal: &Principal,
        batch_id: Uuid,
        note: Option<&str>,
    ) -> Result<u64> {
        let tenant_id = require_tenant(principal)?;
        let count = self.coupons.print_batch(tenant_id, batch_id, note).await?;

        info!(tenant_id = %tenant_id, batch_id = %batch_id, count = count, "Batch printed");
        self.outbox
            .dispatch(Notification::new(
                "batch.printed",
                json!({
                    "tenant_id": tenant_id,
                    "batch_id": batch_id,
                    "count": count,
                }),
            ))
            .await;
        Ok(count)
    }

    /// Activate a whole printed batch.
    pub async fn activate_batch(&self, principal: &Principal, batch_id: Uuid) -> Result<u64> {
        let tenant_id = require_tenant(principal)?;
        let count = self.coupons.activate_batch(tenant_id, batch_id).await?;

        info!(tenant_id = %tenant_id, batch_id = %batch_id, count = count, "Batch activated");
        self.outbox
            .dispatch(Notification::new(
                "batch.activated",
                json!({
                    "tenant_id": tenant_id,
                    "batch_id": batch_id,
                    "count": count,
                }),
            ))
            .await;
        Ok(count)
    }

    /// Terminally deactivate a single active coupon; the reason is stored
    /// for audit.
    pub async fn deactivate(
        &self,
        principal: &Principal,
        code: &str,
        reason: &str,
    ) -> Result<Coupon> {
        let tenant_id = require_tenant(principal)?;

        if reason.trim().is_empty() {
            return Err(EngineError::validation(
                "deactivation reason cannot be empty",
            ));
        }

        let coupon = self.coupons.deactivate(tenant_id, code, reason).await?;
        info!(tenant_id = %tenant_id, code = %code, "Coupon deactivated");
        Ok(coupon)
    }
}
