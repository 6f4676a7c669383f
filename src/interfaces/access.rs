//! Verification app and product storage interface.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{Product, VerificationApp};

/// Interface for API-key-scoped app resolution and the minimal product
/// references the access gate validates ownership against.
#[async_trait]
pub trait AccessStore: Send + Sync {
    /// Register a verification app. Only the SHA-256 digest of the API key
    /// is persisted.
    async fn register_app(
        &self,
        tenant_id: Uuid,
        app_code: &str,
        api_key_hash: &str,
    ) -> Result<VerificationApp>;

    /// Look up the app owning a key digest; `None` when unknown.
    async fn resolve_key(&self, api_key_hash: &str) -> Result<Option<VerificationApp>>;

    /// Look up an app by id; `None` when absent.
    async fn get_app(&self, app_id: Uuid) -> Result<Option<VerificationApp>>;

    /// Enable or disable an app. Inactive apps fail gate resolution.
    async fn set_app_active(&self, app_id: Uuid, active: bool) -> Result<()>;

    /// Register a product redeemable against points within one app's scope.
    async fn register_product(
        &self,
        tenant_id: Uuid,
        verification_app_id: Uuid,
        points_price: i64,
    ) -> Result<Product>;

    /// Look up a product within a tenant; `None` when absent.
    async fn get_product(&self, tenant_id: Uuid, product_id: Uuid) -> Result<Option<Product>>;
}
