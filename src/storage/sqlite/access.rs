//! SQLite verification app and product store.

use async_trait::async_trait;
use chrono::Utc;
use sea_query::{Expr, Query, SqliteQueryBuilder};
use sqlx::Row;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::interfaces::AccessStore;
use crate::model::{Product, VerificationApp};
use crate::storage::schema::{Products, VerificationApps};

use super::{parse_ts, SqliteStore};

fn app_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<VerificationApp> {
    Ok(VerificationApp {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        tenant_id: Uuid::parse_str(&row.get::<String, _>("tenant_id"))?,
        app_code: row.get("app_code"),
        active: row.get::<i64, _>("active") != 0,
        created_at: parse_ts(&row.get::<String, _>("created_at"))?,
    })
}

fn product_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Product> {
    Ok(Product {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        tenant_id: Uuid::parse_str(&row.get::<String, _>("tenant_id"))?,
        verification_app_id: Uuid::parse_str(&row.get::<String, _>("verification_app_id"))?,
        points_price: row.get("points_price"),
        active: row.get::<i64, _>("active") != 0,
        created_at: parse_ts(&row.get::<String, _>("created_at"))?,
    })
}

#[async_trait]
impl AccessStore for SqliteStore {
    async fn register_app(
        &self,
        tenant_id: Uuid,
        app_code: &str,
        api_key_hash: &str,
    ) -> Result<VerificationApp> {
        let app = VerificationApp {
            id: Uuid::new_v4(),
            tenant_id,
            app_code: app_code.to_string(),
            active: true,
            created_at: Utc::now(),
        };

        let insert = Query::insert()
            .into_table(VerificationApps::Table)
            .columns([
                VerificationApps::Id,
                VerificationApps::TenantId,
                VerificationApps::AppCode,
                VerificationApps::ApiKeyHash,
                VerificationApps::Active,
                VerificationApps::CreatedAt,
            ])
            .values_panic([
                app.id.to_string().into(),
                app.tenant_id.to_string().into(),
                app.app_code.clone().into(),
                api_key_hash.into(),
                1i64.into(),
                app.created_at.to_rfc3339().into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&insert).execute(self.pool()).await?;
        Ok(app)
    }

    async fn resolve_key(&self, api_key_hash: &str) -> Result<Option<VerificationApp>> {
        let query = Query::select()
            .columns([
                VerificationApps::Id,
                VerificationApps::TenantId,
                VerificationApps::AppCode,
                VerificationApps::Active,
                VerificationApps::CreatedAt,
            ])
            .from(VerificationApps::Table)
            .and_where(Expr::col(VerificationApps::ApiKeyHash).eq(api_key_hash))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(self.pool()).await?;
        row.as_ref().map(app_from_row).transpose()
    }

    async fn get_app(&self, app_id: Uuid) -> Result<Option<VerificationApp>> {
        let query = Query::select()
            .columns([
                VerificationApps::Id,
                VerificationApps::TenantId,
                VerificationApps::AppCode,
                VerificationApps::Active,
                VerificationApps::CreatedAt,
            ])
            .from(VerificationApps::Table)
            .and_where(Expr::col(VerificationApps::Id).eq(app_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(self.pool()).await?;
        row.as_ref().map(app_from_row).transpose()
    }

    async fn set_app_active(&self, app_id: Uuid, active: bool) -> Result<()> {
        let update = Query::update()
            .table(VerificationApps::Table)
            .value(VerificationApps::Active, i64::from(active))
            .and_where(Expr::col(VerificationApps::Id).eq(app_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&update).execute(self.pool()).await?;
        if result.rows_affected() == 0 {
            return Err(EngineError::not_found("verification app"));
        }
        Ok(())
    }

    async fn register_product(
        &self,
        tenant_id: Uuid,
        verification_app_id: Uuid,
        points_price: i64,
    ) -> Result<Product> {
        let product = Product {
            id: Uuid::new_v4(),
            tenant_id,
            verification_app_id,
            points_price,
            active: true,
            created_at: Utc::now(),
        };

        let insert = Query::insert()
            .into_table(Products::Table)
            .columns([
                Products::Id,
                Products::TenantId,
                Products::VerificationAppId,
                Products::PointsPrice,
                Products::Active,
                Products::CreatedAt,
            ])
            .values_panic([
                product.id.to_string().into(),
                product.tenant_id.to_string().into(),
                product.verification_app_id.to_string().into(),
                product.points_price.into(),
                1i64.into(),
                product.created_at.to_rfc3339().into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&insert).execute(self.pool()).await?;
        Ok(product)
    }

    async fn get_product(&self, tenant_id: Uuid, product_id: Uuid) -> Result<Option<Product>> {
        let query = Query::select()
            .columns([
                Products::Id,
                Products::TenantId,
                Products::VerificationAppId,
                Products::PointsPrice,
                Products::Active,
                Products::CreatedAt,
            ])
            .from(Products::Table)
            .and_where(Expr::col(Products::TenantId).eq(tenant_id.to_string()))
            .and_where(Expr::col(Products::Id).eq(product_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(self.pool()).await?;
        row.as_ref().map(product_from_row).transpose()
    }
}
