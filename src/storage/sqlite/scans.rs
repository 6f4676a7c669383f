//! SQLite redemption implementation.
//!
//! The whole redemption — validation, scan insert, used-marking, points
//! award — runs in one `BEGIN IMMEDIATE` transaction. Concurrent scans of
//! the same coupon serialize on the write lock, so exactly one can observe
//! an under-limit active coupon.

use async_trait::async_trait;
use chrono::Utc;
use sea_query::{Expr, Order, Query, SqliteQueryBuilder};
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::interfaces::ScanStore;
use crate::model::{
    Coupon, CouponAction, CouponStatus, CouponSummary, LedgerReference, RedeemReceipt, Scan,
    ScanContext, ScanStatus,
};
use crate::storage::schema::{Coupons, PointsBalances, Scans};

use super::coupons::coupon_from_row;
use super::ledger::apply_points_delta_tx;
use super::{parse_ts, SqliteStore};

/// Internal outcome of the in-transaction redemption body.
enum RedeemOutcome {
    Redeemed(RedeemReceipt),
    /// The coupon was observed expired; the lazy status write must commit
    /// even though the scan is rejected.
    LazyExpired,
}

async fn fetch_coupon_tx(
    conn: &mut SqliteConnection,
    tenant_id: Uuid,
    code: &str,
) -> Result<Option<Coupon>> {
    let query = Query::select()
        .columns(super::coupons::COUPON_COLUMNS)
        .from(Coupons::Table)
        .and_where(Expr::col(Coupons::TenantId).eq(tenant_id.to_string()))
        .and_where(Expr::col(Coupons::Code).eq(code))
        .to_string(SqliteQueryBuilder);

    let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
    row.as_ref().map(coupon_from_row).transpose()
}

async fn set_coupon_status(
    conn: &mut SqliteConnection,
    tenant_id: Uuid,
    code: &str,
    status: CouponStatus,
) -> Result<()> {
    let update = Query::update()
        .table(Coupons::Table)
        .value(Coupons::Status, status.as_str())
        .and_where(Expr::col(Coupons::TenantId).eq(tenant_id.to_string()))
        .and_where(Expr::col(Coupons::Code).eq(code))
        .to_string(SqliteQueryBuilder);
    sqlx::query(&update).execute(&mut *conn).await?;
    Ok(())
}

/// Count prior successful scans; optionally only this customer's.
async fn count_success_scans(
    conn: &mut SqliteConnection,
    tenant_id: Uuid,
    code: &str,
    customer_id: Option<&str>,
) -> Result<i64> {
    let sql = {
        let mut query = Query::select()
            .expr(Expr::col(Scans::Id).count())
            .from(Scans::Table)
            .and_where(Expr::col(Scans::TenantId).eq(tenant_id.to_string()))
            .and_where(Expr::col(Scans::CouponCode).eq(code))
            .and_where(Expr::col(Scans::Status).eq(ScanStatus::Success.as_str()))
            .to_owned();
        if let Some(customer) = customer_id {
            query.and_where(Expr::col(Scans::CustomerId).eq(customer));
        }
        query.to_string(SqliteQueryBuilder)
    };

    let row = sqlx::query(&sql).fetch_one(&mut *conn).await?;
    Ok(row.get::<i64, _>(0))
}

async fn redeem_tx(
    conn: &mut SqliteConnection,
    tenant_id: Uuid,
    code: &str,
    customer_id: &str,
    context: &ScanContext,
) -> Result<RedeemOutcome> {
    let now = Utc::now();

    let coupon = fetch_coupon_tx(conn, tenant_id, code)
        .await?
        .ok_or(EngineError::CouponNotFound)?;

    if let Some(app_id) = context.verification_app_id {
        if coupon.verification_app_id != app_id {
            return Err(EngineError::AppMismatch);
        }
    }

    match coupon.status {
        CouponStatus::Active => {}
        // A used coupon reports the usage violation, not a generic state
        // error: the loser of a single-use race must see AlreadyUsed.
        CouponStatus::Used if coupon.usage_limit == 1 => return Err(EngineError::AlreadyUsed),
        CouponStatus::Used => {
            return Err(EngineError::UsageLimitExceeded {
                limit: coupon.usage_limit,
            })
        }
        status => return Err(EngineError::CouponNotActive { status }),
    }

    if coupon.is_expired_at(now) {
        set_coupon_status(conn, tenant_id, code, CouponStatus::Expired).await?;
        return Ok(RedeemOutcome::LazyExpired);
    }

    let success_count = count_success_scans(conn, tenant_id, code, None).await?;
    if coupon.usage_limit > 0 && success_count >= coupon.usage_limit {
        if coupon.usage_limit == 1 {
            return Err(EngineError::AlreadyUsed);
        }
        return Err(EngineError::UsageLimitExceeded {
            limit: coupon.usage_limit,
        });
    }

    if context.per_customer
        && count_success_scans(conn, tenant_id, code, Some(customer_id)).await? > 0
    {
        return Err(EngineError::AlreadyUsed);
    }

    let scan = Scan {
        id: Uuid::new_v4(),
        tenant_id,
        coupon_code: code.to_string(),
        customer_id: customer_id.to_string(),
        status: ScanStatus::Success,
        location: context.location.clone(),
        device_info: context.device_info.clone(),
        scanned_at: now,
    };

    let insert = Query::insert()
        .into_table(Scans::Table)
        .columns([
            Scans::Id,
            Scans::TenantId,
            Scans::CouponCode,
            Scans::CustomerId,
            Scans::Status,
            Scans::Location,
            Scans::DeviceInfo,
            Scans::ScannedAt,
        ])
        .values_panic([
            scan.id.to_string().into(),
            scan.tenant_id.to_string().into(),
            scan.coupon_code.clone().into(),
            scan.customer_id.clone().into(),
            scan.status.as_str().into(),
            scan.location.clone().into(),
            scan.device_info.clone().into(),
            scan.scanned_at.to_rfc3339().into(),
        ])
        .to_string(SqliteQueryBuilder);
    sqlx::query(&insert).execute(&mut *conn).await?;

    let mut final_status = coupon.status;
    if coupon.usage_limit > 0 && success_count + 1 >= coupon.usage_limit {
        final_status = coupon.status.transition(CouponAction::Scan)?;
        set_coupon_status(conn, tenant_id, code, final_status).await?;
    }

    let (points_awarded, points_balance) = if coupon.coupon_points > 0 {
        let reference = LedgerReference::new(
            Some(scan.id),
            "coupon_scan",
            format!("redeem coupon {code}"),
            customer_id,
        );
        let receipt =
            apply_points_delta_tx(conn, tenant_id, customer_id, coupon.coupon_points, &reference)
                .await?;
        (coupon.coupon_points, receipt.balance_after)
    } else {
        let query = Query::select()
            .column(PointsBalances::Balance)
            .from(PointsBalances::Table)
            .and_where(Expr::col(PointsBalances::TenantId).eq(tenant_id.to_string()))
            .and_where(Expr::col(PointsBalances::CustomerId).eq(customer_id))
            .to_string(SqliteQueryBuilder);
        let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
        (0, row.map(|r| r.get::<i64, _>("balance")).unwrap_or(0))
    };

    Ok(RedeemOutcome::Redeemed(RedeemReceipt {
        scan_id: scan.id,
        coupon: CouponSummary {
            code: coupon.code,
            discount_value: coupon.discount_value,
            discount_kind: coupon.discount_kind,
            status: final_status,
        },
        points_awarded,
        points_balance,
    }))
}

#[async_trait]
impl ScanStore for SqliteStore {
    async fn redeem(
        &self,
        tenant_id: Uuid,
        code: &str,
        customer_id: &str,
        context: &ScanContext,
    ) -> Result<RedeemReceipt> {
        let mut conn = self.begin_immediate().await?;

        match redeem_tx(&mut conn, tenant_id, code, customer_id, context).await {
            Ok(RedeemOutcome::Redeemed(receipt)) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(receipt)
            }
            Ok(RedeemOutcome::LazyExpired) => {
                // Commit only the lazy expired-status write.
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Err(EngineError::CouponExpired)
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(e)
            }
        }
    }

    async fn scans_for_coupon(&self, tenant_id: Uuid, code: &str) -> Result<Vec<Scan>> {
        let query = Query::select()
            .columns([
                Scans::Id,
                Scans::TenantId,
                Scans::CouponCode,
                Scans::CustomerId,
                Scans::Status,
                Scans::Location,
                Scans::DeviceInfo,
                Scans::ScannedAt,
            ])
            .from(Scans::Table)
            .and_where(Expr::col(Scans::TenantId).eq(tenant_id.to_string()))
            .and_where(Expr::col(Scans::CouponCode).eq(code))
            .order_by(Scans::ScannedAt, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(self.pool()).await?;

        let mut scans = Vec::with_capacity(rows.len());
        for row in &rows {
            let status = match row.get::<String, _>("status").as_str() {
                "success" => ScanStatus::Success,
                other => {
                    return Err(EngineError::validation(format!(
                        "unknown scan status: {other}"
                    )))
                }
            };
            scans.push(Scan {
                id: Uuid::parse_str(&row.get::<String, _>("id"))?,
                tenant_id: Uuid::parse_str(&row.get::<String, _>("tenant_id"))?,
                coupon_code: row.get("coupon_code"),
                customer_id: row.get("customer_id"),
                status,
                location: row.get("location"),
                device_info: row.get("device_info"),
                scanned_at: parse_ts(&row.get::<String, _>("scanned_at"))?,
            });
        }
        Ok(scans)
    }
}
