//! SQLite coupon store: batch issuance and lifecycle transitions.

use async_trait::async_trait;
use chrono::Utc;
use sea_query::{Expr, Order, Query, SqliteQueryBuilder};
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::interfaces::{CouponStore, IssueReceipt, IssuedBatch};
use crate::model::{
    Coupon, CouponAction, CouponBatch, CouponStatus, DiscountKind, LedgerReference, NewBatch,
};
use crate::storage::schema::{CouponBatches, Coupons};

use super::ledger::apply_credit_delta_tx;
use super::{finish_tx, is_unique_violation, parse_ts, parse_ts_opt, SqliteStore};

pub(crate) const COUPON_COLUMNS: [Coupons; 12] = [
    Coupons::TenantId,
    Coupons::Code,
    Coupons::BatchId,
    Coupons::VerificationAppId,
    Coupons::DiscountValue,
    Coupons::DiscountKind,
    Coupons::Status,
    Coupons::UsageLimit,
    Coupons::CouponPoints,
    Coupons::ExpiryDate,
    Coupons::DeactivationReason,
    Coupons::CreatedAt,
];

const BATCH_COLUMNS: [CouponBatches; 11] = [
    CouponBatches::Id,
    CouponBatches::TenantId,
    CouponBatches::VerificationAppId,
    CouponBatches::Description,
    CouponBatches::DiscountValue,
    CouponBatches::DiscountKind,
    CouponBatches::Quantity,
    CouponBatches::ExpiryDate,
    CouponBatches::PrintedAt,
    CouponBatches::PrintNote,
    CouponBatches::CreatedAt,
];

pub(crate) fn coupon_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Coupon> {
    Ok(Coupon {
        tenant_id: Uuid::parse_str(&row.get::<String, _>("tenant_id"))?,
        code: row.get("code"),
        batch_id: Uuid::parse_str(&row.get::<String, _>("batch_id"))?,
        verification_app_id: Uuid::parse_str(&row.get::<String, _>("verification_app_id"))?,
        discount_value: row.get("discount_value"),
        discount_kind: DiscountKind::parse(&row.get::<String, _>("discount_kind"))?,
        status: CouponStatus::parse(&row.get::<String, _>("status"))?,
        usage_limit: row.get("usage_limit"),
        coupon_points: row.get("coupon_points"),
        expiry_date: parse_ts(&row.get::<String, _>("expiry_date"))?,
        deactivation_reason: row.get("deactivation_reason"),
        created_at: parse_ts(&row.get::<String, _>("created_at"))?,
    })
}

fn batch_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<CouponBatch> {
    Ok(CouponBatch {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        tenant_id: Uuid::parse_str(&row.get::<String, _>("tenant_id"))?,
        verification_app_id: Uuid::parse_str(&row.get::<String, _>("verification_app_id"))?,
        description: row.get("description"),
        discount_value: row.get("discount_value"),
        discount_kind: DiscountKind::parse(&row.get::<String, _>("discount_kind"))?,
        quantity: row.get("quantity"),
        expiry_date: parse_ts(&row.get::<String, _>("expiry_date"))?,
        printed_at: parse_ts_opt(row.get("printed_at"))?,
        print_note: row.get("print_note"),
        created_at: parse_ts(&row.get::<String, _>("created_at"))?,
    })
}

/// Coupon codes are 12 uppercase hex characters drawn from UUID entropy.
fn generate_code() -> String {
    hex::encode_upper(&Uuid::new_v4().as_bytes()[..6])
}

/// Insert one coupon row, regenerating the code on the rare per-tenant
/// collision.
async fn insert_coupon(conn: &mut SqliteConnection, coupon: &mut Coupon) -> Result<()> {
    const MAX_ATTEMPTS: u32 = 3;

    let mut attempt = 0;
    loop {
        let insert = Query::insert()
            .into_table(Coupons::Table)
            .columns(COUPON_COLUMNS)
            .values_panic([
                coupon.tenant_id.to_string().into(),
                coupon.code.clone().into(),
                coupon.batch_id.to_string().into(),
                coupon.verification_app_id.to_string().into(),
                coupon.discount_value.into(),
                coupon.discount_kind.as_str().into(),
                coupon.status.as_str().into(),
                coupon.usage_limit.into(),
                coupon.coupon_points.into(),
                coupon.expiry_date.to_rfc3339().into(),
                Option::<String>::None.into(),
                coupon.created_at.to_rfc3339().into(),
            ])
            .to_string(SqliteQueryBuilder);

        match sqlx::query(&insert).execute(&mut *conn).await {
            Ok(_) => return Ok(()),
            Err(e) if is_unique_violation(&e) && attempt + 1 < MAX_ATTEMPTS => {
                attempt += 1;
                coupon.code = generate_code();
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Load the statuses of every coupon in a batch, within a transaction.
async fn batch_statuses(
    conn: &mut SqliteConnection,
    tenant_id: Uuid,
    batch_id: Uuid,
) -> Result<Vec<CouponStatus>> {
    let query = Query::select()
        .column(Coupons::Status)
        .from(Coupons::Table)
        .and_where(Expr::col(Coupons::TenantId).eq(tenant_id.to_string()))
        .and_where(Expr::col(Coupons::BatchId).eq(batch_id.to_string()))
        .to_string(SqliteQueryBuilder);

    let rows = sqlx::query(&query).fetch_all(&mut *conn).await?;
    rows.iter()
        .map(|row| CouponStatus::parse(&row.get::<String, _>("status")))
        .collect()
}

/// Check every member against the state machine; the lifecycle-specific
/// violation (AlreadyPrinted, MustPrintFirst) wins over generic
/// InvalidState so callers see the most actionable error.
fn check_batch_transition(
    statuses: &[CouponStatus],
    action: CouponAction,
) -> Result<CouponStatus> {
    let mut violation: Option<EngineError> = None;
    let mut next = None;

    for status in statuses {
        match status.transition(action) {
            Ok(n) => next = Some(n),
            Err(e @ (EngineError::AlreadyPrinted | EngineError::MustPrintFirst)) => {
                violation = Some(e);
            }
            Err(e) => {
                if violation.is_none() {
                    violation = Some(e);
                }
            }
        }
    }

    match violation {
        Some(e) => Err(e),
        None => next.ok_or_else(|| EngineError::not_found("coupon batch")),
    }
}

async fn fetch_batch_tx(
    conn: &mut SqliteConnection,
    tenant_id: Uuid,
    batch_id: Uuid,
) -> Result<CouponBatch> {
    let query = Query::select()
        .columns(BATCH_COLUMNS)
        .from(CouponBatches::Table)
        .and_where(Expr::col(CouponBatches::TenantId).eq(tenant_id.to_string()))
        .and_where(Expr::col(CouponBatches::Id).eq(batch_id.to_string()))
        .to_string(SqliteQueryBuilder);

    let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
    match row {
        Some(row) => batch_from_row(&row),
        None => Err(EngineError::not_found("coupon batch")),
    }
}

async fn set_batch_status(
    conn: &mut SqliteConnection,
    tenant_id: Uuid,
    batch_id: Uuid,
    status: CouponStatus,
) -> Result<u64> {
    let update = Query::update()
        .table(Coupons::Table)
        .value(Coupons::Status, status.as_str())
        .and_where(Expr::col(Coupons::TenantId).eq(tenant_id.to_string()))
        .and_where(Expr::col(Coupons::BatchId).eq(batch_id.to_string()))
        .to_string(SqliteQueryBuilder);

    let result = sqlx::query(&update).execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

#[async_trait]
impl CouponStore for SqliteStore {
    async fn issue(
        &self,
        tenant_id: Uuid,
        verification_app_id: Uuid,
        batches: &[NewBatch],
        total_cost: i64,
        created_by: &str,
    ) -> Result<IssueReceipt> {
        let mut conn = self.begin_immediate().await?;
        let result = async {
            let now = Utc::now();
            let batch_ids: Vec<Uuid> = batches.iter().map(|_| Uuid::new_v4()).collect();
            let total_coupons: i64 = batches.iter().map(|b| b.quantity).sum();

            // Debit first: InsufficientCredit must surface before any
            // coupon row exists, and the whole transaction rolls back
            // together either way.
            let reference = if batches.len() == 1 {
                LedgerReference::new(
                    Some(batch_ids[0]),
                    "coupon_batch",
                    format!("issue {total_coupons} coupons"),
                    created_by,
                )
            } else {
                LedgerReference::new(
                    Some(Uuid::new_v4()),
                    "multi_batch",
                    format!(
                        "issue {} batches ({total_coupons} coupons)",
                        batches.len()
                    ),
                    created_by,
                )
            };
            let ledger = apply_credit_delta_tx(&mut conn, tenant_id, -total_cost, &reference).await?;

            let mut issued = Vec::with_capacity(batches.len());
            for (new, batch_id) in batches.iter().zip(&batch_ids) {
                let batch = CouponBatch {
                    id: *batch_id,
                    tenant_id,
                    verification_app_id,
                    description: new.description.clone(),
                    discount_value: new.discount_value,
                    discount_kind: new.discount_kind,
                    quantity: new.quantity,
                    expiry_date: new.expiry_date,
                    printed_at: None,
                    print_note: None,
                    created_at: now,
                };

                let insert = Query::insert()
                    .into_table(CouponBatches::Table)
                    .columns(BATCH_COLUMNS)
                    .values_panic([
                        batch.id.to_string().into(),
                        batch.tenant_id.to_string().into(),
                        batch.verification_app_id.to_string().into(),
                        batch.description.clone().into(),
                        batch.discount_value.into(),
                        batch.discount_kind.as_str().into(),
                        batch.quantity.into(),
                        batch.expiry_date.to_rfc3339().into(),
                        Option::<String>::None.into(),
                        Option::<String>::None.into(),
                        batch.created_at.to_rfc3339().into(),
                    ])
                    .to_string(SqliteQueryBuilder);
                sqlx::query(&insert).execute(&mut *conn).await?;

                let mut coupons = Vec::with_capacity(new.quantity as usize);
                for _ in 0..new.quantity {
                    let mut coupon = Coupon {
                        code: generate_code(),
                        tenant_id,
                        batch_id: *batch_id,
                        verification_app_id,
                        discount_value: new.discount_value,
                        discount_kind: new.discount_kind,
                        status: CouponStatus::Draft,
                        usage_limit: new.usage_limit,
                        coupon_points: new.coupon_points,
                        expiry_date: new.expiry_date,
                        deactivation_reason: None,
                        created_at: now,
                    };
                    insert_coupon(&mut conn, &mut coupon).await?;
                    coupons.push(coupon);
                }

                issued.push(IssuedBatch { batch, coupons });
            }

            Ok(IssueReceipt {
                batches: issued,
                total_cost,
                ledger,
            })
        }
        .await;
        finish_tx(&mut conn, result).await
    }

    async fn print_batch(
        &self,
        tenant_id: Uuid,
        batch_id: Uuid,
        note: Option<&str>,
    ) -> Result<u64> {
        let mut conn = self.begin_immediate().await?;
        let result = async {
            let batch = fetch_batch_tx(&mut conn, tenant_id, batch_id).await?;
            if batch.expiry_date < Utc::now() {
                return Err(EngineError::CouponExpired);
            }

            let statuses = batch_statuses(&mut conn, tenant_id, batch_id).await?;
            let next = check_batch_transition(&statuses, CouponAction::Print)?;
            let count = set_batch_status(&mut conn, tenant_id, batch_id, next).await?;

            let update = Query::update()
                .table(CouponBatches::Table)
                .value(CouponBatches::PrintedAt, Utc::now().to_rfc3339())
                .value(CouponBatches::PrintNote, note.map(str::to_string))
                .and_where(Expr::col(CouponBatches::Id).eq(batch_id.to_string()))
                .to_string(SqliteQueryBuilder);
            sqlx::query(&update).execute(&mut *conn).await?;

            Ok(count)
        }
        .await;
        finish_tx(&mut conn, result).await
    }

    async fn activate_batch(&self, tenant_id: Uuid, batch_id: Uuid) -> Result<u64> {
        let mut conn = self.begin_immediate().await?;
        let result = async {
            let batch = fetch_batch_tx(&mut conn, tenant_id, batch_id).await?;
            if batch.expiry_date < Utc::now() {
                return Err(EngineError::CouponExpired);
            }

            let statuses = batch_statuses(&mut conn, tenant_id, batch_id).await?;
            let next = check_batch_transition(&statuses, CouponAction::Activate)?;
            set_batch_status(&mut conn, tenant_id, batch_id, next).await
        }
        .await;
        finish_tx(&mut conn, result).await
    }

    async fn deactivate(&self, tenant_id: Uuid, code: &str, reason: &str) -> Result<Coupon> {
        let mut conn = self.begin_immediate().await?;

        let query = Query::select()
            .columns(COUPON_COLUMNS)
            .from(Coupons::Table)
            .and_where(Expr::col(Coupons::TenantId).eq(tenant_id.to_string()))
            .and_where(Expr::col(Coupons::Code).eq(code))
            .to_string(SqliteQueryBuilder);

        let result = async {
            let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
            let mut coupon = match row {
                Some(row) => coupon_from_row(&row)?,
                None => return Err(EngineError::CouponNotFound),
            };

            // An active coupon past its expiry is expired, not
            // deactivatable; persist that observation lazily.
            if coupon.status == CouponStatus::Active && coupon.is_expired_at(Utc::now()) {
                let update = Query::update()
                    .table(Coupons::Table)
                    .value(Coupons::Status, CouponStatus::Expired.as_str())
                    .and_where(Expr::col(Coupons::TenantId).eq(tenant_id.to_string()))
                    .and_where(Expr::col(Coupons::Code).eq(code))
                    .to_string(SqliteQueryBuilder);
                sqlx::query(&update).execute(&mut *conn).await?;
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                return Err(EngineError::CouponExpired);
            }

            let next = coupon.status.transition(CouponAction::Deactivate)?;
            let update = Query::update()
                .table(Coupons::Table)
                .value(Coupons::Status, next.as_str())
                .value(Coupons::DeactivationReason, reason)
                .and_where(Expr::col(Coupons::TenantId).eq(tenant_id.to_string()))
                .and_where(Expr::col(Coupons::Code).eq(code))
                .to_string(SqliteQueryBuilder);
            sqlx::query(&update).execute(&mut *conn).await?;
            sqlx::query("COMMIT").execute(&mut *conn).await?;

            coupon.status = next;
            coupon.deactivation_reason = Some(reason.to_string());
            Ok(coupon)
        }
        .await;

        if result.is_err() && !matches!(result, Err(EngineError::CouponExpired)) {
            let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
        }
        result
    }

    async fn get_coupon(&self, tenant_id: Uuid, code: &str) -> Result<Coupon> {
        let query = Query::select()
            .columns(COUPON_COLUMNS)
            .from(Coupons::Table)
            .and_where(Expr::col(Coupons::TenantId).eq(tenant_id.to_string()))
            .and_where(Expr::col(Coupons::Code).eq(code))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(self.pool()).await?;
        match row {
            Some(row) => coupon_from_row(&row),
            None => Err(EngineError::CouponNotFound),
        }
    }

    async fn get_batch(&self, tenant_id: Uuid, batch_id: Uuid) -> Result<CouponBatch> {
        let query = Query::select()
            .columns(BATCH_COLUMNS)
            .from(CouponBatches::Table)
            .and_where(Expr::col(CouponBatches::TenantId).eq(tenant_id.to_string()))
            .and_where(Expr::col(CouponBatches::Id).eq(batch_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(self.pool()).await?;
        match row {
            Some(row) => batch_from_row(&row),
            None => Err(EngineError::not_found("coupon batch")),
        }
    }

    async fn list_by_batch(&self, tenant_id: Uuid, batch_id: Uuid) -> Result<Vec<Coupon>> {
        let query = Query::select()
            .columns(COUPON_COLUMNS)
            .from(Coupons::Table)
            .and_where(Expr::col(Coupons::TenantId).eq(tenant_id.to_string()))
            .and_where(Expr::col(Coupons::BatchId).eq(batch_id.to_string()))
            .order_by(Coupons::Code, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(self.pool()).await?;
        rows.iter().map(coupon_from_row).collect()
    }

    async fn list_by_status(
        &self,
        tenant_id: Uuid,
        status: CouponStatus,
    ) -> Result<Vec<Coupon>> {
        let query = Query::select()
            .columns(COUPON_COLUMNS)
            .from(Coupons::Table)
            .and_where(Expr::col(Coupons::TenantId).eq(tenant_id.to_string()))
            .order_by(Coupons::Code, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(self.pool()).await?;
        let now = Utc::now();

        let mut coupons = Vec::new();
        for row in &rows {
            let coupon = coupon_from_row(row)?;
            if coupon.effective_status(now) == status {
                coupons.push(coupon);
            }
        }
        Ok(coupons)
    }
}
