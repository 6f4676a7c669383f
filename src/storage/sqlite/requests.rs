//! SQLite credit request store.

use async_trait::async_trait;
use chrono::Utc;
use sea_query::{Expr, Order, Query, SqliteQueryBuilder};
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::interfaces::RequestStore;
use crate::model::{CreditRequest, LedgerReceipt, LedgerReference, RequestStatus};
use crate::storage::schema::CreditRequests;

use super::ledger::apply_credit_delta_tx;
use super::{finish_tx, parse_ts, parse_ts_opt, SqliteStore};

const REQUEST_COLUMNS: [CreditRequests; 9] = [
    CreditRequests::Id,
    CreditRequests::TenantId,
    CreditRequests::RequestedAmount,
    CreditRequests::Justification,
    CreditRequests::Status,
    CreditRequests::RequestedAt,
    CreditRequests::ProcessedAt,
    CreditRequests::ProcessedBy,
    CreditRequests::RejectionReason,
];

fn request_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<CreditRequest> {
    Ok(CreditRequest {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        tenant_id: Uuid::parse_str(&row.get::<String, _>("tenant_id"))?,
        requested_amount: row.get("requested_amount"),
        justification: row.get("justification"),
        status: RequestStatus::parse(&row.get::<String, _>("status"))?,
        requested_at: parse_ts(&row.get::<String, _>("requested_at"))?,
        processed_at: parse_ts_opt(row.get("processed_at"))?,
        processed_by: row.get("processed_by"),
        rejection_reason: row.get("rejection_reason"),
    })
}

/// Fetch a pending request by id within a write transaction.
async fn fetch_pending(
    conn: &mut SqliteConnection,
    request_id: Uuid,
) -> Result<CreditRequest> {
    let query = Query::select()
        .columns(REQUEST_COLUMNS)
        .from(CreditRequests::Table)
        .and_where(Expr::col(CreditRequests::Id).eq(request_id.to_string()))
        .and_where(Expr::col(CreditRequests::Status).eq(RequestStatus::Pending.as_str()))
        .to_string(SqliteQueryBuilder);

    let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
    match row {
        Some(row) => request_from_row(&row),
        None => Err(EngineError::not_found("pending credit request")),
    }
}

#[async_trait]
impl RequestStore for SqliteStore {
    async fn create_request(
        &self,
        tenant_id: Uuid,
        amount: i64,
        justification: &str,
    ) -> Result<CreditRequest> {
        let mut conn = self.begin_immediate().await?;
        let result = async {
            let existing = Query::select()
                .column(CreditRequests::Id)
                .from(CreditRequests::Table)
                .and_where(Expr::col(CreditRequests::TenantId).eq(tenant_id.to_string()))
                .and_where(Expr::col(CreditRequests::Status).eq(RequestStatus::Pending.as_str()))
                .to_string(SqliteQueryBuilder);

            if sqlx::query(&existing)
                .fetch_optional(&mut *conn)
                .await?
                .is_some()
            {
                return Err(EngineError::DuplicatePendingRequest);
            }

            let request = CreditRequest {
                id: Uuid::new_v4(),
                tenant_id,
                requested_amount: amount,
                justification: justification.to_string(),
                status: RequestStatus::Pending,
                requested_at: Utc::now(),
                processed_at: None,
                processed_by: None,
                rejection_reason: None,
            };

            let insert = Query::insert()
                .into_table(CreditRequests::Table)
                .columns(REQUEST_COLUMNS)
                .values_panic([
                    request.id.to_string().into(),
                    request.tenant_id.to_string().into(),
                    request.requested_amount.into(),
                    request.justification.clone().into(),
                    request.status.as_str().into(),
                    request.requested_at.to_rfc3339().into(),
                    Option::<String>::None.into(),
                    Option::<String>::None.into(),
                    Option::<String>::None.into(),
                ])
                .to_string(SqliteQueryBuilder);

            // The partial unique index on (tenant_id) WHERE pending is the
            // backstop if another connection slipped a pending row in.
            sqlx::query(&insert).execute(&mut *conn).await.map_err(|e| {
                if super::is_unique_violation(&e) {
                    EngineError::DuplicatePendingRequest
                } else {
                    e.into()
                }
            })?;

            Ok(request)
        }
        .await;
        finish_tx(&mut conn, result).await
    }

    async fn approve_request(
        &self,
        request_id: Uuid,
        actor: &str,
    ) -> Result<(CreditRequest, LedgerReceipt)> {
        let mut conn = self.begin_immediate().await?;
        let result = async {
            let mut request = fetch_pending(&mut conn, request_id).await?;

            let reference = LedgerReference::new(
                Some(request.id),
                "credit_request",
                format!("approved credit request for {}", request.requested_amount),
                actor,
            );
            let receipt = apply_credit_delta_tx(
                &mut conn,
                request.tenant_id,
                request.requested_amount,
                &reference,
            )
            .await?;

            let now = Utc::now();
            let update = Query::update()
                .table(CreditRequests::Table)
                .value(CreditRequests::Status, RequestStatus::Approved.as_str())
                .value(CreditRequests::ProcessedAt, now.to_rfc3339())
                .value(CreditRequests::ProcessedBy, actor)
                .and_where(Expr::col(CreditRequests::Id).eq(request.id.to_string()))
                .to_string(SqliteQueryBuilder);

            sqlx::query(&update).execute(&mut *conn).await?;

            request.status = RequestStatus::Approved;
            request.processed_at = Some(now);
            request.processed_by = Some(actor.to_string());
            Ok((request, receipt))
        }
        .await;
        finish_tx(&mut conn, result).await
    }

    async fn reject_request(
        &self,
        request_id: Uuid,
        actor: &str,
        reason: &str,
    ) -> Result<CreditRequest> {
        let mut conn = self.begin_immediate().await?;
        let result = async {
            let mut request = fetch_pending(&mut conn, request_id).await?;

            let now = Utc::now();
            let update = Query::update()
                .table(CreditRequests::Table)
                .value(CreditRequests::Status, RequestStatus::Rejected.as_str())
                .value(CreditRequests::ProcessedAt, now.to_rfc3339())
                .value(CreditRequests::ProcessedBy, actor)
                .value(CreditRequests::RejectionReason, reason)
                .and_where(Expr::col(CreditRequests::Id).eq(request.id.to_string()))
                .to_string(SqliteQueryBuilder);

            sqlx::query(&update).execute(&mut *conn).await?;

            request.status = RequestStatus::Rejected;
            request.processed_at = Some(now);
            request.processed_by = Some(actor.to_string());
            request.rejection_reason = Some(reason.to_string());
            Ok(request)
        }
        .await;
        finish_tx(&mut conn, result).await
    }

    async fn get_request(&self, request_id: Uuid) -> Result<CreditRequest> {
        let query = Query::select()
            .columns(REQUEST_COLUMNS)
            .from(CreditRequests::Table)
            .and_where(Expr::col(CreditRequests::Id).eq(request_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(self.pool()).await?;
        match row {
            Some(row) => request_from_row(&row),
            None => Err(EngineError::not_found("credit request")),
        }
    }

    async fn list_requests(&self, tenant_id: Uuid) -> Result<Vec<CreditRequest>> {
        let query = Query::select()
            .columns(REQUEST_COLUMNS)
            .from(CreditRequests::Table)
            .and_where(Expr::col(CreditRequests::TenantId).eq(tenant_id.to_string()))
            .order_by(CreditRequests::RequestedAt, Order::Desc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(self.pool()).await?;
        rows.iter().map(request_from_row).collect()
    }

    async fn list_pending(&self) -> Result<Vec<CreditRequest>> {
        let query = Query::select()
            .columns(REQUEST_COLUMNS)
            .from(CreditRequests::Table)
            .and_where(Expr::col(CreditRequests::Status).eq(RequestStatus::Pending.as_str()))
            .order_by(CreditRequests::RequestedAt, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(self.pool()).await?;
        rows.iter().map(request_from_row).collect()
    }
}
