//! SQLite credit and points ledger implementation.

use async_trait::async_trait;
use chrono::Utc;
use sea_query::{Expr, OnConflict, Order, Query, SqliteQueryBuilder};
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::interfaces::LedgerStore;
use crate::model::{
    CreditBalance, CreditTransaction, LedgerReceipt, LedgerReference, PointsBalance,
    PointsTransaction, TransactionKind,
};
use crate::storage::schema::{
    CreditBalances, CreditTransactions, PointsBalances, PointsTransactions,
};

use super::{finish_tx, parse_ts, SqliteStore};

/// Apply a signed credit delta within an already-started write transaction.
///
/// Reads the balance (the write lock is already held), rejects overdraws,
/// upserts the balance row, and appends the audit transaction with
/// before/after captured atomically.
pub(crate) async fn apply_credit_delta_tx(
    conn: &mut SqliteConnection,
    tenant_id: Uuid,
    delta: i64,
    reference: &LedgerReference,
) -> Result<LedgerReceipt> {
    let tenant = tenant_id.to_string();
    let now = Utc::now();

    let query = Query::select()
        .columns([
            CreditBalances::Balance,
            CreditBalances::TotalReceived,
            CreditBalances::TotalSpent,
        ])
        .from(CreditBalances::Table)
        .and_where(Expr::col(CreditBalances::TenantId).eq(&tenant))
        .to_string(SqliteQueryBuilder);

    let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
    let (balance, received, spent) = match row {
        Some(row) => (
            row.get::<i64, _>("balance"),
            row.get::<i64, _>("total_received"),
            row.get::<i64, _>("total_spent"),
        ),
        None => (0, 0, 0),
    };

    if delta < 0 && -delta > balance {
        return Err(EngineError::InsufficientCredit {
            balance,
            required: -delta,
        });
    }

    let balance_after = balance + delta;
    let (received, spent) = if delta >= 0 {
        (received + delta, spent)
    } else {
        (received, spent - delta)
    };

    let upsert = Query::insert()
        .into_table(CreditBalances::Table)
        .columns([
            CreditBalances::TenantId,
            CreditBalances::Balance,
            CreditBalances::TotalReceived,
            CreditBalances::TotalSpent,
            CreditBalances::LastUpdated,
        ])
        .values_panic([
            tenant.clone().into(),
            balance_after.into(),
            received.into(),
            spent.into(),
            now.to_rfc3339().into(),
        ])
        .on_conflict(
            OnConflict::column(CreditBalances::TenantId)
                .update_columns([
                    CreditBalances::Balance,
                    CreditBalances::TotalReceived,
                    CreditBalances::TotalSpent,
                    CreditBalances::LastUpdated,
                ])
                .to_owned(),
        )
        .to_string(SqliteQueryBuilder);

    sqlx::query(&upsert).execute(&mut *conn).await?;

    let transaction_id = Uuid::new_v4();
    let kind = if delta >= 0 {
        TransactionKind::Credit
    } else {
        TransactionKind::Debit
    };

    let insert = Query::insert()
        .into_table(CreditTransactions::Table)
        .columns([
            CreditTransactions::Id,
            CreditTransactions::TenantId,
            CreditTransactions::Kind,
            CreditTransactions::Amount,
            CreditTransactions::BalanceBefore,
            CreditTransactions::BalanceAfter,
            CreditTransactions::ReferenceId,
            CreditTransactions::ReferenceKind,
            CreditTransactions::Description,
            CreditTransactions::CreatedBy,
            CreditTransactions::CreatedAt,
        ])
        .values_panic([
            transaction_id.to_string().into(),
            tenant.into(),
            kind.as_str().into(),
            delta.abs().into(),
            balance.into(),
            balance_after.into(),
            reference.id.map(|id| id.to_string()).into(),
            reference.kind.clone().into(),
            reference.description.clone().into(),
            reference.actor.clone().into(),
            now.to_rfc3339().into(),
        ])
        .to_string(SqliteQueryBuilder);

    sqlx::query(&insert).execute(&mut *conn).await?;

    Ok(LedgerReceipt {
        transaction_id,
        balance_before: balance,
        balance_after,
    })
}

/// Points-ledger twin of [`apply_credit_delta_tx`].
pub(crate) async fn apply_points_delta_tx(
    conn: &mut SqliteConnection,
    tenant_id: Uuid,
    customer_id: &str,
    delta: i64,
    reference: &LedgerReference,
) -> Result<LedgerReceipt> {
    let tenant = tenant_id.to_string();
    let now = Utc::now();

    let query = Query::select()
        .columns([
            PointsBalances::Balance,
            PointsBalances::TotalEarned,
            PointsBalances::TotalSpent,
        ])
        .from(PointsBalances::Table)
        .and_where(Expr::col(PointsBalances::TenantId).eq(&tenant))
        .and_where(Expr::col(PointsBalances::CustomerId).eq(customer_id))
        .to_string(SqliteQueryBuilder);

    let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
    let (balance, earned, spent) = match row {
        Some(row) => (
            row.get::<i64, _>("balance"),
            row.get::<i64, _>("total_earned"),
            row.get::<i64, _>("total_spent"),
        ),
        None => (0, 0, 0),
    };

    if delta < 0 && -delta > balance {
        return Err(EngineError::InsufficientPoints {
            balance,
            required: -delta,
        });
    }

    let balance_after = balance + delta;
    let (earned, spent) = if delta >= 0 {
        (earned + delta, spent)
    } else {
        (earned, spent - delta)
    };

    let upsert = Query::insert()
        .into_table(PointsBalances::Table)
        .columns([
            PointsBalances::TenantId,
            PointsBalances::CustomerId,
            PointsBalances::Balance,
            PointsBalances::TotalEarned,
            PointsBalances::TotalSpent,
            PointsBalances::LastUpdated,
        ])
        .values_panic([
            tenant.clone().into(),
            customer_id.into(),
            balance_after.into(),
            earned.into(),
            spent.into(),
            now.to_rfc3339().into(),
        ])
        .on_conflict(
            OnConflict::columns([PointsBalances::TenantId, PointsBalances::CustomerId])
                .update_columns([
                    PointsBalances::Balance,
                    PointsBalances::TotalEarned,
                    PointsBalances::TotalSpent,
                    PointsBalances::LastUpdated,
                ])
                .to_owned(),
        )
        .to_string(SqliteQueryBuilder);

    sqlx::query(&upsert).execute(&mut *conn).await?;

    let transaction_id = Uuid::new_v4();
    let kind = if delta >= 0 {
        TransactionKind::Credit
    } else {
        TransactionKind::Debit
    };

    let insert = Query::insert()
        .into_table(PointsTransactions::Table)
        .columns([
            PointsTransactions::Id,
            PointsTransactions::TenantId,
            PointsTransactions::CustomerId,
            PointsTransactions::Kind,
            PointsTransactions::Amount,
            PointsTransactions::BalanceBefore,
            PointsTransactions::BalanceAfter,
            PointsTransactions::ReferenceId,
            PointsTransactions::ReferenceKind,
            PointsTransactions::Description,
            PointsTransactions::CreatedAt,
        ])
        .values_panic([
            transaction_id.to_string().into(),
            tenant.into(),
            customer_id.into(),
            kind.as_str().into(),
            delta.abs().into(),
            balance.into(),
            balance_after.into(),
            reference.id.map(|id| id.to_string()).into(),
            reference.kind.clone().into(),
            reference.description.clone().into(),
            now.to_rfc3339().into(),
        ])
        .to_string(SqliteQueryBuilder);

    sqlx::query(&insert).execute(&mut *conn).await?;

    Ok(LedgerReceipt {
        transaction_id,
        balance_before: balance,
        balance_after,
    })
}

fn credit_transaction_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<CreditTransaction> {
    Ok(CreditTransaction {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        tenant_id: Uuid::parse_str(&row.get::<String, _>("tenant_id"))?,
        kind: TransactionKind::parse(&row.get::<String, _>("kind"))?,
        amount: row.get("amount"),
        balance_before: row.get("balance_before"),
        balance_after: row.get("balance_after"),
        reference_id: row
            .get::<Option<String>, _>("reference_id")
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()?,
        reference_kind: row.get("reference_kind"),
        description: row.get("description"),
        created_by: row.get("created_by"),
        created_at: parse_ts(&row.get::<String, _>("created_at"))?,
    })
}

fn points_transaction_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<PointsTransaction> {
    Ok(PointsTransaction {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        tenant_id: Uuid::parse_str(&row.get::<String, _>("tenant_id"))?,
        customer_id: row.get("customer_id"),
        kind: TransactionKind::parse(&row.get::<String, _>("kind"))?,
        amount: row.get("amount"),
        balance_before: row.get("balance_before"),
        balance_after: row.get("balance_after"),
        reference_id: row
            .get::<Option<String>, _>("reference_id")
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()?,
        reference_kind: row.get("reference_kind"),
        description: row.get("description"),
        created_at: parse_ts(&row.get::<String, _>("created_at"))?,
    })
}

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn apply_credit_delta(
        &self,
        tenant_id: Uuid,
        delta: i64,
        reference: &LedgerReference,
    ) -> Result<LedgerReceipt> {
        let mut conn = self.begin_immediate().await?;
        let result = apply_credit_delta_tx(&mut conn, tenant_id, delta, reference).await;
        finish_tx(&mut conn, result).await
    }

    async fn credit_balance(&self, tenant_id: Uuid) -> Result<CreditBalance> {
        let query = Query::select()
            .columns([
                CreditBalances::Balance,
                CreditBalances::TotalReceived,
                CreditBalances::TotalSpent,
                CreditBalances::LastUpdated,
            ])
            .from(CreditBalances::Table)
            .and_where(Expr::col(CreditBalances::TenantId).eq(tenant_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(self.pool()).await?;

        match row {
            Some(row) => Ok(CreditBalance {
                tenant_id,
                balance: row.get("balance"),
                total_received: row.get("total_received"),
                total_spent: row.get("total_spent"),
                last_updated: parse_ts(&row.get::<String, _>("last_updated"))?,
            }),
            None => Ok(CreditBalance::empty(tenant_id, Utc::now())),
        }
    }

    async fn credit_transactions(&self, tenant_id: Uuid) -> Result<Vec<CreditTransaction>> {
        let query = Query::select()
            .columns([
                CreditTransactions::Id,
                CreditTransactions::TenantId,
                CreditTransactions::Kind,
                CreditTransactions::Amount,
                CreditTransactions::BalanceBefore,
                CreditTransactions::BalanceAfter,
                CreditTransactions::ReferenceId,
                CreditTransactions::ReferenceKind,
                CreditTransactions::Description,
                CreditTransactions::CreatedBy,
                CreditTransactions::CreatedAt,
            ])
            .from(CreditTransactions::Table)
            .and_where(Expr::col(CreditTransactions::TenantId).eq(tenant_id.to_string()))
            .order_by(CreditTransactions::CreatedAt, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(self.pool()).await?;

        let mut transactions = Vec::with_capacity(rows.len());
        for row in &rows {
            transactions.push(credit_transaction_from_row(row)?);
        }
        Ok(transactions)
    }

    async fn apply_points_delta(
        &self,
        tenant_id: Uuid,
        customer_id: &str,
        delta: i64,
        reference: &LedgerReference,
    ) -> Result<LedgerReceipt> {
        let mut conn = self.begin_immediate().await?;
        let result =
            apply_points_delta_tx(&mut conn, tenant_id, customer_id, delta, reference).await;
        finish_tx(&mut conn, result).await
    }

    async fn points_balance(&self, tenant_id: Uuid, customer_id: &str) -> Result<PointsBalance> {
        let query = Query::select()
            .columns([
                PointsBalances::Balance,
                PointsBalances::TotalEarned,
                PointsBalances::TotalSpent,
                PointsBalances::LastUpdated,
            ])
            .from(PointsBalances::Table)
            .and_where(Expr::col(PointsBalances::TenantId).eq(tenant_id.to_string()))
            .and_where(Expr::col(PointsBalances::CustomerId).eq(customer_id))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(self.pool()).await?;

        match row {
            Some(row) => Ok(PointsBalance {
                tenant_id,
                customer_id: customer_id.to_string(),
                balance: row.get("balance"),
                total_earned: row.get("total_earned"),
                total_spent: row.get("total_spent"),
                last_updated: parse_ts(&row.get::<String, _>("last_updated"))?,
            }),
            None => Ok(PointsBalance::empty(tenant_id, customer_id, Utc::now())),
        }
    }

    async fn points_transactions(
        &self,
        tenant_id: Uuid,
        customer_id: &str,
    ) -> Result<Vec<PointsTransaction>> {
        let query = Query::select()
            .columns([
                PointsTransactions::Id,
                PointsTransactions::TenantId,
                PointsTransactions::CustomerId,
                PointsTransactions::Kind,
                PointsTransactions::Amount,
                PointsTransactions::BalanceBefore,
                PointsTransactions::BalanceAfter,
                PointsTransactions::ReferenceId,
                PointsTransactions::ReferenceKind,
                PointsTransactions::Description,
                PointsTransactions::CreatedAt,
            ])
            .from(PointsTransactions::Table)
            .and_where(Expr::col(PointsTransactions::TenantId).eq(tenant_id.to_string()))
            .and_where(Expr::col(PointsTransactions::CustomerId).eq(customer_id))
            .order_by(PointsTransactions::CreatedAt, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(self.pool()).await?;

        let mut transactions = Vec::with_capacity(rows.len());
        for row in &rows {
            transactions.push(points_transaction_from_row(row)?);
        }
        Ok(transactions)
    }
}
