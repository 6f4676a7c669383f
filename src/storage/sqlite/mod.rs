//! SQLite implementations of the storage interfaces.
//!
//! One `SqliteStore` implements every trait; the impls live in one file per
//! concern. All mutating paths run under `BEGIN IMMEDIATE` so the SQLite
//! write lock serializes balance and coupon races.

mod access;
mod coupons;
mod ledger;
mod requests;
mod scans;

use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection, SqlitePool};

use crate::error::Result;
use crate::storage::schema::{
    CREATE_ACCESS_TABLES, CREATE_COUPON_TABLES, CREATE_LEDGER_TABLES, CREATE_REQUEST_TABLES,
};

/// SQLite-backed store implementing all storage interfaces.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new store over an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the schema if it does not exist.
    pub async fn init(&self) -> Result<()> {
        for ddl in [
            CREATE_LEDGER_TABLES,
            CREATE_REQUEST_TABLES,
            CREATE_COUPON_TABLES,
            CREATE_ACCESS_TABLES,
        ] {
            sqlx::raw_sql(ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// The underlying pool, for wiring collaborators (outbox) off the same
    /// database.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a write transaction.
    ///
    /// BEGIN IMMEDIATE acquires the write lock upfront, preventing deadlocks
    /// when concurrent DEFERRED transactions race to upgrade from shared to
    /// exclusive. Callers must finish with [`commit`] or [`rollback`].
    pub(crate) async fn begin_immediate(&self) -> Result<PoolConnection<Sqlite>> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(conn)
    }
}

/// Commit on success, roll back on failure, passing the result through.
pub(crate) async fn finish_tx<T>(conn: &mut SqliteConnection, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            sqlx::query("COMMIT").execute(&mut *conn).await?;
            Ok(value)
        }
        Err(e) => {
            let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
            Err(e)
        }
    }
}

/// Parse an RFC 3339 TEXT column back into a UTC timestamp.
pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

/// Parse an optional RFC 3339 TEXT column.
pub(crate) fn parse_ts_opt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.as_deref().map(parse_ts).transpose()
}

/// True when the error is a unique-constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.kind() == sqlx::error::ErrorKind::UniqueViolation
    )
}
