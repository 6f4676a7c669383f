//! Outbox for guaranteed notification delivery.
//!
//! The transactional paths never wait on or fail with the webhook: the
//! flow is
//!
//! 1. Write the notification to the outbox table
//! 2. Attempt delivery through the inner [`Notifier`]
//! 3. Delete from the outbox on success
//!
//! If step 2 fails, the row remains in the outbox for the background
//! recovery task to re-attempt, up to a retry cap.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use sea_query::{Expr, Iden, Query, SqliteQueryBuilder};
use serde::Deserialize;
use sqlx::{Row, SqlitePool};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{Notification, Notifier};

/// Outbox table schema.
#[derive(Iden)]
enum Outbox {
    #[iden = "outbox_notifications"]
    Table,
    #[iden = "id"]
    Id,
    #[iden = "kind"]
    Kind,
    #[iden = "payload"]
    Payload,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "retry_count"]
    RetryCount,
}

const CREATE_OUTBOX_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS outbox_notifications (
    id TEXT NOT NULL PRIMARY KEY,
    kind TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_outbox_created_at ON outbox_notifications(created_at);
"#;

/// Outbox configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutboxConfig {
    /// Maximum retry attempts before a notification is abandoned.
    /// Default: 10.
    pub max_retries: u32,
    /// Interval in seconds for background recovery. Default: 5.
    pub recovery_interval_secs: u64,
    /// Age in seconds before an undelivered row is considered orphaned.
    /// Default: 30.
    pub orphan_age_secs: i64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            recovery_interval_secs: 5,
            orphan_age_secs: 30,
        }
    }
}

/// Outbox-backed notification dispatcher.
pub struct NotificationOutbox {
    pool: SqlitePool,
    notifier: Arc<dyn Notifier>,
    config: OutboxConfig,
}

impl NotificationOutbox {
    pub fn new(pool: SqlitePool, notifier: Arc<dyn Notifier>, config: OutboxConfig) -> Self {
        Self {
            pool,
            notifier,
            config,
        }
    }

    /// Initialize the outbox table schema.
    pub async fn init(&self) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(CREATE_OUTBOX_TABLE).execute(&self.pool).await?;
        info!("Outbox table initialized");
        Ok(())
    }

    /// Dispatch a notification: persist, attempt delivery, delete on
    /// success. Never fails the caller; all errors are logged.
    pub async fn dispatch(&self, notification: Notification) {
        if let Err(e) = self.insert(&notification).await {
            // Best-effort direct delivery when even the outbox write fails.
            error!(kind = %notification.kind, error = %e, "Failed to write notification to outbox");
            if let Err(e) = self.notifier.deliver(&notification).await {
                warn!(kind = %notification.kind, error = %e, "Direct notification delivery failed; notification lost");
            }
            return;
        }

        match self.notifier.deliver(&notification).await {
            Ok(()) => {
                if let Err(e) = self.delete(notification.id).await {
                    warn!(id = %notification.id, error = %e, "Failed to delete from outbox after successful delivery");
                } else {
                    debug!(id = %notification.id, kind = %notification.kind, "Notification delivered");
                }
            }
            Err(e) => {
                warn!(id = %notification.id, kind = %notification.kind, error = %e, "Notification delivery failed; left in outbox for recovery");
            }
        }
    }

    /// Re-attempt delivery of orphaned notifications.
    ///
    /// Call this periodically from a background task. Returns the number
    /// of notifications recovered.
    pub async fn recover_orphaned(&self) -> Result<u32, sqlx::Error> {
        let cutoff = (Utc::now() - ChronoDuration::seconds(self.config.orphan_age_secs))
            .to_rfc3339();

        let select = Query::select()
            .columns([
                Outbox::Id,
                Outbox::Kind,
                Outbox::Payload,
                Outbox::CreatedAt,
                Outbox::RetryCount,
            ])
            .from(Outbox::Table)
            .and_where(Expr::col(Outbox::CreatedAt).lt(cutoff))
            .and_where(Expr::col(Outbox::RetryCount).lt(self.config.max_retries as i64))
            .limit(100)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&select).fetch_all(&self.pool).await?;

        let mut recovered = 0u32;
        for row in rows {
            let id: String = row.get("id");
            let retry_count: i64 = row.get("retry_count");

            let notification = match self.notification_from_row(&row) {
                Ok(n) => n,
                Err(e) => {
                    error!(id = %id, error = %e, "Failed to decode orphaned notification, removing from outbox");
                    let delete = Query::delete()
                        .from_table(Outbox::Table)
                        .and_where(Expr::col(Outbox::Id).eq(id))
                        .to_string(SqliteQueryBuilder);
                    let _ = sqlx::query(&delete).execute(&self.pool).await;
                    continue;
                }
            };

            match self.notifier.deliver(&notification).await {
                Ok(()) => {
                    if let Err(e) = self.delete(notification.id).await {
                        error!(id = %id, error = %e, "Failed to delete recovered notification from outbox");
                    } else {
                        recovered += 1;
                        debug!(id = %id, "Recovered orphaned notification");
                    }
                }
                Err(e) => {
                    warn!(id = %id, retry_count = retry_count + 1, error = %e, "Failed to recover notification, incrementing retry count");
                    let update = Query::update()
                        .table(Outbox::Table)
                        .value(Outbox::RetryCount, retry_count + 1)
                        .and_where(Expr::col(Outbox::Id).eq(id))
                        .to_string(SqliteQueryBuilder);
                    let _ = sqlx::query(&update).execute(&self.pool).await;
                }
            }
        }

        if recovered > 0 {
            info!(recovered = recovered, "Recovered orphaned notifications from outbox");
        }

        Ok(recovered)
    }

    /// Number of undelivered rows; used by tests and health checks.
    pub async fn pending_count(&self) -> Result<i64, sqlx::Error> {
        let query = Query::select()
            .expr(Expr::col(Outbox::Id).count())
            .from(Outbox::Table)
            .to_string(SqliteQueryBuilder);
        let row = sqlx::query(&query).fetch_one(&self.pool).await?;
        Ok(row.get(0))
    }

    async fn insert(&self, notification: &Notification) -> Result<(), sqlx::Error> {
        let payload = notification.payload.to_string();
        let insert = Query::insert()
            .into_table(Outbox::Table)
            .columns([
                Outbox::Id,
                Outbox::Kind,
                Outbox::Payload,
                Outbox::CreatedAt,
            ])
            .values_panic([
                notification.id.to_string().into(),
                notification.kind.clone().into(),
                payload.into(),
                notification.created_at.to_rfc3339().into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&insert).execute(&self.pool).await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), sqlx::Error> {
        let delete = Query::delete()
            .from_table(Outbox::Table)
            .and_where(Expr::col(Outbox::Id).eq(id.to_string()))
            .to_string(SqliteQueryBuilder);
        sqlx::query(&delete).execute(&self.pool).await?;
        Ok(())
    }

    fn notification_from_row(
        &self,
        row: &sqlx::sqlite::SqliteRow,
    ) -> Result<Notification, Box<dyn std::error::Error + Send + Sync>> {
        let id = Uuid::parse_str(&row.get::<String, _>("id"))?;
        let payload: serde_json::Value = serde_json::from_str(&row.get::<String, _>("payload"))?;
        let created_at = chrono::DateTime::parse_from_rfc3339(&row.get::<String, _>("created_at"))?
            .with_timezone(&Utc);
        Ok(Notification {
            id,
            kind: row.get("kind"),
            payload,
            created_at,
        })
    }
}

/// Handle to a running recovery task.
pub struct RecoveryTaskHandle {
    cancel: tokio::sync::watch::Sender<bool>,
}

impl RecoveryTaskHandle {
    /// Signal the recovery task to stop.
    pub fn stop(&self) {
        let _ = self.cancel.send(true);
    }
}

/// Spawn a background task that periodically recovers orphaned
/// notifications. Returns a handle that can be used to stop the task.
pub fn spawn_recovery_task(
    outbox: Arc<NotificationOutbox>,
    interval_secs: u64,
) -> RecoveryTaskHandle {
    let (cancel_tx, mut cancel_rx) = tokio::sync::watch::channel(false);

    tokio::spawn(async move {
        let interval = std::time::Duration::from_secs(interval_secs);
        info!(interval_secs = interval_secs, "Outbox recovery task started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = outbox.recover_orphaned().await {
                        error!(error = %e, "Outbox recovery failed");
                    }
                }
                _ = cancel_rx.changed() => {
                    if *cancel_rx.borrow() {
                        info!("Outbox recovery task stopped");
                        break;
                    }
                }
            }
        }
    });

    RecoveryTaskHandle { cancel: cancel_tx }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbox_config_default() {
        let config = OutboxConfig::default();
        assert_eq!(config.max_retries, 10);
        assert_eq!(config.recovery_interval_secs, 5);
        assert_eq!(config.orphan_age_secs, 30);
    }
}
