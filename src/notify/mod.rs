//! Outbound notifications.
//!
//! Credit request resolutions and batch print/activate events emit
//! fire-and-forget notifications. Delivery failures are logged, never
//! surfaced as the operation's result; the [`outbox`] decouples delivery
//! from the transactional paths.

pub mod outbox;

use std::sync::Arc;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

pub use outbox::{spawn_recovery_task, NotificationOutbox, OutboxConfig, RecoveryTaskHandle};

/// Result type for delivery attempts.
pub type Result<T> = std::result::Result<T, NotifyError>;

/// Errors that can occur delivering a notification.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook returned status {code}")]
    Status { code: u16 },
}

/// One outbound notification: a kind plus an arbitrary JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub kind: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            payload,
            created_at: Utc::now(),
        }
    }
}

/// Interface for notification delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<()>;
}

/// Notifier configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Webhook endpoint. When unset, notifications are logged and dropped.
    pub webhook_url: Option<String>,
    /// Outbox configuration.
    pub outbox: OutboxConfig,
}

/// Build the configured notifier: webhook when a URL is set, noop
/// otherwise.
pub fn init_notifier(config: &NotifierConfig) -> Arc<dyn Notifier> {
    match &config.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => Arc::new(NoopNotifier),
    }
}

/// Delivers notifications as JSON POSTs with exponential-backoff retry on
/// connection errors. Non-2xx responses are not retried inline; the outbox
/// recovery task re-attempts those.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        let send = || async {
            let response = self
                .client
                .post(&self.url)
                .json(notification)
                .send()
                .await?;
            if response.status().is_success() {
                Ok(())
            } else {
                Err(NotifyError::Status {
                    code: response.status().as_u16(),
                })
            }
        };

        send.retry(ExponentialBuilder::default())
            .when(|e| matches!(e, NotifyError::Http(_)))
            .await
    }
}

/// Discards notifications after logging them. Used when no webhook is
/// configured.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        debug!(kind = %notification.kind, "Notification dropped (no webhook configured)");
        Ok(())
    }
}

/// Collects notifications in memory. Test double.
#[derive(Default)]
pub struct MemoryNotifier {
    delivered: std::sync::Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered.lock().expect("notifier mutex poisoned").clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        self.delivered
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification.clone());
        Ok(())
    }
}
