//! Storage implementations.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::{error, info};

pub mod schema;
pub mod sqlite;

pub use sqlite::SqliteStore;

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type discriminator. Only "sqlite" is supported.
    #[serde(rename = "type")]
    pub storage_type: String,
    /// Database file path.
    pub path: String,
    /// Bound on lock waits; an expired wait surfaces as a retryable
    /// storage error after the transaction rolls back.
    pub busy_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: "sqlite".to_string(),
            path: "data/tally.db".to_string(),
            busy_timeout_secs: 5,
        }
    }
}

/// Initialize storage based on configuration.
///
/// Creates the database file and schema if missing and returns the store.
pub async fn init_storage(
    config: &StorageConfig,
) -> Result<Arc<SqliteStore>, Box<dyn std::error::Error + Send + Sync>> {
    info!("Storage: {} at {}", config.storage_type, config.path);

    match config.storage_type.as_str() {
        "sqlite" => {
            if let Some(parent) = std::path::Path::new(&config.path).parent() {
                std::fs::create_dir_all(parent)?;
            }

            let options = SqliteConnectOptions::new()
                .filename(&config.path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_secs(config.busy_timeout_secs));

            let pool = SqlitePoolOptions::new().connect_with(options).await?;

            let store = Arc::new(SqliteStore::new(pool));
            store.init().await?;

            Ok(store)
        }
        other => {
            error!("Unknown storage type: {}", other);
            Err(format!("Unknown storage type: {}", other).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_default() {
        let config = StorageConfig::default();
        assert_eq!(config.storage_type, "sqlite");
        assert_eq!(config.path, "data/tally.db");
        assert_eq!(config.busy_timeout_secs, 5);
    }
}
