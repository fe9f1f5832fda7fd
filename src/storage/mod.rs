//! Storage implementations.
//!
//! This module contains:
//! - `LogStore` trait: append-only persistence of build log lines
//! - SQLite implementations of `LogStore` and `RegistryStore`
//! - In-memory mocks with failure injection for tests

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::info;
use uuid::Uuid;

use crate::config::{StorageConfig, StorageType};
use crate::registry::RegistryStore;

pub mod mock;
pub mod schema;
pub mod sqlite;

pub use mock::{MockLogStore, MockRegistryStore};
pub use sqlite::{SqliteLogStore, SqliteRegistryStore};

/// Result type for log store operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during log store operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid timestamp '{value}': {source}")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// One persisted, timestamped log line tied to a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub event_id: Uuid,
    pub deployment_id: String,
    #[serde(skip)]
    pub project_id: Option<String>,
    pub log: String,
    pub timestamp: DateTime<Utc>,
}

impl LogEvent {
    /// Stamp a line at ingestion time with a fresh event id.
    ///
    /// The id is never taken from the producer, so a redelivered record
    /// becomes a second, distinct event.
    pub fn ingested(
        deployment_id: impl Into<String>,
        project_id: Option<String>,
        log: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            deployment_id: deployment_id.into(),
            project_id,
            log: log.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Interface for log line persistence.
///
/// Implementations:
/// - `SqliteLogStore`: SQLite storage
/// - `MockLogStore`: In-memory mock for testing
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Append a log event. Events are never updated or deleted.
    async fn append(&self, event: &LogEvent) -> Result<()>;

    /// All events for a deployment, newest first.
    ///
    /// Events with equal timestamps come back in reverse insertion order.
    async fn list_for_deployment(&self, deployment_id: &str) -> Result<Vec<LogEvent>>;
}

/// Initialize storage based on configuration.
///
/// Returns the log store and registry store, sharing one connection pool
/// for SQLite.
pub async fn init_storage(
    config: &StorageConfig,
) -> std::result::Result<
    (Arc<dyn LogStore>, Arc<dyn RegistryStore>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    match config.storage_type {
        StorageType::Sqlite => {
            let path = &config.sqlite.path;
            info!(path = %path, "Storage: sqlite");

            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .foreign_keys(true);
            let pool = SqlitePoolOptions::new()
                .max_connections(config.sqlite.max_connections)
                .connect_with(options)
                .await?;

            let log_store = SqliteLogStore::new(pool.clone());
            log_store.init().await?;

            let registry_store = SqliteRegistryStore::new(pool);
            registry_store.init().await?;

            Ok((Arc::new(log_store), Arc::new(registry_store)))
        }
        StorageType::Memory => {
            info!("Storage: in-memory (data is lost on exit)");
            Ok((
                Arc::new(MockLogStore::new()),
                Arc::new(MockRegistryStore::new()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SqliteConfig;

    #[tokio::test]
    async fn test_init_sqlite_storage_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("shipyard.db");
        let config = StorageConfig {
            storage_type: StorageType::Sqlite,
            sqlite: SqliteConfig {
                path: path.to_string_lossy().to_string(),
                max_connections: 2,
            },
        };

        let (logs, _registry) = init_storage(&config).await.unwrap();
        logs.append(&LogEvent::ingested("dep-1", None, "hello"))
            .await
            .unwrap();

        assert!(path.exists());
        assert_eq!(logs.list_for_deployment("dep-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_init_memory_storage() {
        let config = StorageConfig {
            storage_type: StorageType::Memory,
            ..StorageConfig::default()
        };
        let (logs, _registry) = init_storage(&config).await.unwrap();
        assert!(logs.list_for_deployment("none").await.unwrap().is_empty());
    }

    #[test]
    fn test_ingested_event_ids_are_unique() {
        let a = LogEvent::ingested("dep", None, "same line");
        let b = LogEvent::ingested("dep", None, "same line");
        assert_ne!(a.event_id, b.event_id);
    }
}
