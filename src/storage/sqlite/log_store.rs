//! SQLite LogStore implementation.

use async_trait::async_trait;
use sea_query::{Expr, Order, Query, SqliteQueryBuilder};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp};
use crate::storage::schema::{LogEvents, CREATE_LOG_EVENTS_INDEX, CREATE_LOG_EVENTS_TABLE};
use crate::storage::{LogEvent, LogStore, Result, StorageError};

/// SQLite implementation of LogStore.
pub struct SqliteLogStore {
    pool: SqlitePool,
}

impl SqliteLogStore {
    /// Create a new SQLite log store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the log table and its index if missing.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(CREATE_LOG_EVENTS_TABLE)
            .execute(&self.pool)
            .await?;
        sqlx::query(CREATE_LOG_EVENTS_INDEX)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl LogStore for SqliteLogStore {
    async fn append(&self, event: &LogEvent) -> Result<()> {
        let query = Query::insert()
            .into_table(LogEvents::Table)
            .columns([
                LogEvents::EventId,
                LogEvents::DeploymentId,
                LogEvents::ProjectId,
                LogEvents::Log,
                LogEvents::Timestamp,
            ])
            .values_panic([
                event.event_id.to_string().into(),
                event.deployment_id.as_str().into(),
                event.project_id.clone().into(),
                event.log.as_str().into(),
                format_timestamp(&event.timestamp).into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;

        Ok(())
    }

    async fn list_for_deployment(&self, deployment_id: &str) -> Result<Vec<LogEvent>> {
        let query = Query::select()
            .columns([
                LogEvents::EventId,
                LogEvents::DeploymentId,
                LogEvents::ProjectId,
                LogEvents::Log,
                LogEvents::Timestamp,
            ])
            .from(LogEvents::Table)
            .and_where(Expr::col(LogEvents::DeploymentId).eq(deployment_id))
            .order_by(LogEvents::Timestamp, Order::Desc)
            .order_by(LogEvents::Seq, Order::Desc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let event_id: String = row.get("event_id");
            let timestamp: String = row.get("timestamp");
            events.push(LogEvent {
                event_id: Uuid::parse_str(&event_id)?,
                deployment_id: row.get("deployment_id"),
                project_id: row.get("project_id"),
                log: row.get("log"),
                timestamp: parse_timestamp(&timestamp).map_err(|source| {
                    StorageError::InvalidTimestamp {
                        value: timestamp.clone(),
                        source,
                    }
                })?,
            });
        }

        Ok(events)
    }
}
