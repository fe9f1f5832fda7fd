//! Log ingestion consumer.
//!
//! Drains the log record queue one partition at a time. For each record the
//! line is published to the fanout hub first (live viewers see it with
//! minimal latency), then persisted; only persisted records advance the
//! committed offset.
//!
//! ## Failure handling
//! - Malformed record: logged and skipped. It counts as resolved, since
//!   redelivery can never fix it.
//! - Persistence failure: logged, and the batch carries on with the next
//!   record. No offset at or beyond the first failure is committed; after the
//!   batch the partition is rewound to the failed record and the loop backs
//!   off before polling again. Records after the failure are persisted again
//!   on redelivery, so the store may hold duplicates (at-least-once).

use std::sync::Arc;
use std::time::Duration;

use backon::BackoffBuilder;
use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ConsumerConfig;
use crate::hub::FanoutHub;
use crate::queue::{PartitionSource, QueueRecord};
use crate::storage::{LogEvent, LogStore, StorageError};
use crate::utils::retry::consumer_backoff;

/// Errors raised while ingesting a single record.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Malformed record at {partition}/{offset}: {reason}")]
    MalformedRecord {
        partition: i32,
        offset: i64,
        reason: String,
    },

    #[error("Failed to persist record at {partition}/{offset}: {source}")]
    Persist {
        partition: i32,
        offset: i64,
        #[source]
        source: StorageError,
    },
}

/// Queue payload written by build workers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LogRecord {
    #[serde(rename = "PROJECT_ID", default)]
    pub project_id: Option<String>,
    #[serde(rename = "DEPLOYMENT_ID", default)]
    pub deployment_id: Option<String>,
    #[serde(default)]
    pub log: Option<String>,
}

/// A record that passed parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRecord {
    pub project_id: Option<String>,
    pub deployment_id: String,
    pub log: String,
}

/// Parse a queue record's payload.
pub fn parse_record(record: &QueueRecord) -> Result<ParsedRecord, IngestError> {
    let malformed = |reason: String| IngestError::MalformedRecord {
        partition: record.partition,
        offset: record.offset,
        reason,
    };

    let payload = record
        .payload
        .as_deref()
        .ok_or_else(|| malformed("empty payload".to_string()))?;

    let parsed: LogRecord =
        serde_json::from_slice(payload).map_err(|e| malformed(format!("invalid JSON: {}", e)))?;

    let deployment_id = parsed
        .deployment_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| malformed("missing DEPLOYMENT_ID".to_string()))?;
    let log = parsed
        .log
        .ok_or_else(|| malformed("missing log".to_string()))?;

    Ok(ParsedRecord {
        project_id: parsed.project_id.filter(|id| !id.is_empty()),
        deployment_id,
        log,
    })
}

/// What happened to one batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub persisted: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Offset committed after the batch (next offset to read).
    pub committed: Option<i64>,
    /// Offset the partition was rewound to after a persistence failure.
    pub rewound_to: Option<i64>,
}

/// Consumer that moves log records from the queue into the store and hub.
pub struct LogConsumer {
    store: Arc<dyn LogStore>,
    hub: Arc<FanoutHub>,
    config: ConsumerConfig,
}

impl LogConsumer {
    pub fn new(store: Arc<dyn LogStore>, hub: Arc<FanoutHub>, config: ConsumerConfig) -> Self {
        Self { store, hub, config }
    }

    /// Process one batch from `source`, commit what was persisted and
    /// heartbeat.
    #[tracing::instrument(
        name = "ingest.batch",
        skip_all,
        fields(partition = source.partition(), size = records.len())
    )]
    pub async fn process_batch(
        &self,
        source: &dyn PartitionSource,
        records: Vec<QueueRecord>,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let mut resolved: Option<i64> = None;
        let mut first_failure: Option<i64> = None;

        for record in &records {
            let offset = record.offset;

            let parsed = match parse_record(record) {
                Ok(parsed) => parsed,
                Err(e) => {
                    error!(error = %e, "Skipping malformed log record");
                    outcome.skipped += 1;
                    if first_failure.is_none() {
                        resolved = Some(offset + 1);
                    }
                    continue;
                }
            };

            self.hub.publish(&parsed.deployment_id, &parsed.log).await;

            let event = LogEvent::ingested(parsed.deployment_id, parsed.project_id, parsed.log);
            match self.store.append(&event).await {
                Ok(()) => {
                    outcome.persisted += 1;
                    if first_failure.is_none() {
                        resolved = Some(offset + 1);
                    }
                    debug!(
                        offset,
                        deployment_id = %event.deployment_id,
                        event_id = %event.event_id,
                        "Log event persisted"
                    );
                }
                Err(source_error) => {
                    let e = IngestError::Persist {
                        partition: record.partition,
                        offset,
                        source: source_error,
                    };
                    error!(error = %e, "Persistence failed, offset not advanced");
                    outcome.failed += 1;
                    first_failure.get_or_insert(offset);
                }
            }
        }

        if let Some(next_offset) = resolved {
            match source.commit(next_offset).await {
                Ok(()) => outcome.committed = Some(next_offset),
                Err(e) => error!(error = %e, next_offset, "Offset commit failed"),
            }
        }

        if let Err(e) = source.heartbeat().await {
            warn!(error = %e, "Heartbeat failed");
        }

        if let Some(offset) = first_failure {
            match source.seek(offset).await {
                Ok(()) => outcome.rewound_to = Some(offset),
                Err(e) => error!(error = %e, offset, "Failed to rewind partition"),
            }
        }

        outcome
    }

    /// Run the consumer loop for one partition until shutdown.
    ///
    /// Shutdown is only observed between batches, so an in-flight batch is
    /// always finished and committed first.
    pub async fn run_partition(
        &self,
        source: Arc<dyn PartitionSource>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let partition = source.partition();
        let backoff_builder = consumer_backoff(&self.config);
        let mut backoff = backoff_builder.build();
        let max_delay = Duration::from_millis(self.config.backoff_max_ms);
        let poll_timeout = Duration::from_millis(self.config.poll_timeout_ms);

        info!(partition, "Log consumer started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let polled = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                polled = source.poll_batch(self.config.batch_size, poll_timeout) => polled,
            };

            let delay = match polled {
                Ok(records) if records.is_empty() => continue,
                Ok(records) => {
                    let outcome = self.process_batch(source.as_ref(), records).await;
                    if outcome.rewound_to.is_none() {
                        backoff = backoff_builder.build();
                        continue;
                    }
                    backoff.next().unwrap_or(max_delay)
                }
                Err(e) => {
                    error!(partition, error = %e, "Poll failed");
                    backoff.next().unwrap_or(max_delay)
                }
            };

            warn!(partition, delay_ms = %delay.as_millis(), "Backing off before next poll");
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!(partition, "Log consumer stopped");
    }

    /// Spawn one consumer loop per partition.
    pub fn spawn(self: Arc<Self>, sources: Vec<Arc<dyn PartitionSource>>) -> ConsumerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let tasks = sources
            .into_iter()
            .map(|source| {
                let consumer = Arc::clone(&self);
                let shutdown = shutdown_rx.clone();
                tokio::spawn(async move { consumer.run_partition(source, shutdown).await })
            })
            .collect();

        ConsumerHandle {
            shutdown: shutdown_tx,
            tasks,
        }
    }
}

/// Handle to running consumer loops.
pub struct ConsumerHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ConsumerHandle {
    /// Stop polling, let in-flight batches finish, and wait for every loop.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Consumer task panicked");
            }
        }
        info!("Log consumers shut down");
    }
}
