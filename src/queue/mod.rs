//! Log Record Queue, consumer side.
//!
//! This module contains:
//! - `PartitionSource` trait: one assigned partition of the queue
//! - `RecordQueue` trait: hands out the partitions assigned to this process
//! - Implementations: in-memory partitioned queue, Kafka (`kafka` feature)
//!
//! Offsets follow the Kafka convention: a committed offset is the offset of
//! the next record to read.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::config::{MessagingConfig, MessagingType};

pub mod channel;
#[cfg(feature = "kafka")]
pub mod kafka;

pub use channel::{MemoryPartition, MemoryQueue};
#[cfg(feature = "kafka")]
pub use kafka::{KafkaPartition, KafkaRecordQueue};

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors that can occur during queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Poll failed: {0}")]
    Poll(String),

    #[error("Commit failed: {0}")]
    Commit(String),

    #[error("Seek failed: {0}")]
    Seek(String),

    #[error("Unknown partition: {0}")]
    UnknownPartition(i32),
}

/// One record as delivered by the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRecord {
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Option<Vec<u8>>,
}

/// A single assigned partition.
///
/// Records are delivered in offset order. All methods are called from the
/// one consumer loop that owns the partition.
#[async_trait]
pub trait PartitionSource: Send + Sync {
    /// Partition number.
    fn partition(&self) -> i32;

    /// Wait up to `timeout` for records and return at most `max` of them.
    ///
    /// An empty batch means the timeout elapsed. Must be cancellation safe:
    /// dropping the future before it resolves loses no records.
    async fn poll_batch(&self, max: usize, timeout: Duration) -> Result<Vec<QueueRecord>>;

    /// Commit `next_offset` as the position to resume from after a restart.
    async fn commit(&self, next_offset: i64) -> Result<()>;

    /// Move the read position so that `offset` is delivered again.
    async fn seek(&self, offset: i64) -> Result<()>;

    /// Tell the queue coordinator this consumer is alive.
    async fn heartbeat(&self) -> Result<()>;
}

/// Source of partition assignments.
#[async_trait]
pub trait RecordQueue: Send + Sync {
    /// Partitions assigned to this consumer.
    async fn partitions(&self) -> Result<Vec<Arc<dyn PartitionSource>>>;
}

/// Initialize the record queue based on configuration.
///
/// Requires the corresponding feature to be enabled:
/// - Channel: always available
/// - Kafka: `--features kafka`
pub async fn init_record_queue(
    config: &MessagingConfig,
) -> std::result::Result<Arc<dyn RecordQueue>, Box<dyn std::error::Error + Send + Sync>> {
    match config.messaging_type {
        MessagingType::Channel => {
            let queue = MemoryQueue::new(config.channel.partitions);
            info!(
                messaging_type = "channel",
                partitions = config.channel.partitions,
                "Record queue initialized (in-memory, no external producers)"
            );
            Ok(Arc::new(queue))
        }
        MessagingType::Kafka => {
            #[cfg(feature = "kafka")]
            {
                let queue = KafkaRecordQueue::new(&config.kafka).await?;
                info!(messaging_type = "kafka", "Record queue initialized");
                Ok(Arc::new(queue))
            }

            #[cfg(not(feature = "kafka"))]
            {
                Err("Kafka support requires the 'kafka' feature. Rebuild with --features kafka".into())
            }
        }
    }
}
