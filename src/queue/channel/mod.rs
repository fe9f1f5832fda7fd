//! In-memory partitioned record queue for standalone mode.
//!
//! Keeps every record for the life of the process so that seeks and restarts
//! from the committed offset redeliver exactly like a durable log would.
//! Ideal for local development and testing without external dependencies.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::debug;

use super::{PartitionSource, QueueError, QueueRecord, RecordQueue, Result};

#[derive(Default)]
struct PartitionState {
    records: Vec<QueueRecord>,
    /// Offset of the next record to deliver.
    position: i64,
    committed: Option<i64>,
    commits: Vec<i64>,
    heartbeats: u64,
}

/// One partition of a [`MemoryQueue`].
pub struct MemoryPartition {
    id: i32,
    state: Mutex<PartitionState>,
    notify: Notify,
}

impl MemoryPartition {
    fn new(id: i32) -> Self {
        Self {
            id,
            state: Mutex::new(PartitionState::default()),
            notify: Notify::new(),
        }
    }

    /// Append a record and return its offset.
    pub async fn produce(&self, key: Option<Vec<u8>>, payload: Option<Vec<u8>>) -> i64 {
        let offset = {
            let mut state = self.state.lock().await;
            let offset = state.records.len() as i64;
            state.records.push(QueueRecord {
                partition: self.id,
                offset,
                key,
                payload,
            });
            offset
        };
        self.notify.notify_waiters();
        offset
    }

    /// Last committed offset, if any.
    pub async fn committed(&self) -> Option<i64> {
        self.state.lock().await.committed
    }

    /// Every commit in order.
    pub async fn commit_history(&self) -> Vec<i64> {
        self.state.lock().await.commits.clone()
    }

    pub async fn heartbeats(&self) -> u64 {
        self.state.lock().await.heartbeats
    }

    /// Offset of the next record to be delivered.
    pub async fn position(&self) -> i64 {
        self.state.lock().await.position
    }

    /// Rewind to the committed offset, as a restarted consumer would.
    pub async fn reset_to_committed(&self) {
        let mut state = self.state.lock().await;
        state.position = state.committed.unwrap_or(0);
    }
}

#[async_trait]
impl PartitionSource for MemoryPartition {
    fn partition(&self) -> i32 {
        self.id
    }

    async fn poll_batch(&self, max: usize, timeout: Duration) -> Result<Vec<QueueRecord>> {
        let deadline = Instant::now() + timeout;

        loop {
            // Register interest before checking so a produce between the
            // check and the wait is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                let start = state.position as usize;
                if start < state.records.len() {
                    let end = (start + max.max(1)).min(state.records.len());
                    let batch = state.records[start..end].to_vec();
                    state.position = end as i64;
                    debug!(partition = self.id, count = batch.len(), "Polled batch");
                    return Ok(batch);
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn commit(&self, next_offset: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        state.committed = Some(next_offset);
        state.commits.push(next_offset);
        Ok(())
    }

    async fn seek(&self, offset: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        if offset < 0 || offset > state.records.len() as i64 {
            return Err(QueueError::Seek(format!(
                "offset {} out of range for partition {}",
                offset, self.id
            )));
        }
        state.position = offset;
        Ok(())
    }

    async fn heartbeat(&self) -> Result<()> {
        self.state.lock().await.heartbeats += 1;
        Ok(())
    }
}

/// In-memory partitioned queue.
///
/// Records with the same key always land in the same partition.
pub struct MemoryQueue {
    partitions: Vec<Arc<MemoryPartition>>,
}

impl MemoryQueue {
    /// Create a queue with `partitions` partitions (at least one).
    pub fn new(partitions: usize) -> Self {
        Self {
            partitions: (0..partitions.max(1) as i32)
                .map(|id| Arc::new(MemoryPartition::new(id)))
                .collect(),
        }
    }

    pub fn partition(&self, id: i32) -> Option<Arc<MemoryPartition>> {
        self.partitions.get(usize::try_from(id).ok()?).cloned()
    }

    /// Partition a key maps to.
    pub fn partition_for_key(&self, key: &str) -> i32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.partitions.len() as u64) as i32
    }

    /// Append a keyed record. Returns `(partition, offset)`.
    pub async fn produce(&self, key: &str, payload: impl Into<Vec<u8>>) -> (i32, i64) {
        let partition = self.partition_for_key(key);
        let offset = self.partitions[partition as usize]
            .produce(Some(key.as_bytes().to_vec()), Some(payload.into()))
            .await;
        (partition, offset)
    }

    /// Append a record to an explicit partition.
    pub async fn produce_to(&self, partition: i32, payload: Option<Vec<u8>>) -> Result<i64> {
        let target = self
            .partition(partition)
            .ok_or(QueueError::UnknownPartition(partition))?;
        Ok(target.produce(None, payload).await)
    }
}

#[async_trait]
impl RecordQueue for MemoryQueue {
    async fn partitions(&self) -> Result<Vec<Arc<dyn PartitionSource>>> {
        Ok(self
            .partitions
            .iter()
            .map(|p| Arc::clone(p) as Arc<dyn PartitionSource>)
            .collect())
    }
}

#[cfg(test)]
mod tests;
