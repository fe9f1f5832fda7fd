//! Kafka record queue implementation.
//!
//! Build workers produce log records to one topic (default `container-logs`).
//! The consumer joins a consumer group with auto-commit disabled and splits
//! each partition of the topic into its own queue, so every partition gets an
//! independent consumer loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::topic_partition_list::{Offset, TopicPartitionList};
use rdkafka::ClientConfig;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::{PartitionSource, QueueError, QueueRecord, RecordQueue, Result};
use crate::config::KafkaConfig;

/// Timeout for metadata and seek calls.
const CONTROL_TIMEOUT: Duration = Duration::from_secs(10);

type PartitionQueue = rdkafka::consumer::stream_consumer::StreamPartitionQueue<
    rdkafka::consumer::DefaultConsumerContext,
>;

/// Build a ClientConfig for the log consumer.
pub(crate) fn build_consumer_config(config: &KafkaConfig) -> ClientConfig {
    let mut client = ClientConfig::new();
    client.set("bootstrap.servers", &config.bootstrap_servers);
    client.set("group.id", &config.group_id);
    client.set("enable.auto.commit", "false");
    client.set("auto.offset.reset", "earliest");
    client.set("session.timeout.ms", config.session_timeout_ms.to_string());

    if let Some(ref protocol) = config.security_protocol {
        client.set("security.protocol", protocol);
    }
    if let Some(ref mechanism) = config.sasl_mechanism {
        client.set("sasl.mechanism", mechanism);
    }
    if let Some(ref username) = config.sasl_username {
        client.set("sasl.username", username);
    }
    if let Some(ref password) = config.sasl_password {
        client.set("sasl.password", password);
    }
    if let Some(ref ca_location) = config.ssl_ca_location {
        client.set("ssl.ca.location", ca_location);
    }

    client
}

/// Kafka-backed record queue.
pub struct KafkaRecordQueue {
    consumer: Arc<StreamConsumer>,
    topic: String,
}

impl KafkaRecordQueue {
    /// Create the consumer and subscribe to the log topic.
    pub async fn new(config: &KafkaConfig) -> Result<Self> {
        let consumer: StreamConsumer = build_consumer_config(config)
            .create()
            .map_err(|e| QueueError::Connection(format!("Failed to create Kafka consumer: {}", e)))?;

        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(|e| QueueError::Connection(format!("Failed to subscribe: {}", e)))?;

        info!(
            bootstrap_servers = %config.bootstrap_servers,
            topic = %config.topic,
            group_id = %config.group_id,
            "Connected to Kafka"
        );

        Ok(Self {
            consumer: Arc::new(consumer),
            topic: config.topic.clone(),
        })
    }

    /// Give one partition its own message queue.
    fn split_partition(&self, id: i32) -> Result<KafkaPartition> {
        let queue = self
            .consumer
            .split_partition_queue(&self.topic, id)
            .ok_or_else(|| QueueError::Connection(format!("Failed to split partition {}", id)))?;
        Ok(KafkaPartition {
            consumer: Arc::clone(&self.consumer),
            queue,
            topic: self.topic.clone(),
            partition: id,
        })
    }

    async fn partition_ids(&self) -> Result<Vec<i32>> {
        let consumer = Arc::clone(&self.consumer);
        let topic = self.topic.clone();

        tokio::task::spawn_blocking(move || {
            let metadata = consumer
                .fetch_metadata(Some(&topic), CONTROL_TIMEOUT)
                .map_err(|e| QueueError::Connection(format!("Failed to fetch metadata: {}", e)))?;
            let ids = metadata
                .topics()
                .iter()
                .filter(|t| t.name() == topic)
                .flat_map(|t| t.partitions().iter().map(|p| p.id()))
                .collect::<Vec<_>>();
            Ok(ids)
        })
        .await
        .map_err(|e| QueueError::Connection(format!("Metadata task failed: {}", e)))?
    }
}

#[async_trait]
impl RecordQueue for KafkaRecordQueue {
    async fn partitions(&self) -> Result<Vec<Arc<dyn PartitionSource>>> {
        let ids = self.partition_ids().await?;
        if ids.is_empty() {
            return Err(QueueError::Connection(format!(
                "Topic '{}' has no partitions",
                self.topic
            )));
        }

        let mut sources: Vec<Arc<dyn PartitionSource>> = Vec::with_capacity(ids.len());
        for id in ids {
            sources.push(Arc::new(self.split_partition(id)?));
        }

        // The main consumer must keep being polled for group membership and
        // rebalance callbacks once partition queues are split off.
        let consumer = Arc::clone(&self.consumer);
        tokio::spawn(async move {
            loop {
                match consumer.recv().await {
                    Ok(message) => warn!(
                        topic = %message.topic(),
                        partition = message.partition(),
                        "Message arrived on main consumer queue"
                    ),
                    Err(e) => error!(error = %e, "Kafka consumer error"),
                }
            }
        });

        info!(topic = %self.topic, partitions = sources.len(), "Kafka partitions split");
        Ok(sources)
    }
}

/// One Kafka partition with its own message queue.
pub struct KafkaPartition {
    consumer: Arc<StreamConsumer>,
    queue: PartitionQueue,
    topic: String,
    partition: i32,
}

#[async_trait]
impl PartitionSource for KafkaPartition {
    fn partition(&self) -> i32 {
        self.partition
    }

    async fn poll_batch(&self, max: usize, timeout: Duration) -> Result<Vec<QueueRecord>> {
        let deadline = Instant::now() + timeout;
        let mut batch = Vec::new();

        while batch.len() < max.max(1) {
            let message = match tokio::time::timeout_at(deadline, self.queue.recv()).await {
                Ok(Ok(message)) => message,
                Ok(Err(e)) => {
                    if batch.is_empty() {
                        return Err(QueueError::Poll(e.to_string()));
                    }
                    warn!(partition = self.partition, error = %e, "Poll error mid-batch");
                    break;
                }
                Err(_) => break,
            };

            batch.push(QueueRecord {
                partition: message.partition(),
                offset: message.offset(),
                key: message.key().map(|k| k.to_vec()),
                payload: message.payload().map(|p| p.to_vec()),
            });
        }

        debug!(partition = self.partition, count = batch.len(), "Polled batch");
        Ok(batch)
    }

    async fn commit(&self, next_offset: i64) -> Result<()> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&self.topic, self.partition, Offset::Offset(next_offset))
            .map_err(|e| QueueError::Commit(e.to_string()))?;
        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| QueueError::Commit(e.to_string()))
    }

    async fn seek(&self, offset: i64) -> Result<()> {
        // librdkafka blocks for up to CONTROL_TIMEOUT here.
        let consumer = Arc::clone(&self.consumer);
        let topic = self.topic.clone();
        let partition = self.partition;

        tokio::task::spawn_blocking(move || {
            consumer
                .seek(&topic, partition, Offset::Offset(offset), CONTROL_TIMEOUT)
                .map_err(|e| QueueError::Seek(e.to_string()))
        })
        .await
        .map_err(|e| QueueError::Seek(format!("Seek task failed: {}", e)))?
    }

    async fn heartbeat(&self) -> Result<()> {
        // librdkafka sends group heartbeats from its own thread; losing the
        // assignment is what this surfaces.
        let assignment = self
            .consumer
            .assignment()
            .map_err(|e| QueueError::Connection(e.to_string()))?;
        if assignment.find_partition(&self.topic, self.partition).is_none() {
            warn!(partition = self.partition, "Partition no longer assigned");
        }
        Ok(())
    }
}
