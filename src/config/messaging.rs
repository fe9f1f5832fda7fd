//! Log record queue and consumer configuration types.

use serde::Deserialize;

/// Messaging type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagingType {
    /// In-process partitioned queue (no external broker).
    #[default]
    Channel,
    /// Kafka topic (requires the `kafka` feature).
    Kafka,
}

/// Messaging configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Messaging type discriminator.
    #[serde(rename = "type")]
    pub messaging_type: MessagingType,
    /// In-process queue configuration.
    pub channel: ChannelQueueConfig,
    /// Kafka-specific configuration.
    pub kafka: KafkaConfig,
    /// Consumer loop tuning, shared by every queue type.
    pub consumer: ConsumerConfig,
}

/// In-process queue configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChannelQueueConfig {
    /// Number of partitions.
    pub partitions: usize,
}

impl Default for ChannelQueueConfig {
    fn default() -> Self {
        Self { partitions: 1 }
    }
}

/// Kafka-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    /// Comma-separated broker list.
    pub bootstrap_servers: String,
    /// Topic build workers produce log records to.
    pub topic: String,
    /// Consumer group id.
    pub group_id: String,
    /// Group session timeout.
    pub session_timeout_ms: u32,
    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,
    /// SASL mechanism (e.g. PLAIN, SCRAM-SHA-256).
    pub sasl_mechanism: Option<String>,
    /// Security protocol (e.g. SASL_SSL).
    pub security_protocol: Option<String>,
    /// CA certificate file for TLS.
    pub ssl_ca_location: Option<String>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            topic: "container-logs".to_string(),
            group_id: "api-server-logs-consumer".to_string(),
            session_timeout_ms: 30_000,
            sasl_username: None,
            sasl_password: None,
            sasl_mechanism: None,
            security_protocol: None,
            ssl_ca_location: None,
        }
    }
}

/// Consumer loop tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Maximum records per batch.
    pub batch_size: usize,
    /// How long one poll waits for records.
    pub poll_timeout_ms: u64,
    /// First backoff delay after a failed batch.
    pub backoff_min_ms: u64,
    /// Backoff ceiling.
    pub backoff_max_ms: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            poll_timeout_ms: 1_000,
            backoff_min_ms: 100,
            backoff_max_ms: 10_000,
        }
    }
}
