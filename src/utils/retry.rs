//! Retry utilities: backoff builders.
//!
//! Uses `backon` for exponential backoff with jitter.

use std::time::Duration;

use backon::ExponentialBuilder;

use crate::config::ConsumerConfig;

/// Backoff between polls after a batch failed to persist.
///
/// Bounds come from the consumer configuration. Callers keep using the
/// ceiling once the attempts are exhausted, so the consumer never gives up.
pub fn consumer_backoff(config: &ConsumerConfig) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(config.backoff_min_ms))
        .with_max_delay(Duration::from_millis(
            config.backoff_max_ms.max(config.backoff_min_ms),
        ))
        .with_max_times(10)
        .with_jitter()
}

/// Backoff for connection retries at startup.
///
/// - Min delay: 100ms
/// - Max delay: 5s
/// - Max attempts: 30
/// - Jitter enabled
pub fn connection_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(30)
        .with_jitter()
}
