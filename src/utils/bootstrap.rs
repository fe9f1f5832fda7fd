//! Bootstrap utilities for shipyard binaries.
//!
//! Shared initialization code for the API and proxy binaries.

use std::future::Future;

use backon::Retryable;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LOG_ENV_VAR;
use crate::utils::retry::connection_backoff;

/// Initialize tracing with SHIPYARD_LOG environment variable.
///
/// Defaults to "info" level if SHIPYARD_LOG is not set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Run a startup connection attempt with exponential backoff retry.
///
/// # Arguments
/// * `service_name` - Human-readable name for logging (e.g., "log queue")
/// * `connect` - Async function that attempts to establish the connection
///
/// # Returns
/// The connection on success, or the last error once retries are exhausted.
pub async fn connect_with_retry<T, E, F, Fut>(service_name: &str, connect: F) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let result = connect
        .retry(connection_backoff())
        .notify(|e: &E, delay| {
            warn!(service = service_name, error = %e, ?delay, "Connection failed, retrying");
        })
        .await;

    match &result {
        Ok(_) => info!(service = service_name, "Connected"),
        Err(e) => error!(service = service_name, error = %e, "Giving up connecting"),
    }
    result
}
