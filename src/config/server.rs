//! Listener and hub configuration types.

use serde::Deserialize;

use crate::hub::DEFAULT_OUTBOX_CAPACITY;

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port for the project/deploy/logs HTTP API.
    pub api_port: u16,
    /// Port for the realtime websocket endpoint.
    pub realtime_port: u16,
    /// Port for the preview proxy.
    pub proxy_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            api_port: 9000,
            realtime_port: 9002,
            proxy_port: 8000,
        }
    }
}

/// Realtime fanout hub configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Messages buffered per viewer connection before lines are dropped.
    pub outbox_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
        }
    }
}
