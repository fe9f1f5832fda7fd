//! HTTP build scheduler.
//!
//! POSTs the task as JSON to a runner endpoint. Dispatch is never retried: a
//! request that timed out may still have launched a build.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error};

use super::{BuildScheduler, BuildTask, Result, SchedulerError, TaskHandle};
use crate::config::HttpSchedulerConfig;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DispatchResponse {
    task_id: Option<String>,
}

/// Scheduler backed by an HTTP runner service.
pub struct HttpScheduler {
    client: Client,
    endpoint: String,
}

impl HttpScheduler {
    /// Create a scheduler posting to `config.endpoint`.
    pub fn new(config: &HttpSchedulerConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| SchedulerError::Config("HTTP scheduler endpoint not set".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl BuildScheduler for HttpScheduler {
    #[tracing::instrument(name = "scheduler.http.dispatch", skip_all, fields(deployment_id = %task.deployment_id))]
    async fn dispatch(&self, task: &BuildTask) -> Result<TaskHandle> {
        let response = self.client.post(&self.endpoint).json(task).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(endpoint = %self.endpoint, status = %status, body = %body, "Build dispatch failed");
            return Err(SchedulerError::Rejected(format!(
                "HTTP {} - {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let body = response.bytes().await?;
        let task_id = serde_json::from_slice::<DispatchResponse>(&body)
            .ok()
            .and_then(|r| r.task_id)
            .unwrap_or_else(|| task.deployment_id.clone());

        debug!(endpoint = %self.endpoint, task_id = %task_id, "Build dispatched");
        Ok(TaskHandle { task_id })
    }

    fn name(&self) -> &str {
        "http"
    }
}
