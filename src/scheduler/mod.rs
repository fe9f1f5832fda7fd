//! Build task dispatch.
//!
//! This module contains:
//! - `BuildScheduler` trait: launches the build worker for a deployment
//! - Implementations: no-op (local development), HTTP, ECS Fargate (`ecs` feature)
//! - `MockScheduler`: records dispatched tasks for tests
//!
//! The worker receives the repository URL and both ids, builds the project,
//! uploads artifacts under the project id, and streams its log lines onto the
//! log record queue.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{SchedulerConfig, SchedulerType};

#[cfg(feature = "ecs")]
pub mod ecs;
pub mod http;
pub mod mock;

#[cfg(feature = "ecs")]
pub use ecs::EcsScheduler;
pub use http::HttpScheduler;
pub use mock::MockScheduler;

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Errors that can occur while dispatching a build.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The scheduler refused or failed to start the task.
    #[error("Dispatch rejected: {0}")]
    Rejected(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Work order for one build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildTask {
    pub project_id: String,
    pub deployment_id: String,
    pub git_url: String,
}

/// Identifier of a launched build, as reported by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHandle {
    pub task_id: String,
}

/// Launches build workers.
///
/// A successful dispatch means the task was accepted, not that the build
/// started or succeeded; the worker reports progress through deployment
/// status updates.
#[async_trait]
pub trait BuildScheduler: Send + Sync {
    /// Launch a build for the task.
    async fn dispatch(&self, task: &BuildTask) -> Result<TaskHandle>;

    /// Scheduler name for logging.
    fn name(&self) -> &str;
}

/// Scheduler that only logs the task.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopScheduler;

#[async_trait]
impl BuildScheduler for NoopScheduler {
    async fn dispatch(&self, task: &BuildTask) -> Result<TaskHandle> {
        info!(
            project_id = %task.project_id,
            deployment_id = %task.deployment_id,
            git_url = %task.git_url,
            "Build dispatch skipped (noop scheduler)"
        );
        Ok(TaskHandle {
            task_id: format!("noop-{}", task.deployment_id),
        })
    }

    fn name(&self) -> &str {
        "noop"
    }
}

/// Initialize the build scheduler based on configuration.
pub async fn init_scheduler(
    config: &SchedulerConfig,
) -> std::result::Result<Arc<dyn BuildScheduler>, Box<dyn std::error::Error + Send + Sync>> {
    match config.scheduler_type {
        SchedulerType::Noop => {
            warn!("Using noop build scheduler, deploys will not start builds");
            Ok(Arc::new(NoopScheduler))
        }
        SchedulerType::Http => {
            let scheduler = HttpScheduler::new(&config.http)?;
            info!(endpoint = %scheduler.endpoint(), "Using HTTP build scheduler");
            Ok(Arc::new(scheduler))
        }
        SchedulerType::Ecs => {
            #[cfg(feature = "ecs")]
            {
                let scheduler = EcsScheduler::from_env(config.ecs.clone()).await?;
                info!(cluster = %config.ecs.cluster, "Using ECS build scheduler");
                Ok(Arc::new(scheduler))
            }

            #[cfg(not(feature = "ecs"))]
            {
                Err("ECS scheduler requires --features ecs".into())
            }
        }
    }
}

#[cfg(test)]
mod tests;
