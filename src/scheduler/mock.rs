use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BuildScheduler, BuildTask, Result, SchedulerError, TaskHandle};

/// Scheduler that records dispatched tasks.
#[derive(Default)]
pub struct MockScheduler {
    dispatched: RwLock<Vec<BuildTask>>,
    fail_on_dispatch: RwLock<bool>,
    dispatch_delay: RwLock<Duration>,
}

impl MockScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_dispatch(&self, fail: bool) {
        *self.fail_on_dispatch.write().await = fail;
    }

    /// Make every dispatch take `delay` before it resolves.
    pub async fn set_dispatch_delay(&self, delay: Duration) {
        *self.dispatch_delay.write().await = delay;
    }

    /// Every task accepted so far, in order.
    pub async fn dispatched(&self) -> Vec<BuildTask> {
        self.dispatched.read().await.clone()
    }
}

#[async_trait]
impl BuildScheduler for MockScheduler {
    async fn dispatch(&self, task: &BuildTask) -> Result<TaskHandle> {
        let delay = *self.dispatch_delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_on_dispatch.read().await {
            return Err(SchedulerError::Rejected("injected failure".to_string()));
        }
        self.dispatched.write().await.push(task.clone());
        Ok(TaskHandle {
            task_id: format!("mock-{}", task.deployment_id),
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}
