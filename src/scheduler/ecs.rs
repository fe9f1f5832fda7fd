//! ECS Fargate build scheduler.
//!
//! Runs one task of the builder task definition per deployment. The builder
//! container reads its work order from environment overrides.

use async_trait::async_trait;
use aws_sdk_ecs::error::DisplayErrorContext;
use aws_sdk_ecs::types::{
    AssignPublicIp, AwsVpcConfiguration, ContainerOverride, KeyValuePair, LaunchType,
    NetworkConfiguration, TaskOverride,
};
use aws_sdk_ecs::Client;
use tracing::{error, info};

use super::{BuildScheduler, BuildTask, Result, SchedulerError, TaskHandle};
use crate::config::EcsSchedulerConfig;

/// Environment variable carrying the repository URL.
pub const GIT_URL_ENV: &str = "GIT_REPOSITORY__URL";
pub const PROJECT_ID_ENV: &str = "PROJECT_ID";
pub const DEPLOYMENT_ID_ENV: &str = "DEPLOYMENT_ID";

/// Scheduler backed by ECS RunTask.
pub struct EcsScheduler {
    client: Client,
    config: EcsSchedulerConfig,
}

impl EcsScheduler {
    pub fn new(client: Client, config: EcsSchedulerConfig) -> Result<Self> {
        if config.cluster.is_empty() || config.task_definition.is_empty() {
            return Err(SchedulerError::Config(
                "ECS cluster and task_definition must be set".to_string(),
            ));
        }
        if config.subnets.is_empty() {
            return Err(SchedulerError::Config(
                "ECS scheduler needs at least one subnet".to_string(),
            ));
        }
        Ok(Self { client, config })
    }

    /// Create a scheduler using credentials and region from the environment.
    pub async fn from_env(config: EcsSchedulerConfig) -> Result<Self> {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(Client::new(&sdk_config), config)
    }

    fn overrides(&self, task: &BuildTask) -> TaskOverride {
        let env = |name: &str, value: &str| KeyValuePair::builder().name(name).value(value).build();

        TaskOverride::builder()
            .container_overrides(
                ContainerOverride::builder()
                    .name(&self.config.container_name)
                    .environment(env(GIT_URL_ENV, &task.git_url))
                    .environment(env(PROJECT_ID_ENV, &task.project_id))
                    .environment(env(DEPLOYMENT_ID_ENV, &task.deployment_id))
                    .build(),
            )
            .build()
    }

    fn network(&self) -> Result<NetworkConfiguration> {
        let public_ip = if self.config.assign_public_ip {
            AssignPublicIp::Enabled
        } else {
            AssignPublicIp::Disabled
        };

        let vpc = AwsVpcConfiguration::builder()
            .set_subnets(Some(self.config.subnets.clone()))
            .set_security_groups(Some(self.config.security_groups.clone()))
            .assign_public_ip(public_ip)
            .build()
            .map_err(|e| SchedulerError::Config(e.to_string()))?;

        Ok(NetworkConfiguration::builder()
            .awsvpc_configuration(vpc)
            .build())
    }
}

#[async_trait]
impl BuildScheduler for EcsScheduler {
    #[tracing::instrument(name = "scheduler.ecs.dispatch", skip_all, fields(deployment_id = %task.deployment_id))]
    async fn dispatch(&self, task: &BuildTask) -> Result<TaskHandle> {
        let output = self
            .client
            .run_task()
            .cluster(&self.config.cluster)
            .task_definition(&self.config.task_definition)
            .launch_type(LaunchType::Fargate)
            .count(1)
            .network_configuration(self.network()?)
            .overrides(self.overrides(task))
            .send()
            .await
            .map_err(|e| {
                let message = DisplayErrorContext(&e).to_string();
                error!(error = %message, "ECS RunTask failed");
                SchedulerError::Rejected(message)
            })?;

        if let Some(failure) = output.failures().first() {
            let reason = failure.reason().unwrap_or("unknown").to_string();
            error!(reason = %reason, "ECS RunTask reported a failure");
            return Err(SchedulerError::Rejected(reason));
        }

        let task_id = output
            .tasks()
            .first()
            .and_then(|t| t.task_arn())
            .map(str::to_string)
            .ok_or_else(|| SchedulerError::Rejected("RunTask returned no task".to_string()))?;

        info!(task_arn = %task_id, "Build task started");
        Ok(TaskHandle { task_id })
    }

    fn name(&self) -> &str {
        "ecs"
    }
}
