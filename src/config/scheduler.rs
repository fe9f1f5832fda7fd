//! Build scheduler configuration types.

use serde::Deserialize;

/// Scheduler type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerType {
    /// Log the task and do nothing (local development).
    #[default]
    Noop,
    /// POST the task to an HTTP endpoint.
    Http,
    /// Run the task on ECS Fargate (requires the `ecs` feature).
    Ecs,
}

/// Scheduler configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Scheduler type discriminator.
    #[serde(rename = "type")]
    pub scheduler_type: SchedulerType,
    /// HTTP-specific configuration.
    pub http: HttpSchedulerConfig,
    /// ECS-specific configuration.
    pub ecs: EcsSchedulerConfig,
}

/// HTTP scheduler configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSchedulerConfig {
    /// Endpoint receiving task specs.
    pub endpoint: Option<String>,
    /// Request timeout.
    pub timeout_ms: u64,
}

impl Default for HttpSchedulerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 10_000,
        }
    }
}

/// ECS scheduler configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EcsSchedulerConfig {
    /// Cluster ARN or name.
    pub cluster: String,
    /// Task definition ARN or family.
    pub task_definition: String,
    /// Container the overrides apply to.
    pub container_name: String,
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
    pub assign_public_ip: bool,
}

impl Default for EcsSchedulerConfig {
    fn default() -> Self {
        Self {
            cluster: String::new(),
            task_definition: String::new(),
            container_name: "builder-image".to_string(),
            subnets: Vec::new(),
            security_groups: Vec::new(),
            assign_public_ip: true,
        }
    }
}
