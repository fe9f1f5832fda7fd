//! Deployment registry.
//!
//! Tracks projects and their deployments. The registry service owns input
//! validation and subdomain assignment; persistence (and the atomic
//! single-active-deployment check) is delegated to a [`RegistryStore`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

pub mod slug;

pub use slug::{generate_slug, is_valid_label};

/// Maximum accepted project name length.
pub const MAX_PROJECT_NAME_LEN: usize = 128;

/// Attempts at generating a free subdomain before giving up.
pub const SLUG_ATTEMPTS: usize = 5;

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// A single rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: &'static str,
    pub message: String,
}

impl FieldViolation {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Errors that can occur during registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Invalid input: {}", format_violations(.0))]
    Validation(Vec<FieldViolation>),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Deployment not found: {0}")]
    DeploymentNotFound(String),

    #[error("Subdomain already taken: {0}")]
    SubDomainTaken(String),

    #[error("Project {project_id} already has an active deployment")]
    ActiveDeployment { project_id: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt registry row: {0}")]
    Corrupt(String),
}

fn format_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}: {}", v.field, v.message))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A registered source repository with a stable public subdomain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(rename = "gitURL")]
    pub git_url: String,
    pub sub_domain: String,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle status of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    Queued,
    InProgress,
    Ready,
    Failed,
}

impl DeploymentStatus {
    /// Statuses that count towards the one-active-deployment limit.
    pub const ACTIVE: [DeploymentStatus; 2] = [DeploymentStatus::Queued, DeploymentStatus::InProgress];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Queued => "QUEUED",
            DeploymentStatus::InProgress => "IN_PROGRESS",
            DeploymentStatus::Ready => "READY",
            DeploymentStatus::Failed => "FAILED",
        }
    }

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentStatus {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "QUEUED" => Ok(DeploymentStatus::Queued),
            "IN_PROGRESS" => Ok(DeploymentStatus::InProgress),
            "READY" => Ok(DeploymentStatus::Ready),
            "FAILED" => Ok(DeploymentStatus::Failed),
            other => Err(RegistryError::Corrupt(format!(
                "unknown deployment status '{}'",
                other
            ))),
        }
    }
}

/// One build attempt for a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub id: String,
    pub project_id: String,
    pub status: DeploymentStatus,
    pub created_at: DateTime<Utc>,
}

/// Input for project creation.
#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub name: String,
    pub git_url: String,
    /// Caller-chosen subdomain. Generated when absent.
    pub slug: Option<String>,
}

/// Persistence for projects and deployments.
///
/// Implementations:
/// - `SqliteRegistryStore`: SQLite, partial unique index for the active check
/// - `MockRegistryStore`: In-memory, check-and-insert under one lock
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Insert a project. Fails with `SubDomainTaken` if the subdomain exists.
    async fn insert_project(&self, project: &Project) -> Result<()>;

    /// Find a project by its subdomain.
    async fn find_project_by_sub_domain(&self, sub_domain: &str) -> Result<Option<Project>>;

    /// Find a project by id.
    async fn find_project(&self, id: &str) -> Result<Option<Project>>;

    /// Insert a deployment if the project exists and has no active deployment.
    ///
    /// Must be atomic with respect to concurrent calls for the same project.
    async fn insert_deployment(&self, deployment: &Deployment) -> Result<()>;

    /// Find a deployment by id.
    async fn find_deployment(&self, id: &str) -> Result<Option<Deployment>>;

    /// Overwrite a deployment's status.
    async fn update_status(&self, id: &str, status: DeploymentStatus) -> Result<Deployment>;
}

/// Registry service: validation and identity assignment over a store.
#[derive(Clone)]
pub struct DeploymentRegistry {
    store: Arc<dyn RegistryStore>,
}

impl DeploymentRegistry {
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self { store }
    }

    /// Register a project and assign its subdomain.
    ///
    /// A generated subdomain that collides is regenerated up to
    /// [`SLUG_ATTEMPTS`] times. A caller-chosen one that collides is reported
    /// as `SubDomainTaken` straight away.
    #[tracing::instrument(name = "registry.create_project", skip_all, fields(name = %input.name))]
    pub async fn create_project(&self, input: NewProject) -> Result<Project> {
        validate_new_project(&input)?;

        let requested = input.slug.clone();
        let attempts = if requested.is_some() { 1 } else { SLUG_ATTEMPTS };
        let mut last_taken = None;

        for _ in 0..attempts {
            let sub_domain = requested.clone().unwrap_or_else(generate_slug);
            let project = Project {
                id: Uuid::new_v4().to_string(),
                name: input.name.trim().to_string(),
                git_url: input.git_url.trim().to_string(),
                sub_domain,
                created_at: Utc::now(),
            };

            match self.store.insert_project(&project).await {
                Ok(()) => {
                    info!(
                        project_id = %project.id,
                        sub_domain = %project.sub_domain,
                        "Project created"
                    );
                    return Ok(project);
                }
                Err(RegistryError::SubDomainTaken(taken)) => {
                    warn!(sub_domain = %taken, "Subdomain collision");
                    last_taken = Some(taken);
                }
                Err(e) => return Err(e),
            }
        }

        Err(RegistryError::SubDomainTaken(last_taken.unwrap_or_default()))
    }

    /// Create a QUEUED deployment unless one is already active.
    #[tracing::instrument(name = "registry.create_deployment", skip(self))]
    pub async fn create_deployment(&self, project_id: &str) -> Result<Deployment> {
        let deployment = Deployment {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            status: DeploymentStatus::Queued,
            created_at: Utc::now(),
        };

        self.store.insert_deployment(&deployment).await?;

        info!(deployment_id = %deployment.id, project_id = %project_id, "Deployment queued");
        Ok(deployment)
    }

    pub async fn get_project(&self, sub_domain: &str) -> Result<Option<Project>> {
        self.store.find_project_by_sub_domain(sub_domain).await
    }

    pub async fn get_project_by_id(&self, id: &str) -> Result<Option<Project>> {
        self.store.find_project(id).await
    }

    pub async fn get_deployment(&self, id: &str) -> Result<Option<Deployment>> {
        self.store.find_deployment(id).await
    }

    /// Apply a status reported by the build worker.
    ///
    /// Any transition is accepted, including repeats and regressions. The one
    /// exception is re-activating a deployment while another deployment of
    /// the same project is active, which the store rejects as
    /// `ActiveDeployment`.
    #[tracing::instrument(name = "registry.apply_status", skip(self))]
    pub async fn apply_status(
        &self,
        deployment_id: &str,
        status: DeploymentStatus,
    ) -> Result<Deployment> {
        let deployment = self.store.update_status(deployment_id, status).await?;
        info!(deployment_id = %deployment_id, status = %status, "Deployment status applied");
        Ok(deployment)
    }
}

/// Validate project creation input, collecting every violation.
pub fn validate_new_project(input: &NewProject) -> Result<()> {
    let mut violations = Vec::new();

    let name = input.name.trim();
    if name.is_empty() {
        violations.push(FieldViolation::new("name", "must not be empty"));
    } else if name.chars().count() > MAX_PROJECT_NAME_LEN {
        violations.push(FieldViolation::new(
            "name",
            format!("must be at most {} characters", MAX_PROJECT_NAME_LEN),
        ));
    }

    match reqwest::Url::parse(input.git_url.trim()) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => {}
        Ok(_) => violations.push(FieldViolation::new("gitURL", "must be an http(s) URL")),
        Err(e) => violations.push(FieldViolation::new("gitURL", e.to_string())),
    }

    if let Some(ref slug) = input.slug {
        if !is_valid_label(slug) {
            violations.push(FieldViolation::new(
                "slug",
                "must be 1-63 lowercase letters, digits or inner hyphens",
            ));
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(RegistryError::Validation(violations))
    }
}
