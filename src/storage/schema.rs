//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Projects table schema.
#[derive(Iden)]
pub enum Projects {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "name"]
    Name,
    #[iden = "git_url"]
    GitUrl,
    #[iden = "sub_domain"]
    SubDomain,
    #[iden = "created_at"]
    CreatedAt,
}

/// Deployments table schema.
#[derive(Iden)]
pub enum Deployments {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "project_id"]
    ProjectId,
    #[iden = "status"]
    Status,
    #[iden = "created_at"]
    CreatedAt,
}

/// Log events table schema.
#[derive(Iden)]
pub enum LogEvents {
    Table,
    #[iden = "seq"]
    Seq,
    #[iden = "event_id"]
    EventId,
    #[iden = "deployment_id"]
    DeploymentId,
    #[iden = "project_id"]
    ProjectId,
    #[iden = "log"]
    Log,
    #[iden = "timestamp"]
    Timestamp,
}

/// SQL for creating the projects table.
pub const CREATE_PROJECTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    git_url TEXT NOT NULL,
    sub_domain TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
)
"#;

/// SQL for creating the deployments table.
pub const CREATE_DEPLOYMENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS deployments (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id),
    status TEXT NOT NULL,
    created_at TEXT NOT NULL
)
"#;

/// At most one QUEUED or IN_PROGRESS deployment per project.
pub const CREATE_ACTIVE_DEPLOYMENT_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_deployments_one_active
ON deployments(project_id)
WHERE status IN ('QUEUED', 'IN_PROGRESS')
"#;

/// SQL for creating the log events table.
pub const CREATE_LOG_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS log_events (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id TEXT NOT NULL UNIQUE,
    deployment_id TEXT NOT NULL,
    project_id TEXT,
    log TEXT NOT NULL,
    timestamp TEXT NOT NULL
)
"#;

pub const CREATE_LOG_EVENTS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_log_events_deployment
ON log_events(deployment_id, timestamp)
"#;
