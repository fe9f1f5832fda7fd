use axum::extract::{FromRequest, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::registry::{Deployment, DeploymentStatus, FieldViolation, NewProject, Project};
use crate::scheduler::{BuildTask, SchedulerError};
use crate::storage::LogEvent;

/// JSON body extractor whose rejections use the API error body.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub(super) struct ApiJson<T>(pub T);

// ============================================================================
// Request / response bodies
// ============================================================================

#[derive(Debug, Deserialize)]
pub(super) struct CreateProjectRequest {
    #[serde(default)]
    name: String,
    #[serde(rename = "gitURL", default)]
    git_url: String,
    #[serde(default)]
    slug: Option<String>,
}

/// Success envelope used by the project and deploy endpoints.
#[derive(Debug, Serialize)]
pub(super) struct Envelope<T> {
    status: &'static str,
    data: T,
}

#[derive(Debug, Serialize)]
pub(super) struct ProjectCreated {
    project: Project,
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DeployRequest {
    project_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DeploymentQueued {
    deployment_id: String,
}

#[derive(Debug, Serialize)]
pub(super) struct LogsResponse {
    logs: Vec<LogEvent>,
}

#[derive(Debug, Deserialize)]
pub(super) struct StatusRequest {
    status: String,
}

#[derive(Debug, Serialize)]
pub(super) struct StatusResponse {
    deployment: Deployment,
}

// ============================================================================
// Handlers
// ============================================================================

pub(super) async fn health() -> StatusCode {
    StatusCode::OK
}

pub(super) async fn create_project(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CreateProjectRequest>,
) -> ApiResult<Json<Envelope<ProjectCreated>>> {
    let project = state
        .registry
        .create_project(NewProject {
            name: request.name,
            git_url: request.git_url,
            slug: request.slug,
        })
        .await?;

    let url = state
        .proxy
        .preview_url(&project.sub_domain, state.proxy_port);

    Ok(Json(Envelope {
        status: "success",
        data: ProjectCreated { project, url },
    }))
}

/// Queue a deployment and launch its build.
///
/// If the scheduler cannot launch the build, the deployment is marked
/// FAILED so it does not block the next deploy. Dispatch runs on its own
/// task so a dropped request still either launches or fails the deployment.
pub(super) async fn deploy(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<DeployRequest>,
) -> ApiResult<Json<Envelope<DeploymentQueued>>> {
    let project = state
        .registry
        .get_project_by_id(&request.project_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Project not found: {}", request.project_id)))?;

    let deployment = state.registry.create_deployment(&project.id).await?;

    let task = BuildTask {
        project_id: project.id.clone(),
        deployment_id: deployment.id.clone(),
        git_url: project.git_url.clone(),
    };

    tokio::spawn(dispatch_build(state, task))
        .await
        .map_err(|e| ApiError::internal("DISPATCH_FAILED", e))??;

    Ok(Json(Envelope {
        status: "queued",
        data: DeploymentQueued {
            deployment_id: deployment.id,
        },
    }))
}

async fn dispatch_build(state: AppState, task: BuildTask) -> Result<(), SchedulerError> {
    match state.scheduler.dispatch(&task).await {
        Ok(handle) => {
            info!(
                deployment_id = %task.deployment_id,
                task_id = %handle.task_id,
                scheduler = state.scheduler.name(),
                "Build dispatched"
            );
            Ok(())
        }
        Err(e) => {
            if let Err(mark_err) = state
                .registry
                .apply_status(&task.deployment_id, DeploymentStatus::Failed)
                .await
            {
                error!(
                    deployment_id = %task.deployment_id,
                    error = %mark_err,
                    "Failed to mark undispatched deployment as FAILED"
                );
            }
            Err(e)
        }
    }
}

pub(super) async fn get_logs(
    State(state): State<AppState>,
    Path(deployment_id): Path<String>,
) -> ApiResult<Json<LogsResponse>> {
    let logs = state.logs.list_for_deployment(&deployment_id).await?;
    Ok(Json(LogsResponse { logs }))
}

pub(super) async fn update_status(
    State(state): State<AppState>,
    Path(deployment_id): Path<String>,
    ApiJson(request): ApiJson<StatusRequest>,
) -> ApiResult<Json<StatusResponse>> {
    let status: DeploymentStatus = request.status.parse().map_err(|_| {
        ApiError::validation(vec![FieldViolation {
            field: "status",
            message: format!(
                "must be one of QUEUED, IN_PROGRESS, READY, FAILED (got '{}')",
                request.status
            ),
        }])
    })?;

    let deployment = state.registry.apply_status(&deployment_id, status).await?;
    Ok(Json(StatusResponse { deployment }))
}
