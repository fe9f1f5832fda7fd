//! API error types and HTTP response mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::registry::{FieldViolation, RegistryError};
use crate::scheduler::SchedulerError;
use crate::storage::StorageError;

/// API result type.
pub type ApiResult<T> = Result<T, ApiError>;

/// Standard JSON error response body.
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    /// Stable machine-readable error code.
    pub code: &'static str,
    /// Human-readable message (safe for clients).
    pub message: String,
    /// Rejected fields, for validation errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldViolation>>,
}

/// HTTP API error with stable machine-readable code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<Vec<FieldViolation>>,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Returns an error response for malformed requests.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// Returns an error response for rejected fields.
    pub fn validation(violations: Vec<FieldViolation>) -> Self {
        Self {
            details: Some(violations),
            ..Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", "Invalid input")
        }
    }

    /// Returns an error response for missing resources.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    /// Returns an internal error response. The cause is logged, not returned.
    pub fn internal(code: &'static str, cause: impl std::fmt::Display) -> Self {
        error!(code, error = %cause, "Request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, code, "Internal server error")
    }

    /// Returns the HTTP status code for this error.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the machine-readable code.
    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            code: self.code,
            message: self.message,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Validation(violations) => Self::validation(violations),
            RegistryError::ProjectNotFound(_) | RegistryError::DeploymentNotFound(_) => {
                Self::not_found(err.to_string())
            }
            RegistryError::SubDomainTaken(_) => {
                Self::new(StatusCode::CONFLICT, "SUBDOMAIN_TAKEN", err.to_string())
            }
            RegistryError::ActiveDeployment { .. } => {
                Self::new(StatusCode::BAD_REQUEST, "ACTIVE_DEPLOYMENT", err.to_string())
            }
            RegistryError::Database(_) | RegistryError::Corrupt(_) => {
                Self::internal("REGISTRY_UNAVAILABLE", err)
            }
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        Self::internal("LOG_STORE_UNAVAILABLE", err)
    }
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        Self::internal("DISPATCH_FAILED", err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}
