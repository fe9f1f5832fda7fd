//! Subdomain preview proxy.
//!
//! Serves `<subdomain>.<root_domain>` by streaming files from the artifact
//! store: a request for `/path` on a project's host is forwarded to
//! `<artifact_base>/<project id>/path`, with `/` served as `/index.html`.
//!
//! Forwarding is a single attempt. Connect failures map to 502 and upstream
//! timeouts to 504; the upstream status is passed through otherwise.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{self, HeaderMap, HeaderName};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;
use reqwest::{Client, Url};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

use crate::config::ProxyConfig;
use crate::registry::{DeploymentRegistry, RegistryError};

pub mod host;

pub use host::extract_sub_domain;

/// Result type for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;

/// Errors that can occur while routing a preview request.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Host is not a preview host: {0}")]
    NotRoutable(String),

    #[error("Project not found")]
    ProjectNotFound,

    #[error("Registry lookup failed: {0}")]
    Registry(#[from] RegistryError),

    #[error("Path escapes the project prefix: {0}")]
    PathEscapesProject(String),

    #[error("Invalid artifact base URL: {0}")]
    InvalidArtifactBase(String),

    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    #[error("Upstream timed out after {0:?}")]
    UpstreamTimeout(Duration),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::NotRoutable(_) | ProxyError::ProjectNotFound => StatusCode::NOT_FOUND,
            ProxyError::PathEscapesProject(_) => StatusCode::BAD_REQUEST,
            ProxyError::Registry(_)
            | ProxyError::InvalidArtifactBase(_)
            | ProxyError::Client(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            ProxyError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ProxyError::NotRoutable(_) => "Not found",
            ProxyError::ProjectNotFound => "Project not found",
            ProxyError::PathEscapesProject(_) => {
                warn!(error = %self, "Rejected preview path");
                "Bad request"
            }
            ProxyError::Registry(_)
            | ProxyError::InvalidArtifactBase(_)
            | ProxyError::Client(_) => {
                error!(error = %self, "Proxy request failed");
                "Internal server error"
            }
            ProxyError::UpstreamUnreachable(_) => {
                warn!(error = %self, "Upstream unreachable");
                "Bad gateway"
            }
            ProxyError::UpstreamTimeout(_) => {
                warn!(error = %self, "Upstream timed out");
                "Gateway timeout"
            }
        };
        (status, body).into_response()
    }
}

/// Headers that apply to a single connection and are never forwarded.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Copy `headers`, dropping hop-by-hop headers (including any the
/// `Connection` header names) and `Host`.
fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let named_by_connection: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if name == header::HOST
            || HOP_BY_HOP.contains(name)
            || named_by_connection.iter().any(|n| n == name.as_str())
        {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Whether the inbound request carries a body worth streaming upstream.
fn has_body(headers: &HeaderMap) -> bool {
    headers.contains_key(header::TRANSFER_ENCODING)
        || headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .is_some_and(|len| len > 0)
}

/// Shared state for the proxy handler.
pub struct ProxyState {
    registry: DeploymentRegistry,
    client: Client,
    artifact_base: Url,
    root_domain: String,
    request_timeout: Duration,
}

impl ProxyState {
    pub fn new(registry: DeploymentRegistry, config: &ProxyConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        let artifact_base = Url::parse(config.artifact_base.trim_end_matches('/'))
            .map_err(|e| ProxyError::InvalidArtifactBase(format!("{}: {}", config.artifact_base, e)))?;

        Ok(Self {
            registry,
            client,
            artifact_base,
            root_domain: config.root_domain.clone(),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        })
    }

    /// Upstream URL for a project path. `/` maps to `/index.html`.
    ///
    /// The URL parser resolves dot segments (`..`, `%2e%2e`, backslashes), so
    /// the prefix is checked on the parsed URL. A path that resolves outside
    /// `<artifact_base>/<project_id>/` is rejected.
    pub fn upstream_url(&self, project_id: &str, path: &str, query: Option<&str>) -> Result<Url> {
        let path = if path == "/" { "/index.html" } else { path };
        let base = self.artifact_base.as_str().trim_end_matches('/');
        let raw = match query {
            Some(q) => format!("{}/{}{}?{}", base, project_id, path, q),
            None => format!("{}/{}{}", base, project_id, path),
        };

        let url = Url::parse(&raw).map_err(|_| ProxyError::PathEscapesProject(path.to_string()))?;
        let prefix = format!(
            "{}/{}/",
            self.artifact_base.path().trim_end_matches('/'),
            project_id
        );
        if url.origin() != self.artifact_base.origin() || !url.path().starts_with(&prefix) {
            return Err(ProxyError::PathEscapesProject(path.to_string()));
        }
        Ok(url)
    }
}

/// Build the proxy router. Every path on every method is forwarded.
pub fn router(state: Arc<ProxyState>) -> Router {
    Router::new()
        .fallback(forward)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tracing::instrument(name = "proxy.forward", skip_all, fields(method = %request.method(), path = %request.uri().path()))]
async fn forward(State(state): State<Arc<ProxyState>>, request: Request) -> Result<Response> {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().host())
        .unwrap_or_default()
        .to_string();

    let sub_domain = extract_sub_domain(&host, &state.root_domain)
        .ok_or_else(|| ProxyError::NotRoutable(host.clone()))?;

    let project = state
        .registry
        .get_project(&sub_domain)
        .await?
        .ok_or(ProxyError::ProjectNotFound)?;

    let url = state.upstream_url(&project.id, request.uri().path(), request.uri().query())?;
    debug!(sub_domain = %sub_domain, project_id = %project.id, upstream = %url, "Forwarding");

    let (parts, body) = request.into_parts();
    let mut upstream = state
        .client
        .request(parts.method, url)
        .headers(forwardable_headers(&parts.headers));
    if has_body(&parts.headers) {
        upstream = upstream.body(reqwest::Body::wrap_stream(body.into_data_stream()));
    }

    let response = tokio::time::timeout(state.request_timeout, upstream.send())
        .await
        .map_err(|_| ProxyError::UpstreamTimeout(state.request_timeout))?
        .map_err(|e| {
            if e.is_timeout() {
                ProxyError::UpstreamTimeout(state.request_timeout)
            } else {
                ProxyError::UpstreamUnreachable(e.to_string())
            }
        })?;

    let mut builder = Response::builder().status(response.status());
    if let Some(headers) = builder.headers_mut() {
        *headers = forwardable_headers(response.headers());
    }
    let response = builder
        .body(Body::from_stream(response.bytes_stream()))
        .map_err(|e| ProxyError::UpstreamUnreachable(e.to_string()))?;

    Ok(response)
}
