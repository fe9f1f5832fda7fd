//! HTTP API and realtime websocket endpoint.
//!
//! Endpoints:
//! - `POST /project` — register a project, assign its subdomain
//! - `POST /deploy` — queue a deployment and dispatch its build
//! - `GET /logs/:deployment_id` — stored log lines, newest first
//! - `PUT /deployments/:deployment_id/status` — status report from the build worker
//! - `GET /health` — liveness
//!
//! The realtime websocket is served by [`realtime::router`] on its own port.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post, put};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ProxyConfig;
use crate::registry::DeploymentRegistry;
use crate::scheduler::BuildScheduler;
use crate::storage::LogStore;

pub mod error;
mod handlers;
pub mod realtime;

pub use error::{ApiError, ApiErrorBody, ApiResult};

/// Shared state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: DeploymentRegistry,
    pub logs: Arc<dyn LogStore>,
    pub scheduler: Arc<dyn BuildScheduler>,
    /// Used to build preview URLs.
    pub proxy: ProxyConfig,
    pub proxy_port: u16,
}

/// Build the axum router (separated for testing).
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/project", post(handlers::create_project))
        .route("/deploy", post(handlers::deploy))
        .route("/logs/:deployment_id", get(handlers::get_logs))
        .route(
            "/deployments/:deployment_id/status",
            put(handlers::update_status),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve `app` on `addr` until `shutdown` resolves.
///
/// When the port is 0, the OS assigns an ephemeral port. The actual bound
/// port is always logged so it can be discovered.
pub async fn serve(
    name: &str,
    addr: SocketAddr,
    app: Router,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    info!(server = name, addr = %local, "Listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests;
