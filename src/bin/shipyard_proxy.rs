//! shipyard-proxy: subdomain preview proxy
//!
//! Routes `<subdomain>.<root_domain>` to the project's artifacts under
//! `<artifact_base>/<project id>/`.
//!
//! ## Configuration
//! - SHIPYARD__PROXY__ARTIFACT_BASE: artifact store base URL
//! - SHIPYARD__PROXY__ROOT_DOMAIN: preview root domain (default: localhost)
//! - SHIPYARD__SERVER__PROXY_PORT: listen port (default: 8000)
//! - SHIPYARD_LOG: log filter (default: info)

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tracing::{error, info};

use shipyard::api;
use shipyard::config::Config;
use shipyard::proxy::{self, ProxyState};
use shipyard::registry::DeploymentRegistry;
use shipyard::storage::init_storage;
use shipyard::utils::bootstrap::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    let config = Config::load(None).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let (_, registry_store) = init_storage(&config.storage).await?;
    let state = ProxyState::new(DeploymentRegistry::new(registry_store), &config.proxy)?;

    info!(
        artifact_base = %config.proxy.artifact_base,
        root_domain = %config.proxy.root_domain,
        "Preview proxy configured"
    );

    let host: IpAddr = config.server.host.parse()?;
    api::serve(
        "proxy",
        SocketAddr::new(host, config.server.proxy_port),
        proxy::router(Arc::new(state)),
        async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl+C");
            }
            info!("Shutting down");
        },
    )
    .await?;

    Ok(())
}
