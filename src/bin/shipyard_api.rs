//! shipyard-api: project/deploy API, log consumer and realtime log server
//!
//! ## Architecture
//! ```text
//! [Build workers] -> [Log queue] -> [LogConsumer] -> [LogStore]
//!                                         |
//!                                         v
//!                                    [FanoutHub] -> [Websocket :9002]
//!
//! [HTTP API :9000] -> [DeploymentRegistry] / [BuildScheduler]
//! ```
//!
//! ## Configuration
//! - SHIPYARD_CONFIG: YAML config file path
//! - SHIPYARD__*: overrides, e.g. SHIPYARD__MESSAGING__TYPE=kafka
//! - SHIPYARD_LOG: log filter (default: info)

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

use shipyard::api::{self, realtime, AppState};
use shipyard::config::Config;
use shipyard::hub::FanoutHub;
use shipyard::ingest::LogConsumer;
use shipyard::queue::init_record_queue;
use shipyard::registry::DeploymentRegistry;
use shipyard::scheduler::init_scheduler;
use shipyard::storage::init_storage;
use shipyard::utils::bootstrap::{connect_with_retry, init_tracing};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    init_tracing();

    let config = Config::load(None).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let (log_store, registry_store) = init_storage(&config.storage).await?;
    let registry = DeploymentRegistry::new(registry_store);
    let hub = Arc::new(FanoutHub::new(config.hub.outbox_capacity));
    let scheduler = init_scheduler(&config.scheduler).await?;

    let queue = connect_with_retry("log queue", || init_record_queue(&config.messaging)).await?;
    let partitions = connect_with_retry("log queue partitions", || queue.partitions()).await?;
    info!(
        messaging_type = ?config.messaging.messaging_type,
        partitions = partitions.len(),
        "Log queue ready"
    );

    let consumer = Arc::new(LogConsumer::new(
        Arc::clone(&log_store),
        Arc::clone(&hub),
        config.messaging.consumer.clone(),
    ));
    let consumers = consumer.spawn(partitions);

    let host: IpAddr = config.server.host.parse()?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let app = api::router(AppState {
        registry,
        logs: log_store,
        scheduler,
        proxy: config.proxy.clone(),
        proxy_port: config.server.proxy_port,
    });
    let api_server = tokio::spawn(api::serve(
        "api",
        SocketAddr::new(host, config.server.api_port),
        app,
        wait_for(shutdown_rx.clone()),
    ));
    let realtime_server = tokio::spawn(api::serve(
        "realtime",
        SocketAddr::new(host, config.server.realtime_port),
        realtime::router(Arc::clone(&hub)),
        wait_for(shutdown_rx),
    ));

    info!("shipyard-api running, press Ctrl+C to exit");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    let _ = shutdown_tx.send(true);
    consumers.shutdown().await;
    for (name, server) in [("api", api_server), ("realtime", realtime_server)] {
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(server = name, error = %e, "Server failed"),
            Err(e) => error!(server = name, error = %e, "Server task panicked"),
        }
    }

    Ok(())
}

async fn wait_for(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
