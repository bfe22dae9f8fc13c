//! nodeos node agent.
//!
//! Hosts the node-level reconciliation controllers: network readiness
//! aggregation and container image garbage collection, both driven off
//! the in-memory resource graph.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use nodeos_node_agent::{
    config::Config,
    controllers::{ImageGcConfig, ImageGcController, NetworkStatusController},
    ControllerRegistry, MockImageStore,
};
use nodeos_resources::MemoryStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to NODEOS_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting nodeos node agent");
    info!(
        gc_check_interval_secs = config.gc_check_interval.as_secs(),
        "Configuration loaded"
    );

    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());

    // Create shutdown channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut registry = ControllerRegistry::new(store.clone());
    registry.register(Box::new(NetworkStatusController))?;

    // The in-memory image store backend stands in until a CRI
    // connector is wired up.
    let image_store = MockImageStore::new();
    registry.register(Box::new(ImageGcController::new(
        Box::new(move || Ok(Box::new(image_store.clone()))),
        ImageGcConfig {
            check_interval: config.gc_check_interval,
        },
    )))?;

    let handles = registry.run(shutdown_rx);

    // Wait for shutdown signal (Ctrl+C)
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    // Signal shutdown to all controllers
    let _ = shutdown_tx.send(true);

    // Wait for controllers to finish
    info!("Waiting for controllers to shut down...");
    let shutdown_timeout = std::time::Duration::from_secs(10);

    for handle in handles {
        if let Err(e) = tokio::time::timeout(shutdown_timeout, handle).await {
            warn!(error = %e, "Controller did not shut down in time");
        }
    }

    info!("Node agent shutdown complete");
    Ok(())
}
