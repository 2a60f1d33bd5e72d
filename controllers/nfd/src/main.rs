//! NodeFeatureDiscovery Controller
//!
//! Operator that deploys and maintains node-feature-discovery for every
//! NodeFeatureDiscovery resource:
//! - nfd-master Deployment and Service
//! - nfd-worker and (optionally) nfd-topology-updater DaemonSets with their config
//! - nfd-gc Deployment
//! - nfd-prune Job on deletion when requested
//!
//! Conditions on the resource status report rollout progress.

mod backoff;
mod components;
mod config;
mod controller;
mod error;
mod handlers;
mod probes;
mod reconciler;
mod watcher;

#[cfg(test)]
mod test_utils;

use crate::config::OperatorConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    // Install the default crypto provider before kube builds its TLS config
    let _ = rustls::crypto::ring::default_provider().install_default();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting NodeFeatureDiscovery Controller");

    let config = OperatorConfig::from_env()?;
    info!("Configuration:");
    info!("  Operand namespace: {}", config.operand_namespace);
    info!("  Probe address: {}", config.probe_addr);
    info!("  Reconcile concurrency: {}", config.reconcile_concurrency);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
