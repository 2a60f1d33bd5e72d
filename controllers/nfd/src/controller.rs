//! Main controller implementation.
//!
//! Wires the Kubernetes client, the production handlers and the reconciler
//! together, then runs the watcher and the probe server side by side.

use crate::config::OperatorConfig;
use crate::error::ControllerError;
use crate::handlers::{KubeOperandClient, NfdHandlers};
use crate::probes::{self, Readiness};
use crate::reconciler::Reconciler;
use crate::watcher;
use kube::Client;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Main controller for NodeFeatureDiscovery resources.
pub struct Controller {
    watcher: JoinHandle<Result<(), ControllerError>>,
    probe_server: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Connects to the cluster and starts the background tasks.
    pub async fn new(config: OperatorConfig) -> Result<Self, ControllerError> {
        info!("Initializing NodeFeatureDiscovery controller");

        let client = Client::try_default().await?;
        let readiness = Readiness::new();

        let probe_server = tokio::spawn(probes::serve(config.probe_addr, readiness.clone()));

        let operand_client = KubeOperandClient::new(client.clone(), &config.operand_namespace);
        let reconciler = Reconciler::new(NfdHandlers::new(Arc::new(operand_client), config.operand_namespace.clone()));
        let watcher = tokio::spawn(async move {
            watcher::watch_node_feature_discoveries(
                client,
                &config.operand_namespace,
                config.reconcile_concurrency,
                reconciler,
                readiness,
            )
            .await
        });

        Ok(Self { watcher, probe_server })
    }

    /// Runs until a task exits or the process is interrupted.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("NodeFeatureDiscovery controller running");

        let Self { watcher, probe_server } = self;

        tokio::select! {
            res = watcher => {
                error!("Watcher exited");
                flatten(res)
            }
            res = probe_server => {
                error!("Probe server exited");
                flatten(res)
            }
            res = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                res.map_err(|e| ControllerError::Watch(format!("failed to listen for shutdown signal: {e}")))
            }
        }
    }
}

fn flatten(res: Result<Result<(), ControllerError>, tokio::task::JoinError>) -> Result<(), ControllerError> {
    res.map_err(|e| ControllerError::Watch(format!("task panicked: {e}")))?
}
