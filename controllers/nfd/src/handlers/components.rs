//! Per-component convergence

use super::client::{OperandKind, Propagation};
use super::NfdHandlers;
use crate::components::prune::{prune_progress, PruneProgress, PRUNE_NAME};
use crate::components::{gc, master, topology, worker};
use crate::error::ControllerError;
use crds::NodeFeatureDiscovery;
use tracing::{debug, info};

impl NfdHandlers {
    pub(crate) async fn converge_master(&self, nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError> {
        self.client
            .apply_deployment(&master::desired_deployment(nfd, &self.namespace)?)
            .await?;
        self.client
            .apply_service(&master::desired_service(nfd, &self.namespace)?)
            .await
    }

    pub(crate) async fn converge_worker(&self, nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError> {
        // ConfigMap first so new worker pods mount the current config
        self.client
            .apply_config_map(&worker::desired_config_map(nfd, &self.namespace)?)
            .await?;
        self.client
            .apply_daemon_set(&worker::desired_daemon_set(nfd, &self.namespace)?)
            .await
    }

    pub(crate) async fn converge_topology(&self, nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError> {
        if !nfd.spec.topology_updater {
            debug!("Topology updater disabled, removing its objects");
            self.client
                .delete(OperandKind::DaemonSet, topology::TOPOLOGY_NAME, Propagation::Background)
                .await?;
            return self
                .client
                .delete(OperandKind::ConfigMap, topology::TOPOLOGY_NAME, Propagation::Background)
                .await;
        }

        self.client
            .apply_config_map(&topology::desired_config_map(nfd, &self.namespace)?)
            .await?;
        self.client
            .apply_daemon_set(&topology::desired_daemon_set(nfd, &self.namespace)?)
            .await
    }

    pub(crate) async fn converge_gc(&self, nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError> {
        self.client
            .apply_deployment(&gc::desired_deployment(nfd, &self.namespace)?)
            .await
    }

    /// The prune Job only runs during finalization. A finished Job left over
    /// from an earlier deletion is removed so the next deletion can run it again.
    pub(crate) async fn converge_prune(&self, _nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError> {
        let Some(job) = self.client.get_job(PRUNE_NAME).await? else {
            return Ok(());
        };

        match prune_progress(job.status.as_ref()) {
            PruneProgress::Running => {
                debug!("Prune job still running, leaving it in place");
                Ok(())
            }
            PruneProgress::Succeeded | PruneProgress::Failed => {
                info!("Removing finished prune job from a previous deletion");
                self.client
                    .delete(OperandKind::Job, PRUNE_NAME, Propagation::Background)
                    .await
            }
        }
    }
}
