//! Reconciliation logic for NodeFeatureDiscovery resources.
//!
//! The reconciler is a level-triggered state machine with two branches:
//! - deletion requested: tear every component down via the finalizer path
//! - live: make sure the finalizer is present, then converge every component
//!
//! It owns no component logic itself. All work goes through a [`HandlerSet`],
//! so tests substitute a recording double for the Kubernetes-backed handlers.


use crate::error::{Component, ComponentErrors, ControllerError};
use async_trait::async_trait;
use crds::NodeFeatureDiscovery;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use tracing::{debug, error, info, instrument};

/// Per-component handlers and finalizer lifecycle for a NodeFeatureDiscovery.
///
/// Every async operation must be idempotent: the reconciler calls them on
/// every pass and expects a no-op when the component is already converged.
#[async_trait]
pub trait HandlerSet: Send + Sync {
    /// Whether the controller's finalizer token is on the resource.
    fn has_finalizer(&self, nfd: &NodeFeatureDiscovery) -> bool;

    /// Add the finalizer token and persist it.
    async fn set_finalizer(&self, nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError>;

    /// Tear down every dependent object, then release the finalizer.
    async fn finalize_components(&self, nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError>;

    /// Converge the nfd-master Deployment and Service.
    async fn handle_master(&self, nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError>;

    /// Converge the nfd-worker ConfigMap and DaemonSet.
    async fn handle_worker(&self, nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError>;

    /// Converge the topology updater, or remove it when disabled.
    async fn handle_topology(&self, nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError>;

    /// Converge the nfd-gc Deployment.
    async fn handle_gc(&self, nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError>;

    /// Clear a finished prune Job left over from an earlier deletion.
    async fn handle_prune(&self, nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError>;

    /// Recompute conditions from the other components and persist them.
    async fn handle_status(&self, nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError>;
}

/// Reconciles NodeFeatureDiscovery resources.
pub struct Reconciler {
    handlers: Box<dyn HandlerSet>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a new reconciler over the given handlers.
    pub fn new(handlers: impl HandlerSet + 'static) -> Self {
        Self {
            handlers: Box::new(handlers),
        }
    }

    /// Runs one reconcile pass.
    ///
    /// Always returns [`Action::await_change`] on success. Retry is signalled
    /// only through the error, which the watcher turns into a backoff requeue.
    /// A pass whose future is dropped mid-sequence counts as failed: nothing
    /// is recorded, and the next pass starts from the beginning.
    #[instrument(skip(self, nfd), fields(nfd = %nfd.name_any()))]
    pub async fn reconcile(&self, nfd: &NodeFeatureDiscovery) -> Result<Action, ControllerError> {
        if nfd.metadata.deletion_timestamp.is_some() {
            info!("Deletion requested, finalizing components");
            if let Err(e) = self.handlers.finalize_components(nfd).await {
                error!("Finalization failed: {}", e);
                return Err(e);
            }
            return Ok(Action::await_change());
        }

        if !self.handlers.has_finalizer(nfd) {
            // Component work only starts on the next pass, once deletion is protected
            info!("Adding finalizer");
            if let Err(e) = self.handlers.set_finalizer(nfd).await {
                error!("Failed to set finalizer: {}", e);
                return Err(e);
            }
            return Ok(Action::await_change());
        }

        self.converge_components(nfd).await?;
        debug!("All components converged");
        Ok(Action::await_change())
    }

    /// Runs every component handler in order, collecting failures.
    ///
    /// A failing handler never stops the ones after it; status runs last so it
    /// sees the outcome of everything else in this pass.
    async fn converge_components(&self, nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError> {
        let mut errors = ComponentErrors::new();

        for component in Component::ALL {
            let result = match component {
                Component::Master => self.handlers.handle_master(nfd).await,
                Component::Worker => self.handlers.handle_worker(nfd).await,
                Component::Topology => self.handlers.handle_topology(nfd).await,
                Component::Gc => self.handlers.handle_gc(nfd).await,
                Component::Prune => self.handlers.handle_prune(nfd).await,
                Component::Status => self.handlers.handle_status(nfd).await,
            };

            if let Err(e) = result {
                error!(component = %component, "Component handler failed: {}", e);
                errors.push(component, e.in_component(component));
            }
        }

        errors.into_result()
    }
}
