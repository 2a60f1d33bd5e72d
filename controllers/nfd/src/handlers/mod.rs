//! Kubernetes-backed [`HandlerSet`] for NodeFeatureDiscovery.
//!
//! - `client`: the API operations the handlers need, behind [`OperandClient`]
//! - `finalizer`: finalizer token management and teardown on deletion
//! - `components`: per-component convergence (master, worker, topology, gc, prune)
//! - `status`: condition computation and the status write

mod client;
mod components;
pub(crate) mod finalizer;
mod status;

pub use client::{KubeOperandClient, OperandClient};

use crate::error::ControllerError;
use crate::reconciler::HandlerSet;
use async_trait::async_trait;
use crds::NodeFeatureDiscovery;
use std::sync::Arc;

/// Handlers converging NodeFeatureDiscovery operands in one namespace.
#[derive(Clone)]
pub struct NfdHandlers {
    pub(crate) namespace: String,
    pub(crate) client: Arc<dyn OperandClient>,
}

impl std::fmt::Debug for NfdHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NfdHandlers")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl NfdHandlers {
    /// Creates handlers that place operands in `namespace` through `client`.
    pub fn new(client: Arc<dyn OperandClient>, namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            client,
        }
    }
}

#[async_trait]
impl HandlerSet for NfdHandlers {
    fn has_finalizer(&self, nfd: &NodeFeatureDiscovery) -> bool {
        finalizer::has_finalizer(nfd)
    }

    async fn set_finalizer(&self, nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError> {
        self.add_finalizer(nfd).await
    }

    async fn finalize_components(&self, nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError> {
        self.finalize(nfd).await
    }

    async fn handle_master(&self, nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError> {
        self.converge_master(nfd).await
    }

    async fn handle_worker(&self, nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError> {
        self.converge_worker(nfd).await
    }

    async fn handle_topology(&self, nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError> {
        self.converge_topology(nfd).await
    }

    async fn handle_gc(&self, nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError> {
        self.converge_gc(nfd).await
    }

    async fn handle_prune(&self, nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError> {
        self.converge_prune(nfd).await
    }

    async fn handle_status(&self, nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError> {
        self.update_status(nfd).await
    }
}
