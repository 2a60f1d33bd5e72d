//! Test utilities for unit testing the reconciler
//!
//! This module provides helpers for creating test resources and a recording
//! [`MockHandlerSet`] that stands in for the Kubernetes-backed handlers.

#![cfg(test)]

use crate::error::{Component, ControllerError};
use crate::reconciler::HandlerSet;
use crds::{NodeFeatureDiscovery, NodeFeatureDiscoverySpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Helper to create a live NodeFeatureDiscovery CR
pub fn create_test_nfd(name: &str) -> NodeFeatureDiscovery {
    NodeFeatureDiscovery {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            uid: Some(format!("{name}-uid")),
            generation: Some(1),
            ..Default::default()
        },
        spec: NodeFeatureDiscoverySpec::default(),
        status: None,
    }
}

/// Helper to create a NodeFeatureDiscovery CR with the finalizer already set
pub fn create_test_nfd_with_finalizer(name: &str) -> NodeFeatureDiscovery {
    let mut nfd = create_test_nfd(name);
    nfd.metadata.finalizers = Some(vec![crate::handlers::finalizer::FINALIZER.to_string()]);
    nfd
}

/// Helper to create a NodeFeatureDiscovery CR whose deletion was requested
pub fn create_deleted_nfd(name: &str) -> NodeFeatureDiscovery {
    let mut nfd = create_test_nfd_with_finalizer(name);
    let timestamp: Time = serde_json::from_value(serde_json::json!("2024-01-01T00:00:00Z")).unwrap();
    nfd.metadata.deletion_timestamp = Some(timestamp);
    nfd
}

/// One call recorded by [`MockHandlerSet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    HasFinalizer,
    SetFinalizer,
    FinalizeComponents,
    Handle(Component),
}

/// Mock HandlerSet for testing
///
/// Records every call in order. Each operation succeeds unless it was
/// registered with [`MockHandlerSet::fail`].
#[derive(Clone, Default)]
pub struct MockHandlerSet {
    finalizer_present: Arc<Mutex<bool>>,
    failures: Arc<Mutex<HashSet<Operation>>>,
    calls: Arc<Mutex<Vec<Operation>>>,
}

impl MockHandlerSet {
    /// Create a mock whose `has_finalizer` returns `present`
    pub fn new(present: bool) -> Self {
        let mock = Self::default();
        *mock.finalizer_present.lock().unwrap() = present;
        mock
    }

    /// Make `operation` return an error
    pub fn fail(self, operation: Operation) -> Self {
        self.failures.lock().unwrap().insert(operation);
        self
    }

    /// Every recorded call, in order
    pub fn calls(&self) -> Vec<Operation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, operation: Operation) -> usize {
        self.calls.lock().unwrap().iter().filter(|op| **op == operation).count()
    }

    fn record(&self, operation: Operation) -> Result<(), ControllerError> {
        self.calls.lock().unwrap().push(operation);
        if !self.failures.lock().unwrap().contains(&operation) {
            return Ok(());
        }
        Err(match operation {
            Operation::SetFinalizer | Operation::HasFinalizer => {
                ControllerError::Finalizer("set finalizer error".to_string())
            }
            Operation::FinalizeComponents => ControllerError::Finalization("finalization error".to_string()),
            Operation::Handle(Component::Status) => ControllerError::Status("status error".to_string()),
            Operation::Handle(component) => ControllerError::Build(format!("{component} error")),
        })
    }
}

#[async_trait::async_trait]
impl HandlerSet for MockHandlerSet {
    fn has_finalizer(&self, _nfd: &NodeFeatureDiscovery) -> bool {
        self.calls.lock().unwrap().push(Operation::HasFinalizer);
        *self.finalizer_present.lock().unwrap()
    }

    async fn set_finalizer(&self, _nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError> {
        self.record(Operation::SetFinalizer)
    }

    async fn finalize_components(&self, _nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError> {
        self.record(Operation::FinalizeComponents)
    }

    async fn handle_master(&self, _nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError> {
        self.record(Operation::Handle(Component::Master))
    }

    async fn handle_worker(&self, _nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError> {
        self.record(Operation::Handle(Component::Worker))
    }

    async fn handle_topology(&self, _nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError> {
        self.record(Operation::Handle(Component::Topology))
    }

    async fn handle_gc(&self, _nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError> {
        self.record(Operation::Handle(Component::Gc))
    }

    async fn handle_prune(&self, _nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError> {
        self.record(Operation::Handle(Component::Prune))
    }

    async fn handle_status(&self, _nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError> {
        self.record(Operation::Handle(Component::Status))
    }
}
