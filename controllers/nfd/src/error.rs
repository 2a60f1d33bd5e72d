//! Controller-specific error types.
//!
//! Every variant is scoped to a single NodeFeatureDiscovery resource and is
//! retryable: the watcher's error policy requeues with backoff, nothing here
//! is fatal to the process except configuration and watch failures at startup.

use std::fmt;
use thiserror::Error;
use kube::Error as KubeError;

/// Managed component of a NodeFeatureDiscovery deployment.
///
/// Order of the variants is the order the reconciler runs their handlers in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Master,
    Worker,
    Topology,
    Gc,
    Prune,
    Status,
}

impl Component {
    /// Every component, in reconcile order.
    pub const ALL: [Component; 6] = [
        Component::Master,
        Component::Worker,
        Component::Topology,
        Component::Gc,
        Component::Prune,
        Component::Status,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Component::Master => "master",
            Component::Worker => "worker",
            Component::Topology => "topology",
            Component::Gc => "gc",
            Component::Prune => "prune",
            Component::Status => "status",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in the NodeFeatureDiscovery controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Reading or persisting the finalizer token failed
    #[error("Finalizer management failed: {0}")]
    Finalizer(String),

    /// One or more teardown steps failed during deletion
    #[error("Finalization failed: {0}")]
    Finalization(String),

    /// A component handler failed to reach its desired state
    #[error("Component {component} failed to converge: {source}")]
    Convergence {
        component: Component,
        #[source]
        source: Box<ControllerError>,
    },

    /// Desired-state object could not be built
    #[error("Failed to build desired object: {0}")]
    Build(String),

    /// Persisting the status sub-resource failed
    #[error("Status update failed: {0}")]
    Status(String),

    /// One or more component handlers failed in the same reconcile pass
    #[error("{0}")]
    Components(ComponentErrors),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// Attach the failing component to an error returned by its handler.
    ///
    /// Status errors already identify themselves and are kept as-is.
    pub fn in_component(self, component: Component) -> Self {
        match self {
            err @ (ControllerError::Status(_) | ControllerError::Convergence { .. }) => err,
            err => ControllerError::Convergence {
                component,
                source: Box::new(err),
            },
        }
    }

    /// Components named by this error, for logging and tests.
    pub fn failed_components(&self) -> Vec<Component> {
        match self {
            ControllerError::Convergence { component, .. } => vec![*component],
            ControllerError::Status(_) => vec![Component::Status],
            ControllerError::Components(errors) => errors.components().collect(),
            _ => Vec::new(),
        }
    }
}

/// Every handler failure from one reconcile pass, in reconcile order.
#[derive(Debug, Default)]
pub struct ComponentErrors {
    errors: Vec<(Component, ControllerError)>,
}

impl ComponentErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, component: Component, error: ControllerError) {
        self.errors.push((component, error));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn components(&self) -> impl Iterator<Item = Component> + '_ {
        self.errors.iter().map(|(component, _)| *component)
    }

    /// `Ok(())` when empty, otherwise the aggregated error.
    pub fn into_result(self) -> Result<(), ControllerError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ControllerError::Components(self))
        }
    }
}

impl fmt::Display for ComponentErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} component(s) failed:", self.errors.len())?;
        for (component, error) in &self.errors {
            write!(f, " [{component}: {error}]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_aggregate_is_ok() {
        assert!(ComponentErrors::new().into_result().is_ok());
    }

    #[test]
    fn aggregate_names_every_failing_component() {
        let mut errors = ComponentErrors::new();
        errors.push(Component::Master, ControllerError::Build("master".into()).in_component(Component::Master));
        errors.push(Component::Status, ControllerError::Status("conflict".into()));

        let err = errors.into_result().unwrap_err();
        assert_eq!(err.failed_components(), vec![Component::Master, Component::Status]);

        let msg = err.to_string();
        assert!(msg.starts_with("2 component(s) failed:"), "{msg}");
        assert!(msg.contains("[master:"), "{msg}");
        assert!(msg.contains("[status: Status update failed: conflict]"), "{msg}");
    }

    #[test]
    fn in_component_keeps_status_errors() {
        let err = ControllerError::Status("x".into()).in_component(Component::Status);
        assert!(matches!(err, ControllerError::Status(_)));

        let err = ControllerError::InvalidConfig("x".into()).in_component(Component::Gc);
        assert_eq!(err.failed_components(), vec![Component::Gc]);
    }
}
