//! NodeFeatureDiscovery CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the node feature discovery operator.

pub mod conditions;
pub mod node_feature_discovery;

pub use conditions::*;
pub use node_feature_discovery::*;
