//! NodeFeatureDiscovery CRD
//!
//! Cluster-scoped resource describing one node feature discovery deployment:
//! the operand image, worker and topology-updater configuration, and which
//! optional components (topology updater, prune-on-delete) are enabled.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use crate::conditions::NfdCondition;

/// Operand image used when `spec.operand.image` is not set.
pub const DEFAULT_OPERAND_IMAGE: &str = "registry.k8s.io/nfd/node-feature-discovery:v0.16.0";

/// Default gRPC port exposed by nfd-master.
pub const DEFAULT_SERVICE_PORT: i32 = 12000;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "nfd.kubernetes.io",
    version = "v1",
    kind = "NodeFeatureDiscovery",
    shortname = "nfd",
    status = "NodeFeatureDiscoveryStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct NodeFeatureDiscoverySpec {
    /// Operand (nfd-master / nfd-worker image) settings
    #[serde(default)]
    pub operand: Operand,

    /// Worker configuration file content
    #[serde(default)]
    pub worker_config: ConfigData,

    /// Deploy the nfd-topology-updater daemon
    #[serde(default)]
    pub topology_updater: bool,

    /// Topology updater configuration file content
    #[serde(default)]
    pub topology_updater_config: ConfigData,

    /// Run the prune job to remove NFD labels from nodes when this resource is deleted
    #[serde(default)]
    pub pruner_on_delete: bool,

    /// Extra label namespaces nfd-master is allowed to publish
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_label_ns: Vec<String>,

    /// Extended resource names nfd-master advertises from labels
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_labels: Vec<String>,

    /// Regular expression filtering the label names nfd-master publishes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_white_list: Option<String>,

    /// Allow nfd-master to taint nodes
    #[serde(default)]
    pub enable_taints: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Operand {
    /// Container image (defaults to the upstream release image)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Image pull policy (Always, IfNotPresent, Never)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,

    /// nfd-master gRPC service port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_port: Option<i32>,
}

impl Operand {
    /// Image to run, falling back to [`DEFAULT_OPERAND_IMAGE`].
    pub fn image_path(&self) -> &str {
        match self.image.as_deref() {
            Some(image) if !image.is_empty() => image,
            _ => DEFAULT_OPERAND_IMAGE,
        }
    }

    /// Pull policy, `Always` unless set.
    pub fn pull_policy(&self) -> &str {
        match self.image_pull_policy.as_deref() {
            Some(policy) if !policy.is_empty() => policy,
            _ => "Always",
        }
    }

    pub fn port(&self) -> i32 {
        self.service_port.unwrap_or(DEFAULT_SERVICE_PORT)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigData {
    /// Raw configuration file content
    #[serde(default)]
    pub config_data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeFeatureDiscoveryStatus {
    /// Current conditions (Available, Progressing, Degraded, Upgradeable)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<NfdCondition>,

    /// Generation of the spec the conditions were computed for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operand_defaults_apply_when_unset() {
        let operand = Operand::default();
        assert_eq!(operand.image_path(), DEFAULT_OPERAND_IMAGE);
        assert_eq!(operand.pull_policy(), "Always");
        assert_eq!(operand.port(), DEFAULT_SERVICE_PORT);
    }

    #[test]
    fn operand_empty_strings_fall_back_to_defaults() {
        let operand = Operand {
            image: Some(String::new()),
            image_pull_policy: Some(String::new()),
            service_port: None,
        };
        assert_eq!(operand.image_path(), DEFAULT_OPERAND_IMAGE);
        assert_eq!(operand.pull_policy(), "Always");
    }

    #[test]
    fn spec_deserializes_camel_case() {
        let spec: NodeFeatureDiscoverySpec = serde_json::from_value(serde_json::json!({
            "operand": {
                "image": "quay.io/example/nfd:v1",
                "imagePullPolicy": "IfNotPresent",
                "servicePort": 12001
            },
            "workerConfig": { "configData": "core:\n  sleepInterval: 60s\n" },
            "topologyUpdater": true,
            "prunerOnDelete": true,
            "extraLabelNs": ["example.com"]
        }))
        .unwrap();

        assert_eq!(spec.operand.image_path(), "quay.io/example/nfd:v1");
        assert_eq!(spec.operand.pull_policy(), "IfNotPresent");
        assert_eq!(spec.operand.port(), 12001);
        assert!(spec.topology_updater);
        assert!(spec.pruner_on_delete);
        assert!(!spec.enable_taints);
        assert_eq!(spec.extra_label_ns, vec!["example.com".to_string()]);
        assert!(spec.worker_config.config_data.contains("sleepInterval"));
    }

    #[test]
    fn crd_is_cluster_scoped() {
        use kube::CustomResourceExt;
        let crd = NodeFeatureDiscovery::crd();
        assert_eq!(crd.spec.scope, "Cluster");
        assert_eq!(crd.spec.group, "nfd.kubernetes.io");
    }
}
