//! nfd-worker DaemonSet and ConfigMap

use super::{
    app_labels, app_selector, host_path_volume, node_name_env, owned_meta,
    restricted_security_context, volume_mount,
};
use crate::components::master::MASTER_NAME;
use crate::error::ControllerError;
use crds::NodeFeatureDiscovery;
use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetSpec};
use k8s_openapi::api::core::v1::{
    Affinity, ConfigMap, ConfigMapVolumeSource, Container, KeyToPath, NodeAffinity, NodeSelector,
    NodeSelectorRequirement, NodeSelectorTerm, PodSpec, PodTemplateSpec, Toleration, Volume,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

pub const WORKER_NAME: &str = "nfd-worker";

/// ConfigMap key holding the worker configuration file
pub const WORKER_CONFIG_KEY: &str = "nfd-worker-conf";

const WORKER_CONFIG_DIR: &str = "/etc/kubernetes/node-feature-discovery";

pub fn desired_config_map(nfd: &NodeFeatureDiscovery, namespace: &str) -> Result<ConfigMap, ControllerError> {
    Ok(ConfigMap {
        metadata: owned_meta(nfd, WORKER_NAME, namespace)?,
        data: Some(BTreeMap::from([(
            WORKER_CONFIG_KEY.to_string(),
            nfd.spec.worker_config.config_data.clone(),
        )])),
        ..Default::default()
    })
}

pub fn desired_daemon_set(nfd: &NodeFeatureDiscovery, namespace: &str) -> Result<DaemonSet, ControllerError> {
    let operand = &nfd.spec.operand;

    let container = Container {
        name: WORKER_NAME.to_string(),
        image: Some(operand.image_path().to_string()),
        image_pull_policy: Some(operand.pull_policy().to_string()),
        command: Some(vec![WORKER_NAME.to_string()]),
        args: Some(vec![format!("--server={MASTER_NAME}:{}", operand.port())]),
        env: Some(vec![node_name_env()]),
        volume_mounts: Some(vec![
            volume_mount("host-boot", "/host-boot", true),
            volume_mount("host-os-release", "/host-etc/os-release", true),
            volume_mount("host-sys", "/host-sys", false),
            volume_mount("nfd-worker-config", WORKER_CONFIG_DIR, false),
            volume_mount("nfd-hooks", &format!("{WORKER_CONFIG_DIR}/source.d"), false),
            volume_mount("nfd-features", &format!("{WORKER_CONFIG_DIR}/features.d"), false),
        ]),
        security_context: Some(restricted_security_context()),
        ..Default::default()
    };

    Ok(DaemonSet {
        metadata: owned_meta(nfd, WORKER_NAME, namespace)?,
        spec: Some(DaemonSetSpec {
            selector: app_selector(WORKER_NAME),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(app_labels(WORKER_NAME)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(WORKER_NAME.to_string()),
                    dns_policy: Some("ClusterFirstWithHostNet".to_string()),
                    tolerations: Some(vec![Toleration {
                        operator: Some("Exists".to_string()),
                        effect: Some("NoSchedule".to_string()),
                        ..Default::default()
                    }]),
                    affinity: Some(worker_affinity()),
                    containers: vec![container],
                    volumes: Some(worker_volumes()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Run on worker nodes only: skip nodes carrying the master role label.
fn worker_affinity() -> Affinity {
    let term = |key: &str, operator: &str| NodeSelectorTerm {
        match_expressions: Some(vec![NodeSelectorRequirement {
            key: key.to_string(),
            operator: operator.to_string(),
            values: None,
        }]),
        ..Default::default()
    };

    Affinity {
        node_affinity: Some(NodeAffinity {
            required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                node_selector_terms: vec![
                    term("node-role.kubernetes.io/master", "DoesNotExist"),
                    term("node-role.kubernetes.io/node", "Exists"),
                ],
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn worker_volumes() -> Vec<Volume> {
    vec![
        host_path_volume("host-dev", "/dev"),
        host_path_volume("host-boot", "/boot"),
        host_path_volume("host-os-release", "/etc/os-release"),
        host_path_volume("host-sys", "/sys"),
        host_path_volume("nfd-hooks", &format!("{WORKER_CONFIG_DIR}/source.d")),
        host_path_volume("nfd-features", &format!("{WORKER_CONFIG_DIR}/features.d")),
        Volume {
            name: "nfd-worker-config".to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: WORKER_NAME.to_string(),
                items: Some(vec![KeyToPath {
                    key: WORKER_CONFIG_KEY.to_string(),
                    path: "nfd-worker.conf".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        },
    ]
}
