//! nfd-topology-updater DaemonSet and ConfigMap
//!
//! Only deployed when `spec.topologyUpdater` is set.

use super::{
    app_labels, app_selector, host_path_volume, node_name_env, owned_meta,
    restricted_security_context, volume_mount,
};
use crate::error::ControllerError;
use crds::NodeFeatureDiscovery;
use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, PodSpec, PodTemplateSpec, Volume,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

pub const TOPOLOGY_NAME: &str = "nfd-topology-updater";

pub const TOPOLOGY_CONFIG_KEY: &str = "nfd-topology-updater.conf";

const KUBELET_DIR: &str = "/host-var/lib/kubelet";

pub fn desired_config_map(nfd: &NodeFeatureDiscovery, namespace: &str) -> Result<ConfigMap, ControllerError> {
    Ok(ConfigMap {
        metadata: owned_meta(nfd, TOPOLOGY_NAME, namespace)?,
        data: Some(BTreeMap::from([(
            TOPOLOGY_CONFIG_KEY.to_string(),
            nfd.spec.topology_updater_config.config_data.clone(),
        )])),
        ..Default::default()
    })
}

pub fn desired_daemon_set(nfd: &NodeFeatureDiscovery, namespace: &str) -> Result<DaemonSet, ControllerError> {
    let operand = &nfd.spec.operand;

    let container = Container {
        name: TOPOLOGY_NAME.to_string(),
        image: Some(operand.image_path().to_string()),
        image_pull_policy: Some(operand.pull_policy().to_string()),
        command: Some(vec![TOPOLOGY_NAME.to_string()]),
        args: Some(vec![
            format!("-kubelet-config-uri=file://{KUBELET_DIR}/config.yaml"),
            format!("-podresources-socket={KUBELET_DIR}/pod-resources/kubelet.sock"),
            "-sleep-interval=3s".to_string(),
        ]),
        env: Some(vec![node_name_env()]),
        volume_mounts: Some(vec![
            volume_mount("kubelet-config", &format!("{KUBELET_DIR}/config.yaml"), true),
            volume_mount("kubelet-podresources-sock", &format!("{KUBELET_DIR}/pod-resources/kubelet.sock"), false),
            volume_mount("host-sys", "/host-sys", true),
            volume_mount("nfd-topology-updater-conf", "/etc/kubernetes/node-feature-discovery", true),
        ]),
        security_context: Some(restricted_security_context()),
        ..Default::default()
    };

    Ok(DaemonSet {
        metadata: owned_meta(nfd, TOPOLOGY_NAME, namespace)?,
        spec: Some(DaemonSetSpec {
            selector: app_selector(TOPOLOGY_NAME),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(app_labels(TOPOLOGY_NAME)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(TOPOLOGY_NAME.to_string()),
                    dns_policy: Some("ClusterFirstWithHostNet".to_string()),
                    containers: vec![container],
                    volumes: Some(vec![
                        host_path_volume("kubelet-config", "/var/lib/kubelet/config.yaml"),
                        host_path_volume("kubelet-podresources-sock", "/var/lib/kubelet/pod-resources/kubelet.sock"),
                        host_path_volume("host-sys", "/sys"),
                        Volume {
                            name: "nfd-topology-updater-conf".to_string(),
                            config_map: Some(ConfigMapVolumeSource {
                                name: TOPOLOGY_NAME.to_string(),
                                ..Default::default()
                            }),
                            ..Default::default()
                        },
                    ]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}
