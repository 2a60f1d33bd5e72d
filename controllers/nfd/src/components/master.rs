//! nfd-master Deployment and Service

use super::{app_labels, app_selector, node_name_env, owned_meta, restricted_security_context};
use crate::error::ControllerError;
use crds::NodeFeatureDiscovery;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Affinity, Container, ContainerPort, NodeAffinity, NodeSelectorRequirement, NodeSelectorTerm,
    PodSpec, PodTemplateSpec, PreferredSchedulingTerm, Service, ServicePort, ServiceSpec, Toleration,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

pub const MASTER_NAME: &str = "nfd-master";

const CONTROL_PLANE_LABEL: &str = "node-role.kubernetes.io/control-plane";

/// Command-line arguments derived from the instance spec.
pub fn master_args(nfd: &NodeFeatureDiscovery) -> Vec<String> {
    let spec = &nfd.spec;
    let mut args = vec![format!("-port={}", spec.operand.port())];

    if !spec.extra_label_ns.is_empty() {
        args.push(format!("-extra-label-ns={}", spec.extra_label_ns.join(",")));
    }
    if !spec.resource_labels.is_empty() {
        args.push(format!("-resource-labels={}", spec.resource_labels.join(",")));
    }
    if let Some(whitelist) = spec.label_white_list.as_deref().filter(|w| !w.is_empty()) {
        args.push(format!("-label-whitelist={whitelist}"));
    }
    if spec.enable_taints {
        args.push("-enable-taints".to_string());
    }
    args
}

pub fn desired_deployment(nfd: &NodeFeatureDiscovery, namespace: &str) -> Result<Deployment, ControllerError> {
    let operand = &nfd.spec.operand;

    let container = Container {
        name: MASTER_NAME.to_string(),
        image: Some(operand.image_path().to_string()),
        image_pull_policy: Some(operand.pull_policy().to_string()),
        command: Some(vec![MASTER_NAME.to_string()]),
        args: Some(master_args(nfd)),
        env: Some(vec![node_name_env()]),
        ports: Some(vec![ContainerPort {
            name: Some("grpc".to_string()),
            container_port: operand.port(),
            ..Default::default()
        }]),
        security_context: Some(restricted_security_context()),
        ..Default::default()
    };

    Ok(Deployment {
        metadata: owned_meta(nfd, MASTER_NAME, namespace)?,
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: app_selector(MASTER_NAME),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(app_labels(MASTER_NAME)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(MASTER_NAME.to_string()),
                    tolerations: Some(control_plane_tolerations()),
                    affinity: Some(control_plane_affinity()),
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

pub fn desired_service(nfd: &NodeFeatureDiscovery, namespace: &str) -> Result<Service, ControllerError> {
    let port = nfd.spec.operand.port();
    Ok(Service {
        metadata: owned_meta(nfd, MASTER_NAME, namespace)?,
        spec: Some(ServiceSpec {
            selector: Some(app_labels(MASTER_NAME)),
            ports: Some(vec![ServicePort {
                name: Some("grpc".to_string()),
                protocol: Some("TCP".to_string()),
                port,
                target_port: Some(IntOrString::Int(port)),
                ..Default::default()
            }]),
            type_: Some("ClusterIP".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Tolerate the control-plane taints so master-side pods can run there.
pub(crate) fn control_plane_tolerations() -> Vec<Toleration> {
    ["node-role.kubernetes.io/master", CONTROL_PLANE_LABEL]
        .into_iter()
        .map(|key| Toleration {
            key: Some(key.to_string()),
            operator: Some("Equal".to_string()),
            value: Some(String::new()),
            effect: Some("NoSchedule".to_string()),
            ..Default::default()
        })
        .collect()
}

/// Prefer, but do not require, control-plane nodes.
pub(crate) fn control_plane_affinity() -> Affinity {
    Affinity {
        node_affinity: Some(NodeAffinity {
            preferred_during_scheduling_ignored_during_execution: Some(vec![PreferredSchedulingTerm {
                weight: 1,
                preference: NodeSelectorTerm {
                    match_expressions: Some(vec![NodeSelectorRequirement {
                        key: CONTROL_PLANE_LABEL.to_string(),
                        operator: "In".to_string(),
                        values: Some(vec![String::new()]),
                    }]),
                    ..Default::default()
                },
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
