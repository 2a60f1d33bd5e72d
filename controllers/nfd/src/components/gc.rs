//! nfd-gc Deployment
//!
//! Garbage-collects NodeFeature objects left behind by removed nodes.

use super::master::{control_plane_affinity, control_plane_tolerations};
use super::{app_labels, app_selector, node_name_env, owned_meta, restricted_security_context};
use crate::error::ControllerError;
use crds::NodeFeatureDiscovery;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

pub const GC_NAME: &str = "nfd-gc";

const GC_INTERVAL: &str = "1h";

pub fn desired_deployment(nfd: &NodeFeatureDiscovery, namespace: &str) -> Result<Deployment, ControllerError> {
    let operand = &nfd.spec.operand;

    let container = Container {
        name: GC_NAME.to_string(),
        image: Some(operand.image_path().to_string()),
        image_pull_policy: Some(operand.pull_policy().to_string()),
        command: Some(vec![GC_NAME.to_string()]),
        args: Some(vec![format!("-gc-interval={GC_INTERVAL}")]),
        env: Some(vec![node_name_env()]),
        security_context: Some(restricted_security_context()),
        ..Default::default()
    };

    Ok(Deployment {
        metadata: owned_meta(nfd, GC_NAME, namespace)?,
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: app_selector(GC_NAME),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(app_labels(GC_NAME)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(GC_NAME.to_string()),
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
