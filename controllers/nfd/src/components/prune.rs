//! nfd-prune Job
//!
//! Strips NFD labels, annotations and extended resources from every node.
//! Only run while finalizing an instance with `spec.prunerOnDelete` set.

use super::master::{control_plane_affinity, control_plane_tolerations, MASTER_NAME};
use super::{app_labels, node_name_env, owned_meta, restricted_security_context};
use crate::error::ControllerError;
use crds::NodeFeatureDiscovery;
use k8s_openapi::api::batch::v1::{Job, JobSpec, JobStatus};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

pub const PRUNE_NAME: &str = "nfd-prune";

const PRUNE_BACKOFF_LIMIT: i32 = 4;

pub fn desired_job(nfd: &NodeFeatureDiscovery, namespace: &str) -> Result<Job, ControllerError> {
    let operand = &nfd.spec.operand;

    let container = Container {
        name: PRUNE_NAME.to_string(),
        image: Some(operand.image_path().to_string()),
        image_pull_policy: Some(operand.pull_policy().to_string()),
        command: Some(vec![MASTER_NAME.to_string()]),
        args: Some(vec!["-prune".to_string()]),
        env: Some(vec![node_name_env()]),
        security_context: Some(restricted_security_context()),
        ..Default::default()
    };

    Ok(Job {
        metadata: owned_meta(nfd, PRUNE_NAME, namespace)?,
        spec: Some(JobSpec {
            backoff_limit: Some(PRUNE_BACKOFF_LIMIT),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(app_labels(PRUNE_NAME)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(PRUNE_NAME.to_string()),
                    restart_policy: Some("Never".to_string()),
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

/// Outcome of an existing prune Job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneProgress {
    Running,
    Succeeded,
    Failed,
}

pub fn prune_progress(status: Option<&JobStatus>) -> PruneProgress {
    let Some(status) = status else {
        return PruneProgress::Running;
    };
    if status.succeeded.unwrap_or(0) > 0 {
        PruneProgress::Succeeded
    } else if status.failed.unwrap_or(0) > PRUNE_BACKOFF_LIMIT {
        PruneProgress::Failed
    } else {
        PruneProgress::Running
    }
}
