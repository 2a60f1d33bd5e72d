//! Desired-state builders for the NodeFeatureDiscovery operands.
//!
//! Pure functions: each takes the instance plus the operand namespace and
//! returns the Kubernetes objects that component should converge to, owned by
//! the instance so garbage collection follows it. Nothing here talks to the API.

pub mod gc;
pub mod master;
pub mod prune;
pub mod topology;
pub mod worker;

use crate::error::ControllerError;
use crds::NodeFeatureDiscovery;
use k8s_openapi::api::core::v1::{
    Capabilities, EnvVar, EnvVarSource, HostPathVolumeSource, ObjectFieldSelector,
    SeccompProfile, SecurityContext, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

/// Label key selecting operand pods
pub const APP_LABEL: &str = "app";

/// Labels identifying one operand's pods.
pub fn app_labels(app: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(APP_LABEL.to_string(), app.to_string())])
}

pub fn app_selector(app: &str) -> LabelSelector {
    LabelSelector {
        match_labels: Some(app_labels(app)),
        ..Default::default()
    }
}

/// Metadata for an operand object owned by `nfd`.
///
/// Fails when `nfd` has no uid yet, since the owner reference would be invalid.
pub fn owned_meta(
    nfd: &NodeFeatureDiscovery,
    name: &str,
    namespace: &str,
) -> Result<ObjectMeta, ControllerError> {
    let owner = nfd.controller_owner_ref(&()).ok_or_else(|| {
        ControllerError::Build(format!(
            "NodeFeatureDiscovery {} has no uid, cannot own {name}",
            nfd.name_any()
        ))
    })?;

    Ok(ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(app_labels(name)),
        owner_references: Some(vec![owner]),
        ..Default::default()
    })
}

/// `NODE_NAME` from the downward API, as every per-node daemon needs it.
pub fn node_name_env() -> EnvVar {
    EnvVar {
        name: "NODE_NAME".to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: "spec.nodeName".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Read-only root, non-root, no privilege escalation, all capabilities dropped.
pub fn restricted_security_context() -> SecurityContext {
    SecurityContext {
        read_only_root_filesystem: Some(true),
        run_as_non_root: Some(true),
        allow_privilege_escalation: Some(false),
        seccomp_profile: Some(SeccompProfile {
            type_: "RuntimeDefault".to_string(),
            ..Default::default()
        }),
        capabilities: Some(Capabilities {
            drop: Some(vec!["ALL".to_string()]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn host_path_volume(name: &str, path: &str) -> Volume {
    Volume {
        name: name.to_string(),
        host_path: Some(HostPathVolumeSource {
            path: path.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn volume_mount(name: &str, mount_path: &str, read_only: bool) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: mount_path.to_string(),
        read_only: read_only.then_some(true),
        ..Default::default()
    }
}
