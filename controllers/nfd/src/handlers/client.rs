//! Kubernetes calls made by the NodeFeatureDiscovery handlers.
//!
//! [`OperandClient`] is the seam between handler logic and the API server so
//! the handlers can be tested against a mock.

use crate::error::ControllerError;
use async_trait::async_trait;
use crds::{NodeFeatureDiscovery, NodeFeatureDiscoveryStatus};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::api::{DeleteParams, Patch, PatchParams};
use kube::{Api, Client, Resource};
#[cfg(test)]
use mockall::automock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// Field manager used for every server-side apply
pub const FIELD_MANAGER: &str = "nfd-controller";

/// Operand object kinds the handlers delete by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    Deployment,
    DaemonSet,
    ConfigMap,
    Service,
    Job,
}

impl fmt::Display for OperandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperandKind::Deployment => "deployment",
            OperandKind::DaemonSet => "daemonset",
            OperandKind::ConfigMap => "configmap",
            OperandKind::Service => "service",
            OperandKind::Job => "job",
        })
    }
}

/// How dependents of a deleted object are removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Return immediately, dependents go away afterwards
    Background,
    /// Object stays (with a deletion timestamp) until its dependents are gone
    Foreground,
}

/// API operations on the operand namespace and the instance itself.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait OperandClient: Send + Sync {
    /// Server-side apply a Deployment
    async fn apply_deployment(&self, deployment: &Deployment) -> Result<(), ControllerError>;
    /// Server-side apply a DaemonSet
    async fn apply_daemon_set(&self, daemon_set: &DaemonSet) -> Result<(), ControllerError>;
    /// Server-side apply a ConfigMap
    async fn apply_config_map(&self, config_map: &ConfigMap) -> Result<(), ControllerError>;
    /// Server-side apply a Service
    async fn apply_service(&self, service: &Service) -> Result<(), ControllerError>;
    /// Server-side apply a Job
    async fn apply_job(&self, job: &Job) -> Result<(), ControllerError>;

    async fn get_deployment(&self, name: &str) -> Result<Option<Deployment>, ControllerError>;
    async fn get_daemon_set(&self, name: &str) -> Result<Option<DaemonSet>, ControllerError>;
    async fn get_job(&self, name: &str) -> Result<Option<Job>, ControllerError>;

    /// Delete an operand object. An already-missing object is not an error.
    async fn delete(
        &self,
        kind: OperandKind,
        name: &str,
        propagation: Propagation,
    ) -> Result<(), ControllerError>;

    /// Replace the instance's finalizer list.
    ///
    /// With a `resource_version` the write is rejected if the instance changed since it was read.
    async fn patch_finalizers(
        &self,
        name: &str,
        finalizers: Vec<String>,
        resource_version: Option<String>,
    ) -> Result<(), ControllerError>;

    /// Write the instance's status subresource.
    async fn patch_status(
        &self,
        name: &str,
        status: &NodeFeatureDiscoveryStatus,
    ) -> Result<(), ControllerError>;
}

/// [`OperandClient`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeOperandClient {
    nfd_api: Api<NodeFeatureDiscovery>,
    daemon_set_api: Api<DaemonSet>,
    deployment_api: Api<Deployment>,
    config_map_api: Api<ConfigMap>,
    service_api: Api<Service>,
    job_api: Api<Job>,
}

impl fmt::Debug for KubeOperandClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeOperandClient").finish_non_exhaustive()
    }
}

impl KubeOperandClient {
    /// Client for cluster-scoped instances with operands in `namespace`.
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            nfd_api: Api::all(client.clone()),
            daemon_set_api: Api::namespaced(client.clone(), namespace),
            deployment_api: Api::namespaced(client.clone(), namespace),
            config_map_api: Api::namespaced(client.clone(), namespace),
            service_api: Api::namespaced(client.clone(), namespace),
            job_api: Api::namespaced(client, namespace),
        }
    }
}

async fn apply<K>(api: &Api<K>, obj: &K) -> Result<(), ControllerError>
where
    K: Resource + Clone + fmt::Debug + Serialize + DeserializeOwned,
{
    let name = obj
        .meta()
        .name
        .as_deref()
        .ok_or_else(|| ControllerError::Build("desired object has no name".to_string()))?;

    let pp = PatchParams::apply(FIELD_MANAGER).force();
    api.patch(name, &pp, &Patch::Apply(obj)).await?;
    debug!("Applied {}", name);
    Ok(())
}

async fn delete_if_exists<K>(api: &Api<K>, name: &str, propagation: Propagation) -> Result<(), ControllerError>
where
    K: Resource + Clone + fmt::Debug + DeserializeOwned,
{
    let dp = match propagation {
        Propagation::Background => DeleteParams::background(),
        Propagation::Foreground => DeleteParams::foreground(),
    };
    match api.delete(name, &dp).await {
        Ok(_) => {
            debug!("Deleted {}", name);
            Ok(())
        }
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn finalizer_patch(finalizers: Vec<String>, resource_version: Option<String>) -> serde_json::Value {
    let mut patch = serde_json::json!({
        "metadata": {
            "finalizers": finalizers,
        }
    });
    if let Some(rv) = resource_version {
        patch["metadata"]["resourceVersion"] = serde_json::Value::String(rv);
    }
    patch
}

#[async_trait]
impl OperandClient for KubeOperandClient {
    async fn apply_deployment(&self, deployment: &Deployment) -> Result<(), ControllerError> {
        apply(&self.deployment_api, deployment).await
    }

    async fn apply_daemon_set(&self, daemon_set: &DaemonSet) -> Result<(), ControllerError> {
        apply(&self.daemon_set_api, daemon_set).await
    }

    async fn apply_config_map(&self, config_map: &ConfigMap) -> Result<(), ControllerError> {
        apply(&self.config_map_api, config_map).await
    }

    async fn apply_service(&self, service: &Service) -> Result<(), ControllerError> {
        apply(&self.service_api, service).await
    }

    async fn apply_job(&self, job: &Job) -> Result<(), ControllerError> {
        apply(&self.job_api, job).await
    }

    async fn get_deployment(&self, name: &str) -> Result<Option<Deployment>, ControllerError> {
        Ok(self.deployment_api.get_opt(name).await?)
    }

    async fn get_daemon_set(&self, name: &str) -> Result<Option<DaemonSet>, ControllerError> {
        Ok(self.daemon_set_api.get_opt(name).await?)
    }

    async fn get_job(&self, name: &str) -> Result<Option<Job>, ControllerError> {
        Ok(self.job_api.get_opt(name).await?)
    }

    async fn delete(
        &self,
        kind: OperandKind,
        name: &str,
        propagation: Propagation,
    ) -> Result<(), ControllerError> {
        match kind {
            OperandKind::Deployment => delete_if_exists(&self.deployment_api, name, propagation).await,
            OperandKind::DaemonSet => delete_if_exists(&self.daemon_set_api, name, propagation).await,
            OperandKind::ConfigMap => delete_if_exists(&self.config_map_api, name, propagation).await,
            OperandKind::Service => delete_if_exists(&self.service_api, name, propagation).await,
            OperandKind::Job => delete_if_exists(&self.job_api, name, propagation).await,
        }
    }

    async fn patch_finalizers(
        &self,
        name: &str,
        finalizers: Vec<String>,
        resource_version: Option<String>,
    ) -> Result<(), ControllerError> {
        let patch = finalizer_patch(finalizers, resource_version);
        self.nfd_api
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| ControllerError::Finalizer(format!("{name}: {e}")))?;
        Ok(())
    }

    async fn patch_status(
        &self,
        name: &str,
        status: &NodeFeatureDiscoveryStatus,
    ) -> Result<(), ControllerError> {
        let patch = serde_json::json!({ "status": status });
        self.nfd_api
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| ControllerError::Status(format!("{name}: {e}")))?;
        Ok(())
    }
}
