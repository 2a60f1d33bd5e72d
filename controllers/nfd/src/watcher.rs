//! Kubernetes resource watcher.
//!
//! Drives the reconciler from a `kube_runtime::Controller` over every
//! NodeFeatureDiscovery in the cluster. Changes to the operand objects in the
//! operand namespace trigger a reconcile of the instance that controls them.

use crate::backoff::BackoffTracker;
use crate::error::ControllerError;
use crate::probes::Readiness;
use crate::reconciler::Reconciler;
use crds::NodeFeatureDiscovery;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::{Api, Client, Resource, ResourceExt};
use kube_runtime::controller::{Action, Config as ControllerConfig};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{watcher, Controller};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Wait after the last event before reconciling, batching bursts of
/// status updates from the operand workloads.
const DEBOUNCE: Duration = Duration::from_secs(2);

/// Shared state handed to every reconcile.
#[derive(Debug)]
pub struct WatchContext {
    pub reconciler: Reconciler,
    pub backoff: BackoffTracker,
}

/// The NodeFeatureDiscovery controlling `obj`, if any.
///
/// Instances are cluster-scoped while operands are namespaced, so the owner is
/// resolved by name alone.
pub fn owning_instance<K: Resource>(obj: &K) -> Option<ObjectRef<NodeFeatureDiscovery>> {
    let kind = NodeFeatureDiscovery::kind(&());
    let api_version = NodeFeatureDiscovery::api_version(&());
    obj.owner_references()
        .iter()
        .find(|owner| owner.controller == Some(true) && owner.kind == kind && owner.api_version == api_version)
        .map(|owner| ObjectRef::new(&owner.name))
}

async fn reconcile(nfd: Arc<NodeFeatureDiscovery>, ctx: Arc<WatchContext>) -> Result<Action, ControllerError> {
    debug!("Reconciling NodeFeatureDiscovery {}", nfd.name_any());
    let action = ctx.reconciler.reconcile(&nfd).await?;
    ctx.backoff.reset(&nfd.name_any());
    Ok(action)
}

fn error_policy(nfd: Arc<NodeFeatureDiscovery>, error: &ControllerError, ctx: Arc<WatchContext>) -> Action {
    let name = nfd.name_any();
    let (delay, attempts) = ctx.backoff.next_backoff(&name);
    let failed: Vec<_> = error.failed_components().iter().map(|c| c.as_str()).collect();
    if failed.is_empty() {
        error!("Reconciliation of {} failed (attempt {}), retrying in {:?}: {}", name, attempts, delay, error);
    } else {
        error!(
            components = ?failed,
            "Reconciliation of {} failed (attempt {}), retrying in {:?}: {}", name, attempts, delay, error
        );
    }
    Action::requeue(delay)
}

/// Run the controller until its stream ends.
///
/// `readiness` is flipped once the controller is built and about to watch.
pub async fn watch_node_feature_discoveries(
    client: Client,
    namespace: &str,
    concurrency: u16,
    reconciler: Reconciler,
    readiness: Readiness,
) -> Result<(), ControllerError> {
    info!("Starting NodeFeatureDiscovery watcher (operand namespace {})", namespace);

    let nfd_api: Api<NodeFeatureDiscovery> = Api::all(client.clone());
    let daemon_set_api: Api<DaemonSet> = Api::namespaced(client.clone(), namespace);
    let deployment_api: Api<Deployment> = Api::namespaced(client.clone(), namespace);
    let config_map_api: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    let service_api: Api<Service> = Api::namespaced(client, namespace);

    let context = Arc::new(WatchContext {
        reconciler,
        backoff: BackoffTracker::new(),
    });

    let controller_config = ControllerConfig::default()
        .debounce(DEBOUNCE)
        .concurrency(concurrency);

    let controller = Controller::new(nfd_api, watcher::Config::default())
        .watches(daemon_set_api, watcher::Config::default(), |o| owning_instance(&o))
        .watches(deployment_api, watcher::Config::default(), |o| owning_instance(&o))
        .watches(config_map_api, watcher::Config::default(), |o| owning_instance(&o))
        .watches(service_api, watcher::Config::default(), |o| owning_instance(&o))
        .with_config(controller_config);

    readiness.set_ready();

    controller
        .run(reconcile, error_policy, context)
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => debug!("Reconciled {}", obj.name),
                Err(e) => warn!("Controller error: {}", e),
            }
        })
        .await;

    Err(ControllerError::Watch("NodeFeatureDiscovery watch stream ended".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::worker;
    use crate::test_utils::create_test_nfd;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

    #[test]
    fn maps_operand_to_its_instance() {
        let nfd = create_test_nfd("nfd-instance");
        let ds = worker::desired_daemon_set(&nfd, "nfd-system").unwrap();

        assert_eq!(owning_instance(&ds), Some(ObjectRef::new("nfd-instance")));
    }

    #[test]
    fn ignores_foreign_and_non_controller_owners() {
        let mut cm = ConfigMap::default();
        cm.metadata.owner_references = Some(vec![
            OwnerReference {
                api_version: "apps/v1".to_string(),
                kind: "Deployment".to_string(),
                name: "other".to_string(),
                uid: "1".to_string(),
                controller: Some(true),
                ..Default::default()
            },
            OwnerReference {
                api_version: "nfd.kubernetes.io/v1".to_string(),
                kind: "NodeFeatureDiscovery".to_string(),
                name: "nfd-instance".to_string(),
                uid: "2".to_string(),
                controller: None,
                ..Default::default()
            },
        ]);

        assert_eq!(owning_instance(&cm), None);
        assert_eq!(owning_instance(&ConfigMap::default()), None);
    }
}
