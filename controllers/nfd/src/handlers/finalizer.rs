//! Finalizer management and teardown on deletion
//!
//! Finalizer patches carry the resource's `resourceVersion`, so a write based
//! on a stale snapshot is rejected with a conflict and retried on the next pass.

use super::client::{OperandKind, Propagation};
use super::NfdHandlers;
use crate::components::prune::{desired_job, prune_progress, PruneProgress, PRUNE_NAME};
use crate::components::{gc, master, topology, worker};
use crate::error::ControllerError;
use crds::NodeFeatureDiscovery;
use kube::ResourceExt;
use tracing::{info, warn};

/// Finalizer token protecting NodeFeatureDiscovery deletion
pub const FINALIZER: &str = "nfd-finalizer";

/// Operands removed in the background once nfd-master is on its way out.
const BACKGROUND_DELETIONS: [(OperandKind, &str); 6] = [
    (OperandKind::Service, master::MASTER_NAME),
    (OperandKind::DaemonSet, worker::WORKER_NAME),
    (OperandKind::ConfigMap, worker::WORKER_NAME),
    (OperandKind::DaemonSet, topology::TOPOLOGY_NAME),
    (OperandKind::ConfigMap, topology::TOPOLOGY_NAME),
    (OperandKind::Deployment, gc::GC_NAME),
];

pub(crate) fn has_finalizer(nfd: &NodeFeatureDiscovery) -> bool {
    nfd.finalizers().iter().any(|f| f == FINALIZER)
}

/// Finalizer list with ours added, or `None` when already present.
pub(crate) fn with_finalizer(nfd: &NodeFeatureDiscovery) -> Option<Vec<String>> {
    if has_finalizer(nfd) {
        return None;
    }
    let mut finalizers = nfd.finalizers().to_vec();
    finalizers.push(FINALIZER.to_string());
    Some(finalizers)
}

/// Finalizer list with ours removed, or `None` when it is not there.
pub(crate) fn without_finalizer(nfd: &NodeFeatureDiscovery) -> Option<Vec<String>> {
    if !has_finalizer(nfd) {
        return None;
    }
    Some(nfd.finalizers().iter().filter(|f| *f != FINALIZER).cloned().collect())
}

impl NfdHandlers {
    pub(crate) async fn add_finalizer(&self, nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError> {
        let Some(finalizers) = with_finalizer(nfd) else {
            return Ok(());
        };
        self.client
            .patch_finalizers(&nfd.name_any(), finalizers, nfd.resource_version())
            .await?;
        info!("Added finalizer {} to {}", FINALIZER, nfd.name_any());
        Ok(())
    }

    async fn remove_finalizer(&self, nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError> {
        let Some(finalizers) = without_finalizer(nfd) else {
            return Ok(());
        };
        self.client
            .patch_finalizers(&nfd.name_any(), finalizers, nfd.resource_version())
            .await?;
        info!("Removed finalizer {} from {}", FINALIZER, nfd.name_any());
        Ok(())
    }

    /// Delete every operand, run the prune job if requested, then release the finalizer.
    ///
    /// Returns an error while teardown is incomplete so the watcher requeues.
    pub(crate) async fn finalize(&self, nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError> {
        if !has_finalizer(nfd) {
            return Ok(());
        }

        // Foreground: the Deployment stays visible until its pods are gone
        let mut failures = Vec::new();
        let deletions = std::iter::once((OperandKind::Deployment, master::MASTER_NAME, Propagation::Foreground))
            .chain(BACKGROUND_DELETIONS.into_iter().map(|(kind, name)| (kind, name, Propagation::Background)));
        for (kind, name, propagation) in deletions {
            if let Err(e) = self.client.delete(kind, name, propagation).await {
                warn!("Failed to delete {} {}: {}", kind, name, e);
                failures.push(format!("{kind}/{name}: {e}"));
            }
        }
        if !failures.is_empty() {
            return Err(ControllerError::Finalization(failures.join("; ")));
        }

        if nfd.spec.pruner_on_delete {
            if self.client.get_deployment(master::MASTER_NAME).await?.is_some() {
                return Err(ControllerError::Finalization(format!(
                    "waiting for {} to terminate before pruning",
                    master::MASTER_NAME
                )));
            }
            self.run_prune_job(nfd).await?;
        }

        self.remove_finalizer(nfd).await
    }

    /// Ensure the prune job ran to completion.
    ///
    /// A succeeded Job is left in place: it is owned by the instance and goes
    /// with it, and keeping it makes a retried finalizer removal skip the prune.
    async fn run_prune_job(&self, nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError> {
        let Some(job) = self.client.get_job(PRUNE_NAME).await? else {
            info!("Starting prune job for {}", nfd.name_any());
            self.client.apply_job(&desired_job(nfd, &self.namespace)?).await?;
            return Err(ControllerError::Finalization("prune job started, waiting for completion".to_string()));
        };

        match prune_progress(job.status.as_ref()) {
            PruneProgress::Running => Err(ControllerError::Finalization(
                "waiting for prune job to complete".to_string(),
            )),
            PruneProgress::Failed => Err(ControllerError::Finalization(format!(
                "prune job {PRUNE_NAME} failed, delete it to retry"
            ))),
            PruneProgress::Succeeded => {
                info!("Prune job completed");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::*;
    use crate::test_utils::{create_deleted_nfd, create_test_nfd, create_test_nfd_with_finalizer};
    use k8s_openapi::api::apps::v1::Deployment;
    use k8s_openapi::api::batch::v1::{Job, JobStatus};
    use std::sync::Arc;

    #[test]
    fn detects_finalizer() {
        assert!(!has_finalizer(&create_test_nfd("nfd")));
        assert!(has_finalizer(&create_test_nfd_with_finalizer("nfd")));
    }

    #[test]
    fn adding_keeps_foreign_finalizers() {
        let mut nfd = create_test_nfd("nfd");
        nfd.metadata.finalizers = Some(vec!["example.com/other".to_string()]);

        assert_eq!(
            with_finalizer(&nfd),
            Some(vec!["example.com/other".to_string(), FINALIZER.to_string()])
        );
    }

    #[test]
    fn adding_is_idempotent() {
        assert_eq!(with_finalizer(&create_test_nfd_with_finalizer("nfd")), None);
    }

    #[test]
    fn removing_keeps_foreign_finalizers() {
        let mut nfd = create_test_nfd("nfd");
        nfd.metadata.finalizers = Some(vec![FINALIZER.to_string(), "example.com/other".to_string()]);

        assert_eq!(without_finalizer(&nfd), Some(vec!["example.com/other".to_string()]));
        assert_eq!(without_finalizer(&create_test_nfd("nfd")), None);
    }

    /// Log `patch_finalizers` calls as `finalizers [..] rv=..`.
    fn record_finalizer_patches(mock: &mut MockOperandClient, log: &CallLog) {
        let log = Arc::clone(log);
        mock.expect_patch_finalizers().returning(move |_, finalizers, rv| {
            log.lock().unwrap().push(format!("finalizers {finalizers:?} rv={}", rv.unwrap_or_default()));
            Ok(())
        });
    }

    fn job_with(status: JobStatus) -> Job {
        Job {
            status: Some(status),
            ..Default::default()
        }
    }

    fn deleted_nfd_with_prune() -> NodeFeatureDiscovery {
        let mut nfd = create_deleted_nfd("nfd-instance");
        nfd.spec.pruner_on_delete = true;
        nfd
    }

    #[tokio::test]
    async fn add_finalizer_sends_resource_version() {
        let log = call_log();
        let mut mock = MockOperandClient::new();
        record_finalizer_patches(&mut mock, &log);
        let mut nfd = create_test_nfd("nfd-instance");
        nfd.metadata.resource_version = Some("42".to_string());

        handlers(mock).add_finalizer(&nfd).await.unwrap();

        assert_eq!(logged(&log), vec![r#"finalizers ["nfd-finalizer"] rv=42"#.to_string()]);
    }

    #[tokio::test]
    async fn finalize_deletes_master_first_then_releases_finalizer() {
        let log = call_log();
        let mut mock = MockOperandClient::new();
        record_deletes(&mut mock, &log);
        record_finalizer_patches(&mut mock, &log);
        mock.expect_get_job().never();

        handlers(mock).finalize(&create_deleted_nfd("nfd-instance")).await.unwrap();

        assert_eq!(
            logged(&log),
            vec![
                "delete deployment/nfd-master !fg".to_string(),
                "delete service/nfd-master".to_string(),
                "delete daemonset/nfd-worker".to_string(),
                "delete configmap/nfd-worker".to_string(),
                "delete daemonset/nfd-topology-updater".to_string(),
                "delete configmap/nfd-topology-updater".to_string(),
                "delete deployment/nfd-gc".to_string(),
                "finalizers [] rv=".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn finalize_keeps_finalizer_when_a_delete_fails() {
        let mut mock = MockOperandClient::new();
        mock.expect_delete().returning(|kind, _, _| match kind {
            OperandKind::Service => Err(ControllerError::Build("conflict".to_string())),
            _ => Ok(()),
        });
        mock.expect_patch_finalizers().never();

        let err = handlers(mock).finalize(&create_deleted_nfd("nfd-instance")).await.unwrap_err();

        assert!(matches!(err, ControllerError::Finalization(msg) if msg.starts_with("service/nfd-master")));
    }

    #[tokio::test]
    async fn finalize_without_our_finalizer_does_nothing() {
        let mut mock = MockOperandClient::new();
        mock.expect_delete().never();
        mock.expect_patch_finalizers().never();
        let mut nfd = create_deleted_nfd("nfd-instance");
        nfd.metadata.finalizers = None;

        handlers(mock).finalize(&nfd).await.unwrap();
    }

    #[tokio::test]
    async fn prune_waits_for_master_to_terminate() {
        let mut mock = MockOperandClient::new();
        mock.expect_delete().returning(|_, _, _| Ok(()));
        mock.expect_get_deployment().returning(|_| Ok(Some(Deployment::default())));
        mock.expect_get_job().never();
        mock.expect_apply_job().never();
        mock.expect_patch_finalizers().never();

        let err = handlers(mock).finalize(&deleted_nfd_with_prune()).await.unwrap_err();

        assert!(matches!(err, ControllerError::Finalization(msg) if msg.contains("nfd-master")));
    }

    #[tokio::test]
    async fn prune_job_is_started_once_master_is_gone() {
        let mut mock = MockOperandClient::new();
        mock.expect_delete().returning(|_, _, _| Ok(()));
        mock.expect_get_deployment().returning(|_| Ok(None));
        mock.expect_get_job().returning(|_| Ok(None));
        mock.expect_apply_job()
            .withf(|job| job.metadata.name.as_deref() == Some(PRUNE_NAME))
            .times(1)
            .returning(|_| Ok(()));
        mock.expect_patch_finalizers().never();

        let result = handlers(mock).finalize(&deleted_nfd_with_prune()).await;

        assert!(matches!(result, Err(ControllerError::Finalization(_))));
    }

    #[tokio::test]
    async fn running_or_failed_prune_job_keeps_finalizer() {
        for status in [JobStatus::default(), JobStatus { failed: Some(5), ..Default::default() }] {
            let mut mock = MockOperandClient::new();
            mock.expect_delete().returning(|_, _, _| Ok(()));
            mock.expect_get_deployment().returning(|_| Ok(None));
            let job = job_with(status.clone());
            mock.expect_get_job().returning(move |_| Ok(Some(job.clone())));
            mock.expect_apply_job().never();
            mock.expect_patch_finalizers().never();

            let result = handlers(mock).finalize(&deleted_nfd_with_prune()).await;

            assert!(matches!(result, Err(ControllerError::Finalization(_))), "{status:?}");
        }
    }

    #[tokio::test]
    async fn succeeded_prune_job_is_kept_until_finalizer_is_released() {
        let log = call_log();
        let mut mock = MockOperandClient::new();
        record_deletes(&mut mock, &log);
        record_finalizer_patches(&mut mock, &log);
        mock.expect_get_deployment().returning(|_| Ok(None));
        mock.expect_get_job()
            .returning(|_| Ok(Some(job_with(JobStatus { succeeded: Some(1), ..Default::default() }))));
        mock.expect_apply_job().never();

        handlers(mock).finalize(&deleted_nfd_with_prune()).await.unwrap();

        let calls = logged(&log);
        assert!(!calls.iter().any(|c| c.starts_with("delete job/")), "{calls:?}");
        assert_eq!(calls.last().map(String::as_str), Some("finalizers [] rv="));
    }

    #[tokio::test]
    async fn failed_finalizer_release_does_not_rerun_prune() {
        let mut mock = MockOperandClient::new();
        mock.expect_delete().returning(|_, _, _| Ok(()));
        mock.expect_get_deployment().returning(|_| Ok(None));
        mock.expect_get_job()
            .returning(|_| Ok(Some(job_with(JobStatus { succeeded: Some(1), ..Default::default() }))));
        mock.expect_apply_job().never();
        mock.expect_patch_finalizers()
            .times(2)
            .returning(|name, _, _| Err(ControllerError::Finalizer(format!("{name}: conflict"))));
        let handlers = handlers(mock);
        let nfd = deleted_nfd_with_prune();

        assert!(matches!(handlers.finalize(&nfd).await, Err(ControllerError::Finalizer(_))));
        assert!(matches!(handlers.finalize(&nfd).await, Err(ControllerError::Finalizer(_))));
    }
}
