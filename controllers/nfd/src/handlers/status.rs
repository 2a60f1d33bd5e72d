//! Status computation and persistence
//!
//! Conditions are derived purely from the observed rollout state of each
//! operand, then merged with the existing conditions so transition times
//! only move on real changes. An unchanged status is never written.

use super::NfdHandlers;
use crate::components::{gc, master, topology, worker};
use crate::error::ControllerError;
use chrono::Utc;
use crds::{
    conditions_equivalent, merge_conditions, ConditionStatus, ConditionType, NfdCondition,
    NodeFeatureDiscovery, NodeFeatureDiscoveryStatus,
};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use kube::ResourceExt;
use tracing::{debug, info};

/// Rollout state of one operand workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedComponent {
    pub name: &'static str,
    /// `None` when the workload does not exist yet
    pub rollout: Option<Rollout>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rollout {
    /// The workload controller has reported on the current generation
    pub observed: bool,
    pub desired: i32,
    pub updated: i32,
    pub ready: i32,
    pub unavailable: i32,
}

/// Whether a status written at `observed_generation` describes `generation`.
fn is_observed(generation: Option<i64>, observed_generation: Option<i64>) -> bool {
    observed_generation.unwrap_or(0) >= generation.unwrap_or(0)
}

impl Rollout {
    pub fn from_daemon_set(ds: &DaemonSet) -> Self {
        let Some(status) = ds.status.as_ref() else {
            return Self::default();
        };
        Self {
            observed: is_observed(ds.metadata.generation, status.observed_generation),
            desired: status.desired_number_scheduled,
            updated: status.updated_number_scheduled.unwrap_or(0),
            ready: status.number_ready,
            unavailable: status.number_unavailable.unwrap_or(0),
        }
    }

    pub fn from_deployment(deployment: &Deployment) -> Self {
        let Some(status) = deployment.status.as_ref() else {
            return Self::default();
        };
        Self {
            observed: is_observed(deployment.metadata.generation, status.observed_generation),
            desired: deployment.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1),
            updated: status.updated_replicas.unwrap_or(0),
            ready: status.ready_replicas.unwrap_or(0),
            unavailable: status.unavailable_replicas.unwrap_or(0),
        }
    }

    fn rolled_out(&self) -> bool {
        self.observed && self.updated >= self.desired
    }

    fn ready(&self) -> bool {
        self.rolled_out() && self.ready >= self.desired && self.unavailable == 0
    }
}

/// Derive the Available/Progressing/Degraded/Upgradeable conditions.
///
/// - a missing workload, one whose controller has not caught up with its
///   generation, or an unfinished rollout is Progressing
/// - a finished rollout with unavailable pods is Degraded
/// - Available only when every workload is ready
pub fn compute_conditions(observed: &[ObservedComponent]) -> Vec<NfdCondition> {
    let mut progressing = Vec::new();
    let mut degraded = Vec::new();

    for component in observed {
        match component.rollout {
            None => progressing.push(format!("{} not created", component.name)),
            Some(r) if !r.observed => progressing.push(format!("{} rollout pending", component.name)),
            Some(r) if !r.rolled_out() => progressing.push(format!(
                "{} rolling out ({}/{} updated)",
                component.name, r.updated, r.desired
            )),
            Some(r) if !r.ready() => degraded.push(format!(
                "{} has {} unavailable pod(s) ({}/{} ready)",
                component.name, r.unavailable, r.ready, r.desired
            )),
            Some(_) => {}
        }
    }

    let available = progressing.is_empty() && degraded.is_empty();

    vec![
        if available {
            NfdCondition::new(ConditionType::Available, ConditionStatus::True, "AllComponentsReady", "")
        } else {
            NfdCondition::new(ConditionType::Available, ConditionStatus::False, "ComponentsNotReady", "")
        },
        NfdCondition::new(
            ConditionType::Progressing,
            ConditionStatus::from(!progressing.is_empty()),
            if progressing.is_empty() { "AsExpected" } else { "Rollout" },
            progressing.join("; "),
        ),
        NfdCondition::new(
            ConditionType::Degraded,
            ConditionStatus::from(!degraded.is_empty()),
            if degraded.is_empty() { "AsExpected" } else { "PodsUnavailable" },
            degraded.join("; "),
        ),
        NfdCondition::new(ConditionType::Upgradeable, ConditionStatus::True, "CanUpgrade", ""),
    ]
}

impl NfdHandlers {
    async fn observe_daemon_set(&self, name: &'static str) -> Result<ObservedComponent, ControllerError> {
        let ds = self.client.get_daemon_set(name).await?;
        Ok(ObservedComponent {
            name,
            rollout: ds.as_ref().map(Rollout::from_daemon_set),
        })
    }

    async fn observe_deployment(&self, name: &'static str) -> Result<ObservedComponent, ControllerError> {
        let deployment = self.client.get_deployment(name).await?;
        Ok(ObservedComponent {
            name,
            rollout: deployment.as_ref().map(Rollout::from_deployment),
        })
    }

    async fn observe(&self, nfd: &NodeFeatureDiscovery) -> Result<Vec<ObservedComponent>, ControllerError> {
        let mut observed = vec![
            self.observe_deployment(master::MASTER_NAME).await?,
            self.observe_daemon_set(worker::WORKER_NAME).await?,
            self.observe_deployment(gc::GC_NAME).await?,
        ];
        if nfd.spec.topology_updater {
            observed.push(self.observe_daemon_set(topology::TOPOLOGY_NAME).await?);
        }
        Ok(observed)
    }

    pub(crate) async fn update_status(&self, nfd: &NodeFeatureDiscovery) -> Result<(), ControllerError> {
        let name = nfd.name_any();
        let observed = self
            .observe(nfd)
            .await
            .map_err(|e| ControllerError::Status(format!("{name}: failed to observe components: {e}")))?;

        let desired = compute_conditions(&observed);
        let current = nfd.status.clone().unwrap_or_default();
        let generation = nfd.metadata.generation;

        if conditions_equivalent(&current.conditions, &desired) && current.observed_generation == generation {
            debug!("NodeFeatureDiscovery {} status is up-to-date, skipping update", name);
            return Ok(());
        }

        let status = NodeFeatureDiscoveryStatus {
            conditions: merge_conditions(&current.conditions, desired, Utc::now()),
            observed_generation: generation,
        };
        self.client.patch_status(&name, &status).await?;

        info!("Updated NodeFeatureDiscovery {} status", name);
        Ok(())
    }
}
