//! Status conditions for NodeFeatureDiscovery
//!
//! Mirrors the standard Kubernetes condition shape. `lastTransitionTime`
//! only moves when a condition's status actually flips, so re-computing the
//! same conditions on every pass does not produce a status write.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum ConditionType {
    /// Every deployed component is rolled out and ready
    Available,
    /// At least one component is still rolling out
    Progressing,
    /// A component failed or reported unavailable pods
    Degraded,
    /// The operand can be upgraded
    Upgradeable,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NfdCondition {
    #[serde(rename = "type")]
    pub type_: ConditionType,

    pub status: ConditionStatus,

    /// Machine-readable reason (PascalCase)
    #[serde(default)]
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl NfdCondition {
    pub fn new(
        type_: ConditionType,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_,
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: None,
        }
    }
}

/// Merge `desired` into `existing`, keeping the previous transition time for
/// conditions whose status did not change.
///
/// Returns the merged list ordered like `desired`. Conditions present in
/// `existing` but absent from `desired` are dropped.
pub fn merge_conditions(
    existing: &[NfdCondition],
    desired: Vec<NfdCondition>,
    now: DateTime<Utc>,
) -> Vec<NfdCondition> {
    desired
        .into_iter()
        .map(|mut condition| {
            let previous = existing.iter().find(|c| c.type_ == condition.type_);
            condition.last_transition_time = match previous {
                Some(prev) if prev.status == condition.status => prev.last_transition_time.or(Some(now)),
                _ => Some(now),
            };
            condition
        })
        .collect()
}

/// True if both lists carry the same type/status/reason/message, ignoring timestamps.
pub fn conditions_equivalent(a: &[NfdCondition], b: &[NfdCondition]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            x.type_ == y.type_ && x.status == y.status && x.reason == y.reason && x.message == y.message
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn unchanged_status_keeps_transition_time() {
        let mut existing = NfdCondition::new(ConditionType::Available, ConditionStatus::True, "Ready", "");
        existing.last_transition_time = Some(at(100));

        let merged = merge_conditions(
            &[existing],
            vec![NfdCondition::new(ConditionType::Available, ConditionStatus::True, "Ready", "")],
            at(200),
        );

        assert_eq!(merged[0].last_transition_time, Some(at(100)));
    }

    #[test]
    fn flipped_status_moves_transition_time() {
        let mut existing = NfdCondition::new(ConditionType::Degraded, ConditionStatus::False, "AsExpected", "");
        existing.last_transition_time = Some(at(100));

        let merged = merge_conditions(
            &[existing],
            vec![NfdCondition::new(ConditionType::Degraded, ConditionStatus::True, "WorkerFailed", "boom")],
            at(200),
        );

        assert_eq!(merged[0].last_transition_time, Some(at(200)));
        assert_eq!(merged[0].status, ConditionStatus::True);
    }

    #[test]
    fn equivalence_ignores_timestamps() {
        let mut a = NfdCondition::new(ConditionType::Progressing, ConditionStatus::True, "Rollout", "worker");
        let b = a.clone();
        a.last_transition_time = Some(at(1));
        assert!(conditions_equivalent(&[a.clone()], &[b]));

        let c = NfdCondition::new(ConditionType::Progressing, ConditionStatus::False, "Rollout", "worker");
        assert!(!conditions_equivalent(&[a], &[c]));
    }

    #[test]
    fn condition_serializes_type_field() {
        let json = serde_json::to_value(NfdCondition::new(
            ConditionType::Upgradeable,
            ConditionStatus::True,
            "CanUpgrade",
            "",
        ))
        .unwrap();
        assert_eq!(json["type"], "Upgradeable");
        assert_eq!(json["status"], "True");
    }
}
