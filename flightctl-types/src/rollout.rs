use serde::{Deserialize, Serialize};

use crate::selector::LabelSelector;

/// A batch `limit` is either an absolute device count or a percentage of
/// the batch's current matching candidate set (§4.2: "percentage base is
/// the current matching candidates, not the full fleet").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchLimit {
    Absolute(u32),
    Percentage(u8),
}

impl BatchLimit {
    /// Resolve against `candidate_count`, rounding percentages up.
    pub fn resolve(self, candidate_count: usize) -> usize {
        match self {
            BatchLimit::Absolute(n) => n as usize,
            BatchLimit::Percentage(pct) => {
                let pct = pct as f64 / 100.0;
                (candidate_count as f64 * pct).ceil() as usize
            }
        }
    }
}

/// A single explicit batch in a `BatchSequence`. The preliminary and final
/// implicit batches are not represented here — they are synthesized by
/// `flightctl-selector`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    #[serde(default)]
    pub selector: LabelSelector,
    pub limit: BatchLimit,
    /// Percentage, 0..=100. Falls back to the fleet-level threshold, then
    /// 100, if absent (§4.3).
    pub success_threshold: Option<u8>,
    /// Falls back to the fleet-level `defaultUpdateTimeoutSeconds` if
    /// absent (§4.3, §5 "Batch waits honor defaultUpdateTimeout; batch
    /// override allowed").
    pub update_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSequence {
    pub sequence: Vec<Batch>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisruptionBudget {
    pub min_available: Option<u32>,
    pub max_unavailable: Option<u32>,
    #[serde(default)]
    pub group_by: Vec<String>,
}

impl DisruptionBudget {
    pub fn has_bound(&self) -> bool {
        self.min_available.is_some() || self.max_unavailable.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RolloutApprovalMethod {
    Automatic,
    Manual,
}

impl RolloutApprovalMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            RolloutApprovalMethod::Automatic => "automatic",
            RolloutApprovalMethod::Manual => "manual",
        }
    }
}

/// Five-field cron expression plus an IANA zone (or `Local`/`UTC`/`GMT`)
/// governing when a fleet's rollout is permitted to begin a new batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSchedule {
    pub cron_expression: String,
    pub time_zone: String,
    pub start_grace_duration_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutPolicy {
    pub device_selection: Option<BatchSequence>,
    pub disruption_budget: Option<DisruptionBudget>,
    /// Percentage, 0..=100.
    pub success_threshold: Option<u8>,
    pub default_update_timeout_seconds: Option<u64>,
    pub update_schedule: Option<UpdateSchedule>,
    /// Defaults to `Automatic` when absent. Frozen into the Fleet's
    /// `rolloutApprovalMethod` annotation when a rollout starts, same as
    /// `deviceSelectionConfigDigest`, so editing this mid-rollout doesn't
    /// change how the batch already in flight gets approved.
    pub approval_method: Option<RolloutApprovalMethod>,
}

/// The `RolloutStatus` condition reason (§4.3 state table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RolloutStatus {
    #[default]
    Inactive,
    Active,
    Waiting,
    Suspended,
}

impl RolloutStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RolloutStatus::Inactive => "Inactive",
            RolloutStatus::Active => "Active",
            RolloutStatus::Waiting => "Waiting",
            RolloutStatus::Suspended => "Suspended",
        }
    }
}

/// Snapshot of the outcome of evaluating a completed batch, written into
/// `lastBatchCompletionReport` (§4.3 step 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutBatchCompletionReport {
    pub batch_number: u32,
    pub selected: usize,
    pub succeeded: usize,
    pub success_ratio: f64,
    pub threshold: f64,
    pub passed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_limit_rounds_up() {
        assert_eq!(BatchLimit::Percentage(50).resolve(2), 1);
        assert_eq!(BatchLimit::Percentage(50).resolve(3), 2);
        assert_eq!(BatchLimit::Percentage(1).resolve(1), 1);
        assert_eq!(BatchLimit::Percentage(0).resolve(10), 0);
    }

    #[test]
    fn absolute_limit_ignores_candidate_count() {
        assert_eq!(BatchLimit::Absolute(1).resolve(100), 1);
    }
}
