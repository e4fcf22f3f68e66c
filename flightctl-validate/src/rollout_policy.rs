//! Rollout-policy coherence checks (§4.8): disruption budget, batch
//! limits, success thresholds, and `groupBy` uniqueness.

use std::collections::HashSet;

use flightctl_types::rollout::{Batch, BatchLimit, BatchSequence, DisruptionBudget, RolloutPolicy};

use crate::ValidationError;

pub fn validate_rollout_policy(policy: &RolloutPolicy) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(budget) = &policy.disruption_budget {
        validate_disruption_budget(budget, &mut errors);
    }
    if let Some(sequence) = &policy.device_selection {
        validate_batch_sequence(sequence, &mut errors);
    }
    if let Some(threshold) = policy.success_threshold {
        if threshold > 100 {
            errors.push(ValidationError::new(
                "spec.rolloutPolicy.successThreshold",
                "successThreshold must be 0..=100",
            ));
        }
    }

    errors
}

fn validate_disruption_budget(budget: &DisruptionBudget, errors: &mut Vec<ValidationError>) {
    if !budget.has_bound() {
        errors.push(ValidationError::new(
            "spec.rolloutPolicy.disruptionBudget",
            "at least one of minAvailable/maxUnavailable must be set",
        ));
    }
    let mut seen = HashSet::new();
    for key in &budget.group_by {
        if !seen.insert(key) {
            errors.push(ValidationError::new(
                "spec.rolloutPolicy.disruptionBudget.groupBy",
                format!("duplicate groupBy key '{key}'"),
            ));
        }
    }
}

fn validate_batch_sequence(sequence: &BatchSequence, errors: &mut Vec<ValidationError>) {
    for (i, batch) in sequence.sequence.iter().enumerate() {
        validate_batch(batch, i, errors);
    }
}

fn validate_batch(batch: &Batch, index: usize, errors: &mut Vec<ValidationError>) {
    let field = format!("spec.rolloutPolicy.deviceSelection.sequence[{index}]");
    match batch.limit {
        BatchLimit::Absolute(n) if n == 0 => {
            errors.push(ValidationError::new(format!("{field}.limit"), "absolute limit must be positive"));
        }
        BatchLimit::Percentage(pct) if pct > 100 => {
            errors.push(ValidationError::new(format!("{field}.limit"), "percentage limit must be 0..=100"));
        }
        _ => {}
    }
    if let Some(threshold) = batch.success_threshold {
        if threshold > 100 {
            errors.push(ValidationError::new(
                format!("{field}.successThreshold"),
                "successThreshold must be 0..=100",
            ));
        }
    }
    if let Some(timeout) = batch.update_timeout_seconds {
        if timeout == 0 {
            errors.push(ValidationError::new(
                format!("{field}.updateTimeoutSeconds"),
                "updateTimeoutSeconds must be positive",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disruption_budget_needs_at_least_one_bound() {
        let budget = DisruptionBudget {
            min_available: None,
            max_unavailable: None,
            group_by: Vec::new(),
        };
        let mut errors = Vec::new();
        validate_disruption_budget(&budget, &mut errors);
        assert!(!errors.is_empty());
    }

    #[test]
    fn disruption_budget_with_one_bound_is_valid() {
        let budget = DisruptionBudget {
            min_available: Some(1),
            max_unavailable: None,
            group_by: vec!["site".to_string()],
        };
        let mut errors = Vec::new();
        validate_disruption_budget(&budget, &mut errors);
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn duplicate_group_by_keys_are_rejected() {
        let budget = DisruptionBudget {
            min_available: Some(1),
            max_unavailable: None,
            group_by: vec!["site".to_string(), "site".to_string()],
        };
        let mut errors = Vec::new();
        validate_disruption_budget(&budget, &mut errors);
        assert!(errors.iter().any(|e| e.message.contains("duplicate groupBy")));
    }

    #[test]
    fn zero_absolute_limit_is_rejected() {
        let batch = Batch {
            selector: Default::default(),
            limit: BatchLimit::Absolute(0),
            success_threshold: None,
            update_timeout_seconds: None,
        };
        let mut errors = Vec::new();
        validate_batch(&batch, 0, &mut errors);
        assert!(!errors.is_empty());
    }

    #[test]
    fn percentage_over_100_is_rejected() {
        let batch = Batch {
            selector: Default::default(),
            limit: BatchLimit::Percentage(150),
            success_threshold: None,
            update_timeout_seconds: None,
        };
        let mut errors = Vec::new();
        validate_batch(&batch, 0, &mut errors);
        assert!(!errors.is_empty());
    }
}
