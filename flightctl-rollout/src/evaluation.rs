//! Per-device outcome classification and batch-level success evaluation
//! (§4.3 step 4, §4.4).

use flightctl_types::device::DeviceUpdatingReason;
use flightctl_types::metadata::AnnotationKey;
use flightctl_types::rollout::RolloutBatchCompletionReport;
use flightctl_types::Device;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceOutcome {
    Success,
    Failure,
    /// Excluded from both `S` and `T` until the device re-checks in (§9
    /// open question: awaiting-reconnect devices are treated as
    /// disconnected for budget purposes and don't count toward success
    /// either way while they're in that state).
    ExcludedAwaitingReconnect,
}

/// Classify one selected device's contribution to its batch's success
/// ratio. Callers only invoke this once the batch has actually reached its
/// evaluation point (every selected device terminal, or the batch timeout
/// elapsed) — a device that's still mid-update when this runs is, by
/// construction, one of the reasons the timeout path was taken, so it
/// counts as a failure (§4.4: non-terminal-at-evaluation is a failure,
/// same as `Error`/`Canceled`).
pub fn classify(device: &Device) -> DeviceOutcome {
    if device.annotation(AnnotationKey::AwaitingReconnect).is_some() {
        return DeviceOutcome::ExcludedAwaitingReconnect;
    }
    match device.status.updating_reason {
        Some(DeviceUpdatingReason::Updated) => {
            let expected_version = device
                .annotation(AnnotationKey::RenderedVersion)
                .and_then(|v| v.parse::<u64>().ok());
            if expected_version.is_some() && device.status.config.rendered_version == expected_version {
                DeviceOutcome::Success
            } else {
                DeviceOutcome::Failure
            }
        }
        _ => DeviceOutcome::Failure,
    }
}

/// All selected devices have either reached a terminal
/// [`DeviceUpdatingReason`] or the batch's `defaultUpdateTimeout` has
/// elapsed — the trigger condition for running [`evaluate_batch`] (§4.3
/// step 4).
pub fn ready_to_evaluate(selected: &[Device], timed_out: bool) -> bool {
    timed_out || selected.iter().all(|d| d.status.updating_reason.is_some_and(DeviceUpdatingReason::is_terminal))
}

#[derive(Debug, Clone, Copy)]
pub struct BatchEvaluation {
    pub report: EvaluationCounts,
    pub passed: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct EvaluationCounts {
    pub selected: usize,
    pub succeeded: usize,
    pub success_ratio: f64,
    pub threshold: f64,
}

/// Evaluate a batch's outcome (§4.3 step 4): `threshold_pct` is whichever
/// of batch/fleet/default-100 success threshold applies, already resolved
/// by the caller. `S/0` is defined as `1` — an empty batch trivially
/// passes.
pub fn evaluate_batch(selected: &[Device], threshold_pct: u8) -> BatchEvaluation {
    let mut counted_total = 0usize;
    let mut succeeded = 0usize;
    for device in selected {
        match classify(device) {
            DeviceOutcome::Success => {
                counted_total += 1;
                succeeded += 1;
            }
            DeviceOutcome::Failure => {
                counted_total += 1;
            }
            DeviceOutcome::ExcludedAwaitingReconnect => {}
        }
    }

    let ratio = if counted_total == 0 { 1.0 } else { succeeded as f64 / counted_total as f64 };
    let threshold = threshold_pct as f64 / 100.0;

    BatchEvaluation {
        report: EvaluationCounts {
            selected: selected.len(),
            succeeded,
            success_ratio: ratio,
            threshold,
        },
        passed: ratio >= threshold,
    }
}

pub fn completion_report(batch_number: u32, eval: &BatchEvaluation) -> RolloutBatchCompletionReport {
    RolloutBatchCompletionReport {
        batch_number,
        selected: eval.report.selected,
        succeeded: eval.report.succeeded,
        success_ratio: eval.report.success_ratio,
        threshold: eval.report.threshold,
        passed: eval.passed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flightctl_types::device::{ConsoleConfig, DeviceConfigStatus, DeviceSpec, DeviceStatus, OciReference};
    use flightctl_types::metadata::AnnotationKey;
    use flightctl_types::ObjectMeta;

    fn device_at(name: &str, reason: Option<DeviceUpdatingReason>, rendered_version: Option<u64>, expected: Option<u64>) -> Device {
        let mut meta = ObjectMeta::new("org-1", name);
        if let Some(expected) = expected {
            meta.set_annotation(AnnotationKey::RenderedVersion, expected.to_string());
        }
        Device {
            metadata: meta,
            spec: DeviceSpec {
                os_image: OciReference("quay.io/example/os@sha256:deadbeef".to_string()),
                config_providers: Vec::new(),
                applications: Vec::new(),
                resource_monitors: Vec::new(),
                systemd_matches: Vec::new(),
                console: ConsoleConfig::default(),
            },
            status: DeviceStatus {
                updating_reason: reason,
                config: DeviceConfigStatus { rendered_version },
                ..DeviceStatus::default()
            },
        }
    }

    #[test]
    fn updated_device_matching_version_is_success() {
        let d = device_at("d1", Some(DeviceUpdatingReason::Updated), Some(3), Some(3));
        assert_eq!(classify(&d), DeviceOutcome::Success);
    }

    #[test]
    fn updated_device_at_stale_version_is_failure() {
        let d = device_at("d1", Some(DeviceUpdatingReason::Updated), Some(2), Some(3));
        assert_eq!(classify(&d), DeviceOutcome::Failure);
    }

    #[test]
    fn error_and_canceled_are_failures() {
        assert_eq!(classify(&device_at("d1", Some(DeviceUpdatingReason::Error), None, None)), DeviceOutcome::Failure);
        assert_eq!(classify(&device_at("d1", Some(DeviceUpdatingReason::Canceled), None, None)), DeviceOutcome::Failure);
    }

    #[test]
    fn empty_batch_trivially_passes() {
        let eval = evaluate_batch(&[], 100);
        assert!(eval.passed);
        assert_eq!(eval.report.success_ratio, 1.0);
    }

    /// §8 scenario 3: two devices injected with failure, threshold 100% ->
    /// 0/2 ratio, below any positive threshold, batch fails.
    #[test]
    fn all_failed_batch_does_not_meet_threshold() {
        let devices = vec![
            device_at("madrid", Some(DeviceUpdatingReason::Error), None, Some(1)),
            device_at("paris", Some(DeviceUpdatingReason::Error), None, Some(1)),
        ];
        let eval = evaluate_batch(&devices, 100);
        assert!(!eval.passed);
        assert_eq!(eval.report.succeeded, 0);
    }

    #[test]
    fn mixed_outcomes_meet_a_partial_threshold() {
        let devices = vec![
            device_at("a", Some(DeviceUpdatingReason::Updated), Some(1), Some(1)),
            device_at("b", Some(DeviceUpdatingReason::Error), None, Some(1)),
        ];
        let eval = evaluate_batch(&devices, 50);
        assert!(eval.passed);
        assert_eq!(eval.report.success_ratio, 0.5);
    }
}
