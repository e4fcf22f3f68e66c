//! Disruption budget enforcement (§4.3): while propagating a batch, never
//! stamp `selectedForRollout` on a device that would push its `groupBy`
//! bucket past `maxUnavailable` or below `minAvailable`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use flightctl_types::device::DEFAULT_DISCONNECT_TIMEOUT_SECS;
use flightctl_types::metadata::{AnnotationKey, WithMeta};
use flightctl_types::rollout::DisruptionBudget;
use flightctl_types::Device;

/// Key identifying one disruption-budget bucket: the ordered tuple of
/// `groupBy` label values for a device, or `None` for any value that's
/// missing — devices missing a `groupBy` label land in one shared "empty"
/// bucket (§4.3), distinct from every combination that does have all the
/// labels present.
pub type BucketKey = Vec<Option<String>>;

pub fn bucket_key(device: &Device, group_by: &[String]) -> BucketKey {
    group_by.iter().map(|key| device.metadata.labels.get(key).cloned()).collect()
}

/// Whether `device` currently counts against a bucket's `unavailable`
/// count (§4.3): disconnected, mid-update, in an error state, already
/// claimed by the current batch, or paused on a store conflict. A device
/// that has never been touched, or whose last update finished or was
/// canceled, is available — the budget cares about devices not currently
/// serving, not about which template version they happen to be on.
/// Awaiting-reconnect devices are treated as disconnected for this purpose
/// (§9 open question).
pub fn counts_as_unavailable(device: &Device, now: DateTime<Utc>, disconnect_timeout_secs: i64) -> bool {
    use flightctl_types::device::DeviceUpdatingReason::*;

    if device.is_disconnected(now, disconnect_timeout_secs) {
        return true;
    }
    if device.annotation(AnnotationKey::AwaitingReconnect).is_some() {
        return true;
    }
    if device.annotation(AnnotationKey::ConflictPaused).is_some() {
        return true;
    }
    if device.annotation(AnnotationKey::SelectedForRollout).is_some() {
        return true;
    }
    matches!(
        device.status.updating_reason,
        Some(Preparing | ReadyToUpdate | ApplyingUpdate | Rebooting | RollingBack | Retrying | Error)
    )
}

/// Partition `all_devices` into disruption-budget buckets and compute each
/// bucket's current `unavailable` count, keyed by [`bucket_key`].
pub fn bucket_unavailability(
    all_devices: &[Device],
    group_by: &[String],
    now: DateTime<Utc>,
) -> BTreeMap<BucketKey, (usize, usize)> {
    let mut buckets: BTreeMap<BucketKey, (usize, usize)> = BTreeMap::new();
    for device in all_devices {
        let key = bucket_key(device, group_by);
        let entry = buckets.entry(key).or_insert((0, 0));
        entry.0 += 1; // bucket size
        if counts_as_unavailable(device, now, DEFAULT_DISCONNECT_TIMEOUT_SECS) {
            entry.1 += 1; // unavailable count
        }
    }
    buckets
}

/// Greedily admit as many `candidates` (already in the selector's stable
/// order) as the budget allows, without ever letting a bucket cross either
/// bound. Devices that don't fit this reconcile are simply left for the
/// next one (§4.3 "The controller re-tries on each reconcile").
pub fn admit_within_budget<'a>(
    candidates: &[&'a Device],
    all_devices: &[Device],
    budget: &DisruptionBudget,
    now: DateTime<Utc>,
) -> Vec<&'a Device> {
    let mut buckets = bucket_unavailability(all_devices, &budget.group_by, now);
    let mut admitted = Vec::new();

    for device in candidates {
        let key = bucket_key(device, &budget.group_by);
        let (bucket_size, unavailable) = buckets.entry(key.clone()).or_insert((0, 0));
        let already_unavailable = counts_as_unavailable(device, now, DEFAULT_DISCONNECT_TIMEOUT_SECS);
        let projected_unavailable = if already_unavailable { *unavailable } else { *unavailable + 1 };

        let within_max = budget.max_unavailable.is_none_or(|max| projected_unavailable as u32 <= max);
        let within_min = budget
            .min_available
            .is_none_or(|min| (*bucket_size as i64 - projected_unavailable as i64) >= min as i64);

        if within_max && within_min {
            if !already_unavailable {
                *unavailable += 1;
            }
            admitted.push(*device);
        }
    }

    admitted
}

#[cfg(test)]
mod tests {
    use super::*;
    use flightctl_types::device::{ConsoleConfig, DeviceSpec, DeviceStatus, OciReference};
    use flightctl_types::ObjectMeta;
    use std::collections::BTreeMap as StdBTreeMap;

    fn device_with_labels(name: &str, labels: &[(&str, &str)]) -> Device {
        let mut meta = ObjectMeta::new("org-1", name);
        meta.labels = labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
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
            status: DeviceStatus::default(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    /// §8 scenario 2's device shape: 3 devices in `madrid` split across
    /// `web`/`db` functions, grouped by `[site, function]` — each bucket
    /// must be limited independently.
    #[test]
    fn disruption_budget_limits_per_bucket_admission() {
        let devices = vec![
            device_with_labels("web-1", &[("site", "madrid"), ("function", "web")]),
            device_with_labels("web-2", &[("site", "madrid"), ("function", "web")]),
            device_with_labels("db-1", &[("site", "madrid"), ("function", "db")]),
        ];
        let budget = DisruptionBudget {
            min_available: Some(1),
            max_unavailable: Some(1),
            group_by: vec!["site".to_string(), "function".to_string()],
        };
        let candidates: Vec<&Device> = devices.iter().collect();
        let admitted = admit_within_budget(&candidates, &devices, &budget, now());

        // The two `web` devices share a bucket; only one may be admitted
        // at a time to respect maxUnavailable:1 within that bucket.
        let web_admitted = admitted.iter().filter(|d| d.metadata.name.starts_with("web")).count();
        assert_eq!(web_admitted, 1);
        // The lone db device has its own bucket and is unconstrained by the web bucket.
        assert!(admitted.iter().any(|d| d.metadata.name == "db-1"));
    }

    #[test]
    fn devices_missing_group_by_label_share_the_empty_bucket() {
        let devices = vec![
            device_with_labels("a", &[]),
            device_with_labels("b", &[]),
        ];
        let budget = DisruptionBudget {
            min_available: None,
            max_unavailable: Some(1),
            group_by: vec!["site".to_string()],
        };
        let candidates: Vec<&Device> = devices.iter().collect();
        let admitted = admit_within_budget(&candidates, &devices, &budget, now());
        assert_eq!(admitted.len(), 1);
    }

    #[test]
    fn min_available_blocks_admission_when_bucket_is_small() {
        let devices = vec![device_with_labels("a", &[("site", "madrid")])];
        let budget = DisruptionBudget {
            min_available: Some(1),
            max_unavailable: None,
            group_by: vec!["site".to_string()],
        };
        let candidates: Vec<&Device> = devices.iter().collect();
        let admitted = admit_within_budget(&candidates, &devices, &budget, now());
        assert!(admitted.is_empty(), "admitting the only device would leave 0 available, below minAvailable:1");
    }

    #[test]
    fn unbounded_budget_admits_everyone() {
        let devices = vec![
            device_with_labels("a", &[("site", "madrid")]),
            device_with_labels("b", &[("site", "madrid")]),
        ];
        let budget = DisruptionBudget {
            min_available: None,
            max_unavailable: None,
            group_by: vec!["site".to_string()],
        };
        let candidates: Vec<&Device> = devices.iter().collect();
        let admitted = admit_within_budget(&candidates, &devices, &budget, now());
        assert_eq!(admitted.len(), 2);
    }
}
