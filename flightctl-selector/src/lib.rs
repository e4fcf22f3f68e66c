//! Device Selector (§4.2): partitions a Fleet's owned devices into the
//! ordered batch sequence a rollout proceeds through.
//!
//! This crate is deliberately a pure function of its inputs — no Store
//! access, no clock, no randomness — so a [`SelectionPlan`] can be diffed
//! and recomputed cheaply whenever `flightctl-rollout` needs to re-plan
//! against a changed template (§4.2 "re-running selection on the same
//! inputs yields identical assignments").

use flightctl_types::metadata::WithMeta;
use flightctl_types::{BatchSequence, Device};
use sha2::{Digest, Sha256};

/// The devices assigned to one position in the sequence: `0` is always the
/// synthetic preliminary batch, `sequence.len() + 1` is always the
/// synthetic final batch, everything between is an explicit batch in
/// declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchAssignment {
    pub batch_index: u32,
    pub members: Vec<String>,
}

/// The full ordered partition produced by [`select`], plus the digest that
/// freezes it (§4.2 step 1, §3 `deviceSelectionConfigDigest`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionPlan {
    pub digest: String,
    pub batches: Vec<BatchAssignment>,
}

impl SelectionPlan {
    pub fn batch(&self, index: u32) -> Option<&BatchAssignment> {
        self.batches.iter().find(|b| b.batch_index == index)
    }

    pub fn final_batch_index(&self) -> u32 {
        self.batches.last().map(|b| b.batch_index).unwrap_or(0)
    }

    pub fn is_final(&self, index: u32) -> bool {
        index == self.final_batch_index()
    }
}

/// Run the algorithm in §4.2 against a device snapshot `D` and a fleet's
/// active `BatchSequence`.
///
/// 1. The preliminary batch (index 0) never selects devices of its own —
///    it exists purely as the manual/auto approval gate the rollout
///    controller waits on before touching anything (§3, §4.3).
/// 2. Each explicit batch claims, in declaration order, the first `limit`
///    of its still-unclaimed matching candidates under the name-ascending
///    total order — the hard tie-break requirement (§4.2).
/// 3. Whatever is left after the last explicit batch lands in the final
///    implicit batch.
///
/// A device can therefore appear in at most one of the returned
/// [`BatchAssignment`]s, and re-running this function against an unchanged
/// `devices`/`sequence` pair always returns the same plan byte-for-byte.
pub fn select(devices: &[Device], sequence: &BatchSequence) -> SelectionPlan {
    let digest = digest_for(devices, sequence);

    let mut remaining: Vec<&Device> = devices.iter().collect();
    remaining.sort_by(|a, b| a.meta().name.cmp(&b.meta().name));

    let mut batches = Vec::with_capacity(sequence.sequence.len() + 2);
    batches.push(BatchAssignment {
        batch_index: 0,
        members: Vec::new(),
    });

    for (i, batch) in sequence.sequence.iter().enumerate() {
        let candidates: Vec<&&Device> = remaining
            .iter()
            .filter(|d| batch.selector.matches(&d.meta().labels))
            .collect();
        // Percentage base is the current matching candidates, not the full
        // fleet (§4.2) — `candidates.len()` here, never `devices.len()`.
        let limit = batch.limit.resolve(candidates.len());
        let selected: Vec<String> = candidates
            .iter()
            .take(limit)
            .map(|d| d.meta().name.clone())
            .collect();
        remaining.retain(|d| !selected.contains(&d.meta().name));
        batches.push(BatchAssignment {
            batch_index: (i + 1) as u32,
            members: selected,
        });
    }

    let final_index = sequence.sequence.len() as u32 + 1;
    let final_members: Vec<String> = remaining.iter().map(|d| d.meta().name.clone()).collect();
    batches.push(BatchAssignment {
        batch_index: final_index,
        members: final_members,
    });

    SelectionPlan { digest, batches }
}

/// Digest over the device-name set and the batch sequence shape. Two calls
/// to [`select`] with a byte-identical device set and sequence always
/// produce the same digest; any change to either (a device joins/leaves
/// the fleet, the sequence is edited) changes it, which is how
/// `flightctl-rollout` notices it needs to re-plan (§4.2 step 3, §4.3
/// "Template change during rollout").
fn digest_for(devices: &[Device], sequence: &BatchSequence) -> String {
    let mut names: Vec<&str> = devices.iter().map(|d| d.meta().name.as_str()).collect();
    names.sort_unstable();

    let mut hasher = Sha256::new();
    for name in &names {
        hasher.update(name.as_bytes());
        hasher.update(b"\0");
    }
    let sequence_json = serde_json::to_vec(sequence).unwrap_or_default();
    hasher.update(&sequence_json);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flightctl_types::device::{ConsoleConfig, DeviceSpec, DeviceStatus, OciReference};
    use flightctl_types::rollout::{Batch, BatchLimit};
    use flightctl_types::{LabelSelector, ObjectMeta};
    use std::collections::BTreeMap;

    fn device(name: &str, site: &str) -> Device {
        let mut labels = BTreeMap::new();
        labels.insert("site".to_string(), site.to_string());
        let mut metadata = ObjectMeta::new("org-1", name);
        metadata.labels = labels;
        Device {
            metadata,
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

    fn madrid_selector() -> LabelSelector {
        let mut match_labels = BTreeMap::new();
        match_labels.insert("site".to_string(), "madrid".to_string());
        LabelSelector {
            match_labels,
            match_expressions: Vec::new(),
        }
    }

    /// §8 scenario 1: 3 madrid devices, 1 paris device. Batch 1 takes 1
    /// madrid device absolute, batch 2 takes `ceil(0.5 * 2) = 1` more
    /// madrid device, the final implicit batch mops up the rest.
    #[test]
    fn scenario_absolute_and_percentage_limits() {
        let devices = vec![
            device("madrid-a", "madrid"),
            device("madrid-b", "madrid"),
            device("madrid-c", "madrid"),
            device("paris-a", "paris"),
        ];
        let sequence = BatchSequence {
            sequence: vec![
                Batch {
                    selector: madrid_selector(),
                    limit: BatchLimit::Absolute(1),
                    success_threshold: None,
                    update_timeout_seconds: None,
                },
                Batch {
                    selector: madrid_selector(),
                    limit: BatchLimit::Percentage(50),
                    success_threshold: None,
                    update_timeout_seconds: None,
                },
            ],
        };

        let plan = select(&devices, &sequence);
        assert_eq!(plan.batches.len(), 4); // preliminary + 2 explicit + final
        assert_eq!(plan.batch(0).unwrap().members.len(), 0);
        assert_eq!(plan.batch(1).unwrap().members, vec!["madrid-a".to_string()]);
        assert_eq!(plan.batch(2).unwrap().members, vec!["madrid-b".to_string()]);
        let mut finals = plan.batch(3).unwrap().members.clone();
        finals.sort();
        assert_eq!(finals, vec!["madrid-c".to_string(), "paris-a".to_string()]);
        assert!(plan.is_final(3));
    }

    #[test]
    fn tie_break_is_name_ascending() {
        let devices = vec![device("zeta", "madrid"), device("alpha", "madrid")];
        let sequence = BatchSequence {
            sequence: vec![Batch {
                selector: madrid_selector(),
                limit: BatchLimit::Absolute(1),
                success_threshold: None,
                update_timeout_seconds: None,
            }],
        };
        let plan = select(&devices, &sequence);
        assert_eq!(plan.batch(1).unwrap().members, vec!["alpha".to_string()]);
    }

    #[test]
    fn a_device_appears_in_at_most_one_batch() {
        let devices = vec![
            device("a", "madrid"),
            device("b", "madrid"),
            device("c", "paris"),
        ];
        let sequence = BatchSequence {
            sequence: vec![Batch {
                selector: madrid_selector(),
                limit: BatchLimit::Percentage(100),
                success_threshold: None,
                update_timeout_seconds: None,
            }],
        };
        let plan = select(&devices, &sequence);
        let mut seen = std::collections::HashSet::new();
        for batch in &plan.batches {
            for member in &batch.members {
                assert!(seen.insert(member.clone()), "device {member} appeared twice");
            }
        }
    }

    #[test]
    fn identical_inputs_produce_an_identical_plan() {
        let devices = vec![device("a", "madrid"), device("b", "paris")];
        let sequence = BatchSequence {
            sequence: vec![Batch {
                selector: madrid_selector(),
                limit: BatchLimit::Absolute(1),
                success_threshold: None,
                update_timeout_seconds: None,
            }],
        };
        let first = select(&devices, &sequence);
        let second = select(&devices, &sequence);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_sequence_puts_everything_in_the_final_batch() {
        let devices = vec![device("a", "madrid"), device("b", "paris")];
        let sequence = BatchSequence::default();
        let plan = select(&devices, &sequence);
        assert_eq!(plan.batches.len(), 2); // preliminary + final
        assert!(plan.is_final(1));
        let mut finals = plan.batch(1).unwrap().members.clone();
        finals.sort();
        assert_eq!(finals, vec!["a".to_string(), "b".to_string()]);
    }

    mod props {
        use super::*;
        use flightctl_types::rollout::BatchLimit;
        use proptest::prelude::*;

        proptest! {
            /// §4.2: a percentage limit never admits more than the candidate
            /// set it was resolved against, and resolving `100%` always
            /// takes everything.
            #[test]
            fn percentage_limit_never_exceeds_candidates(pct in 0u8..=100, candidates in 0usize..200) {
                let resolved = BatchLimit::Percentage(pct).resolve(candidates);
                prop_assert!(resolved <= candidates);
                if pct == 100 {
                    prop_assert_eq!(resolved, candidates);
                }
            }

            /// §4.2 "stable total order ... tie-break on name is a hard
            /// requirement": running `select` twice on a shuffled-but-equal
            /// device set yields byte-identical plans, and every batch's
            /// members come out name-ascending.
            #[test]
            fn selection_is_stably_ordered_and_deterministic(
                names in prop::collection::hash_set("[a-z]{3,8}", 1..12),
                limit in 1u32..20,
            ) {
                let mut devices: Vec<Device> = names.into_iter().map(|n| device(&n, "madrid")).collect();
                let sequence = BatchSequence {
                    sequence: vec![Batch {
                        selector: madrid_selector(),
                        limit: BatchLimit::Absolute(limit),
                        success_threshold: None,
                        update_timeout_seconds: None,
                    }],
                };

                let first = select(&devices, &sequence);
                devices.reverse();
                let second = select(&devices, &sequence);
                prop_assert_eq!(&first, &second);

                let selected = &first.batch(1).unwrap().members;
                let mut sorted = selected.clone();
                sorted.sort();
                prop_assert_eq!(selected, &sorted);
            }
        }
    }
}
