//! The Rollout Controller reconcile loop (§4.3): one call of
//! [`reconcile_fleet`] advances a single Fleet by at most one step of its
//! batch state machine. The scheduler (`scheduler.rs`) is responsible for
//! calling this repeatedly, never concurrently for the same fleet.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use flightctl_events::{ChangeOp, EventBus, ResourceChanged, ResourceKind};
use flightctl_render::render;
use flightctl_selector::select;
use flightctl_store::Store;
use flightctl_types::metadata::AnnotationKey;
use flightctl_types::rollout::{RolloutApprovalMethod, RolloutStatus};
use flightctl_types::{Device, Event, EventReason, Fleet, ResourceRef};
use tracing::{info, warn};

use crate::batch_state::FleetRuntimeState;
use crate::disruption::admit_within_budget;
use crate::evaluation::{completion_report, evaluate_batch, ready_to_evaluate};
use crate::{RolloutError, RolloutResult};

const ACTOR: &str = "system:rollout-controller";
const SOURCE_COMPONENT: &str = "flightctl-rollout";
const DEFAULT_SUCCESS_THRESHOLD_PCT: u8 = 100;
const DEFAULT_UPDATE_TIMEOUT_SECS: u64 = 30 * 60;

pub struct RolloutController {
    store: Arc<dyn Store>,
    events: Arc<EventBus>,
}

impl RolloutController {
    pub fn new(store: Arc<dyn Store>, events: Arc<EventBus>) -> Self {
        Self { store, events }
    }

    /// Advance `fleet_ref` by one reconcile step. Returns `Ok(())` whether
    /// or not any state actually changed — "nothing to do this pass" is
    /// not an error (§4.3: the controller re-tries on each reconcile).
    pub async fn reconcile_fleet(
        &self,
        fleet_ref: &ResourceRef,
        runtime: &mut FleetRuntimeState,
        now: DateTime<Utc>,
    ) -> RolloutResult<()> {
        let fleet = self.store.get_fleet(fleet_ref).await?;

        let template_version = fleet.annotation_u64(AnnotationKey::TemplateVersion).unwrap_or(0);
        let deploying_version = fleet.annotation_u64(AnnotationKey::DeployingTemplateVersion);

        match deploying_version {
            None if template_version == 0 => Ok(()),
            None => self.start_rollout(fleet, template_version, runtime, now).await,
            Some(deploying) if deploying != template_version => {
                self.replan_for_template_change(fleet, template_version, runtime, now).await
            }
            Some(deploying) => self.advance_batch(fleet, deploying, runtime, now).await,
        }
    }

    async fn start_rollout(
        &self,
        fleet: Fleet,
        template_version: u64,
        runtime: &mut FleetRuntimeState,
        now: DateTime<Utc>,
    ) -> RolloutResult<()> {
        let approval_method = approval_method(&fleet);
        let preliminary_approved = matches!(approval_method, RolloutApprovalMethod::Automatic);

        let reference = fleet.metadata.reference();
        let expected = fleet.metadata.resource_version.unwrap_or(flightctl_types::ResourceVersion::INITIAL);
        let devices = self.store.list_devices(&fleet.metadata.org_id, &fleet.spec.selector).await;
        let sequence = active_sequence(&fleet);
        let plan = select(&devices, &sequence);

        self.store
            .update_fleet(
                &reference,
                expected,
                Box::new(move |f: &mut Fleet| {
                    f.metadata.set_annotation(AnnotationKey::DeployingTemplateVersion, template_version.to_string());
                    f.metadata.set_annotation(AnnotationKey::BatchNumber, "0");
                    f.metadata.set_annotation(AnnotationKey::RolloutApprovalMethod, approval_method.as_str());
                    f.metadata.set_annotation(AnnotationKey::RolloutApproved, preliminary_approved.to_string());
                    f.metadata.set_annotation(AnnotationKey::DeviceSelectionConfigDigest, plan.digest.clone());
                    f.status.rollout_status = if preliminary_approved { RolloutStatus::Active } else { RolloutStatus::Waiting };
                    f.status.rollout_message = None;
                }),
            )
            .await?;

        runtime.note_active_batch(0, now);
        info!(fleet = %fleet.metadata.name, template_version, "rollout started");
        self.publish(ResourceKind::Fleet, &fleet.metadata.org_id, &fleet.metadata.name, ChangeOp::Updated);
        Ok(())
    }

    async fn replan_for_template_change(
        &self,
        fleet: Fleet,
        new_template_version: u64,
        runtime: &mut FleetRuntimeState,
        now: DateTime<Utc>,
    ) -> RolloutResult<()> {
        // §4.3 "Template change during rollout": keep batchNumber, recompute
        // the digest against the new template version, never regress an
        // already-Updated device. Devices whose renderedTemplateVersion
        // already equals the new version are simply "done" the next time we
        // classify them — §4.1's renderer naturally no-ops for them since
        // nothing in their rendered spec has changed.
        let reference = fleet.metadata.reference();
        let expected = fleet.metadata.resource_version.unwrap_or(flightctl_types::ResourceVersion::INITIAL);
        let devices = self.store.list_devices(&fleet.metadata.org_id, &fleet.spec.selector).await;
        let sequence = active_sequence(&fleet);
        let plan = select(&devices, &sequence);

        self.store
            .update_fleet(
                &reference,
                expected,
                Box::new(move |f: &mut Fleet| {
                    f.metadata.set_annotation(AnnotationKey::DeployingTemplateVersion, new_template_version.to_string());
                    f.metadata.set_annotation(AnnotationKey::DeviceSelectionConfigDigest, plan.digest.clone());
                }),
            )
            .await?;

        let batch_number = fleet.annotation_u32(AnnotationKey::BatchNumber).unwrap_or(0);
        runtime.note_active_batch(batch_number, now);
        info!(fleet = %fleet.metadata.name, new_template_version, "re-planned rollout for template change");
        Ok(())
    }

    async fn advance_batch(
        &self,
        fleet: Fleet,
        deploying_version: u64,
        runtime: &mut FleetRuntimeState,
        now: DateTime<Utc>,
    ) -> RolloutResult<()> {
        let batch_number = fleet.annotation_u32(AnnotationKey::BatchNumber).unwrap_or(0);
        runtime.note_active_batch(batch_number, now);

        if !fleet.annotation_bool(AnnotationKey::RolloutApproved) {
            if fleet.status.rollout_status != RolloutStatus::Waiting {
                self.set_rollout_status(&fleet, RolloutStatus::Waiting, None).await?;
            }
            return Ok(());
        }

        let org_id = fleet.metadata.org_id.clone();
        let all_devices = self.store.list_devices(&org_id, &fleet.spec.selector).await;
        let sequence = active_sequence(&fleet);
        let plan = select(&all_devices, &sequence);

        let Some(batch) = plan.batch(batch_number) else {
            return Err(RolloutError::Fatal {
                device: fleet.metadata.name.clone(),
                detail: format!("batch {batch_number} not present in current selection plan"),
            });
        };

        let selected: Vec<&Device> = all_devices.iter().filter(|d| batch.members.contains(&d.metadata.name)).collect();

        self.propagate_batch(&fleet, deploying_version, &selected, &all_devices, now).await;

        let timeout_secs = batch_timeout_seconds(&fleet, batch_number, &sequence);
        let timed_out = runtime.has_timed_out(now, timeout_secs);
        let selected_snapshot: Vec<Device> = selected.iter().map(|d| (*d).clone()).collect();

        if !ready_to_evaluate(&selected_snapshot, timed_out) {
            if fleet.status.rollout_status != RolloutStatus::Active {
                self.set_rollout_status(&fleet, RolloutStatus::Active, None).await?;
            }
            return Ok(());
        }

        let threshold_pct = batch_success_threshold(&fleet, batch_number, &sequence);
        let evaluation = evaluate_batch(&selected_snapshot, threshold_pct);
        let report = completion_report(batch_number, &evaluation);
        let is_final = plan.is_final(batch_number);

        let reference = fleet.metadata.reference();
        let expected = fleet.metadata.resource_version.unwrap_or(flightctl_types::ResourceVersion::INITIAL);
        let approval_method = approval_method(&fleet);
        let passed = evaluation.passed;
        let report_json = serde_json::to_string(&report).unwrap_or_default();

        self.store
            .update_fleet(
                &reference,
                expected,
                Box::new(move |f: &mut Fleet| {
                    f.metadata.set_annotation(AnnotationKey::LastBatchCompletionReport, report_json.clone());
                    if passed {
                        if is_final {
                            f.metadata.clear_annotation(AnnotationKey::DeployingTemplateVersion);
                            f.status.rollout_status = RolloutStatus::Inactive;
                        } else {
                            let next_batch = batch_number + 1;
                            let next_approved = matches!(approval_method, RolloutApprovalMethod::Automatic);
                            f.metadata.set_annotation(AnnotationKey::BatchNumber, next_batch.to_string());
                            f.metadata.set_annotation(AnnotationKey::RolloutApproved, next_approved.to_string());
                            f.status.rollout_status = if next_approved { RolloutStatus::Active } else { RolloutStatus::Waiting };
                        }
                        f.status.rollout_message = None;
                    } else {
                        f.status.rollout_status = RolloutStatus::Suspended;
                        f.status.rollout_message =
                            Some(format!("batch {batch_number} success ratio {:.2} below threshold {:.2}", evaluation.report.success_ratio, evaluation.report.threshold));
                    }
                }),
            )
            .await?;

        if passed && !is_final {
            runtime.note_active_batch(batch_number + 1, now);
        }

        let reason = if passed { EventReason::FleetRolloutBatchCompleted } else { EventReason::FleetRolloutFailed };
        self.emit(&fleet, reason, format!("batch {batch_number}: {}/{} succeeded", evaluation.report.succeeded, evaluation.report.selected))
            .await;
        if passed && is_final {
            self.emit(&fleet, EventReason::FleetRolloutCompleted, "rollout complete".to_string()).await;
        }
        self.publish(ResourceKind::Fleet, &org_id, &fleet.metadata.name, ChangeOp::Updated);

        Ok(())
    }

    /// Admit as many not-yet-selected batch members as the disruption
    /// budget allows and render+propagate each admitted device (§4.1,
    /// §4.3 steps 1-2). Per-device render/store failures are logged and
    /// left for the next reconcile; they never abort the batch.
    async fn propagate_batch(
        &self,
        fleet: &Fleet,
        deploying_version: u64,
        selected: &[&Device],
        all_devices: &[Device],
        now: DateTime<Utc>,
    ) {
        let pending: Vec<&Device> = selected
            .iter()
            .filter(|d| d.annotation(AnnotationKey::SelectedForRollout).is_none())
            .copied()
            .collect();
        if pending.is_empty() {
            return;
        }

        let admitted: Vec<&Device> = match fleet.rollout_policy().and_then(|p| p.disruption_budget.as_ref()) {
            Some(budget) => admit_within_budget(&pending, all_devices, budget, now),
            None => pending,
        };

        for device in admitted {
            if let Err(err) = self.propagate_device(fleet, deploying_version, device).await {
                warn!(device = %device.metadata.name, error = %err, "device propagation failed, will retry next reconcile");
            }
        }
    }

    async fn propagate_device(&self, fleet: &Fleet, deploying_version: u64, device: &Device) -> RolloutResult<()> {
        let rendered = render::render(&fleet.spec.template.spec, device)?;
        let hash = render::hash_spec(&rendered)?;
        let current_service_version = device
            .annotation(AnnotationKey::RenderedVersion)
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        let next_version = flightctl_types::device::next_rendered_version(current_service_version, device.status.config.rendered_version);

        let reference = device.metadata.reference();
        let expected = device.metadata.resource_version.unwrap_or(flightctl_types::ResourceVersion::INITIAL);
        let name = device.metadata.name.clone();

        let result = self
            .store
            .update_device(
                &reference,
                expected,
                Box::new(move |d: &mut Device| {
                    d.spec = rendered;
                    d.metadata.set_annotation(AnnotationKey::SelectedForRollout, "true");
                    d.metadata.set_annotation(AnnotationKey::TemplateVersion, deploying_version.to_string());
                    d.metadata.set_annotation(AnnotationKey::RenderedTemplateVersion, deploying_version.to_string());
                    d.metadata.set_annotation(AnnotationKey::RenderedVersion, next_version.to_string());
                    d.metadata.set_annotation(AnnotationKey::RenderedSpecHash, hash.clone());
                    d.metadata.clear_annotation(AnnotationKey::LastRolloutError);
                }),
            )
            .await;

        match result {
            Ok(_) => {
                self.emit_for_device(fleet, &name, EventReason::DeviceSelectedForRollout, "selected for rollout".to_string()).await;
                self.publish(ResourceKind::Device, &fleet.metadata.org_id, &name, ChangeOp::Updated);
                Ok(())
            }
            Err(err) => Err(RolloutError::from(err)),
        }
    }

    async fn set_rollout_status(&self, fleet: &Fleet, status: RolloutStatus, message: Option<String>) -> RolloutResult<()> {
        let reference = fleet.metadata.reference();
        let expected = fleet.metadata.resource_version.unwrap_or(flightctl_types::ResourceVersion::INITIAL);
        self.store
            .update_fleet(
                &reference,
                expected,
                Box::new(move |f: &mut Fleet| {
                    f.status.rollout_status = status;
                    f.status.rollout_message = message;
                }),
            )
            .await?;
        Ok(())
    }

    async fn emit(&self, fleet: &Fleet, reason: EventReason, details: String) {
        self.emit_for(&fleet.metadata.org_id, "Fleet", &fleet.metadata.name, reason, details).await;
    }

    async fn emit_for_device(&self, fleet: &Fleet, device_name: &str, reason: EventReason, details: String) {
        self.emit_for(&fleet.metadata.org_id, "Device", device_name, reason, details).await;
    }

    async fn emit_for(&self, org_id: &str, kind: &str, name: &str, reason: EventReason, details: String) {
        let _ = org_id;
        self.store
            .emit_event(Event {
                involved_object: flightctl_types::event::InvolvedObject { kind: kind.to_string(), name: name.to_string() },
                reason,
                actor: ACTOR.to_string(),
                source_component: SOURCE_COMPONENT.to_string(),
                request_id: None,
                details,
                occurred_at: Utc::now(),
            })
            .await;
    }

    fn publish(&self, kind: ResourceKind, org_id: &str, name: &str, op: ChangeOp) {
        self.events.publish(ResourceChanged::new(kind, org_id, name, op));
    }
}

fn approval_method(fleet: &Fleet) -> RolloutApprovalMethod {
    fleet
        .rollout_policy()
        .and_then(|p| p.approval_method)
        .unwrap_or(RolloutApprovalMethod::Automatic)
}

fn active_sequence(fleet: &Fleet) -> flightctl_types::rollout::BatchSequence {
    fleet.rollout_policy().and_then(|p| p.device_selection.clone()).unwrap_or_default()
}

/// Explicit batches may override the fleet-level success threshold; the
/// preliminary and final implicit batches always fall back to it (§4.3).
fn batch_success_threshold(fleet: &Fleet, batch_number: u32, sequence: &flightctl_types::rollout::BatchSequence) -> u8 {
    let explicit = explicit_batch(sequence, batch_number).and_then(|b| b.success_threshold);
    explicit
        .or_else(|| fleet.rollout_policy().and_then(|p| p.success_threshold))
        .unwrap_or(DEFAULT_SUCCESS_THRESHOLD_PCT)
}

fn batch_timeout_seconds(fleet: &Fleet, batch_number: u32, sequence: &flightctl_types::rollout::BatchSequence) -> u64 {
    let explicit = explicit_batch(sequence, batch_number).and_then(|b| b.update_timeout_seconds);
    explicit
        .or_else(|| fleet.rollout_policy().and_then(|p| p.default_update_timeout_seconds))
        .unwrap_or(DEFAULT_UPDATE_TIMEOUT_SECS)
}

fn explicit_batch(sequence: &flightctl_types::rollout::BatchSequence, batch_number: u32) -> Option<&flightctl_types::rollout::Batch> {
    if batch_number == 0 {
        return None;
    }
    sequence.sequence.get((batch_number - 1) as usize)
}
