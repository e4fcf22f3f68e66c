//! Handlers turning HTTP into `Store`/engine calls (§6). Kept thin by
//! design: every handler validates its input, stamps/reads metadata, and
//! delegates to `flightctl-store`/`flightctl-validate`/`flightctl-pki` —
//! none of the rollout, rendering, or selection logic is reimplemented
//! here, matching the teacher's `routes/*.rs` "handler calls into a
//! service layer, never reimplements it" shape.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use std::collections::BTreeMap;

use flightctl_events::{ChangeOp, ResourceChanged, ResourceKind};
use flightctl_types::metadata::{is_dns1123_label, AnnotationKey, ObjectMeta, ResourceRef};
use flightctl_types::{
    AuthProvider, CertificateSigningRequest, Device, EnrollmentRequest, Event, Fleet, LabelSelector,
    RolloutApprovalMethod, Status,
};
use flightctl_validate::{
    device::validate_device_spec, rollout_policy::validate_rollout_policy,
    schedule::validate_update_schedule, template::validate_template, validate_label_key,
    validate_label_value, validate_name_immutable, ValidationError,
};

use crate::auth_middleware::AuthContext;
use crate::error::{ApiError, ApiResult};
use crate::patch::{apply_metadata_patch, PatchOperation};
use crate::state::AppState;

fn validate_labels_and_annotations(meta: &ObjectMeta) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for key in meta.labels.keys().chain(meta.annotations.keys()) {
        if let Some(msg) = validate_label_key(key) {
            errors.push(ValidationError::new("metadata", msg));
        }
    }
    for value in meta.labels.values().chain(meta.annotations.values()) {
        if let Some(msg) = validate_label_value(value) {
            errors.push(ValidationError::new("metadata", msg));
        }
    }
    errors
}

fn validate_fleet_spec(fleet: &Fleet) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if !is_dns1123_label(&fleet.metadata.name) {
        errors.push(ValidationError::new("metadata.name", "must be a valid DNS-1123 name"));
    }
    errors.extend(validate_labels_and_annotations(&fleet.metadata));
    errors.extend(validate_device_spec(&fleet.spec.template.spec));
    errors.extend(validate_template(&fleet.spec.template.spec));
    if let Some(policy) = &fleet.spec.rollout_policy {
        errors.extend(validate_rollout_policy(policy));
        if let Some(schedule) = &policy.update_schedule {
            errors.extend(validate_update_schedule(schedule, Utc::now()));
        }
    }
    errors
}

fn validate_device_resource(device: &Device) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if !is_dns1123_label(&device.metadata.name) {
        errors.push(ValidationError::new("metadata.name", "must be a valid DNS-1123 name"));
    }
    errors.extend(validate_labels_and_annotations(&device.metadata));
    errors.extend(validate_device_spec(&device.spec));
    errors
}

fn parse_label_selector(params: &BTreeMap<String, String>) -> LabelSelector {
    let mut selector = LabelSelector::default();
    if let Some(raw) = params.get("labelSelector") {
        for pair in raw.split(',').filter(|p| !p.is_empty()) {
            if let Some((k, v)) = pair.split_once('=') {
                selector.match_labels.insert(k.trim().to_string(), v.trim().to_string());
            }
        }
    }
    selector
}

// ---------------------------------------------------------------- Fleets

pub async fn list_fleets(State(state): State<AppState>, Extension(ctx): Extension<AuthContext>) -> Json<Vec<Fleet>> {
    Json(state.store.list_fleets(&ctx.org_id).await)
}

pub async fn get_fleet(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(name): Path<String>,
) -> ApiResult<Json<Fleet>> {
    let reference = ResourceRef::new(ctx.org_id.clone(), name);
    let fleet = state.store.get_fleet(&reference).await?;
    Ok(Json(fleet))
}

pub async fn create_fleet(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(mut fleet): Json<Fleet>,
) -> ApiResult<(StatusCode, Json<Fleet>)> {
    fleet.metadata.org_id = ctx.org_id.clone();
    fleet.metadata.resource_version = None;
    let errors = validate_fleet_spec(&fleet);
    if !errors.is_empty() {
        return Err(errors.into());
    }
    let created = state.store.create_fleet(fleet).await?;
    state.events.publish(ResourceChanged::new(
        ResourceKind::Fleet,
        ctx.org_id,
        created.metadata.name.clone(),
        ChangeOp::Created,
    ));
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn replace_fleet(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(name): Path<String>,
    Json(incoming): Json<Fleet>,
) -> ApiResult<Json<Fleet>> {
    let reference = ResourceRef::new(ctx.org_id.clone(), name.clone());
    let mut errors = validate_name_immutable(&name, &incoming.metadata.name);
    errors.extend(validate_fleet_spec(&incoming));
    if !errors.is_empty() {
        return Err(errors.into());
    }
    let expected = incoming
        .metadata
        .resource_version
        .ok_or_else(|| ApiError::BadRequest("metadata.resourceVersion is required on replace".into()))?;

    let incoming_spec = incoming.spec;
    let updated = state
        .store
        .update_fleet(
            &reference,
            expected,
            Box::new(move |fleet| {
                // Status is server-owned; a PUT body's status is always ignored.
                fleet.spec = incoming_spec;
            }),
        )
        .await?;
    state.events.publish(ResourceChanged::new(
        ResourceKind::Fleet,
        ctx.org_id,
        name,
        ChangeOp::Updated,
    ));
    Ok(Json(updated))
}

pub async fn patch_fleet(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(name): Path<String>,
    Json(ops): Json<Vec<PatchOperation>>,
) -> ApiResult<Json<Fleet>> {
    let reference = ResourceRef::new(ctx.org_id.clone(), name.clone());
    let fleet = state.store.get_fleet(&reference).await?;
    let expected = fleet.metadata.resource_version.unwrap();
    let updated = state
        .store
        .update_fleet(
            &reference,
            expected,
            Box::new(move |fleet| {
                if let Err(err) = apply_metadata_patch(&mut fleet.metadata, &ops) {
                    tracing::warn!(error = %err, "patch rejected, leaving fleet unchanged");
                }
            }),
        )
        .await?;
    state.events.publish(ResourceChanged::new(
        ResourceKind::Fleet,
        ctx.org_id,
        name,
        ChangeOp::Updated,
    ));
    Ok(Json(updated))
}

pub async fn delete_fleet(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    let reference = ResourceRef::new(ctx.org_id.clone(), name.clone());
    state.store.delete_fleet(&reference).await?;
    state.events.publish(ResourceChanged::new(
        ResourceKind::Fleet,
        ctx.org_id,
        name,
        ChangeOp::Deleted,
    ));
    Ok(StatusCode::NO_CONTENT)
}

/// Manual rollout approval sub-resource (§4.3 `Manual` approval method):
/// the only effect is stamping the `rolloutApproved` annotation the
/// controller is already watching for, so reconcile picks it up on its
/// own next pass rather than this handler driving the state machine.
pub async fn approve_fleet_rollout(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(name): Path<String>,
) -> ApiResult<Json<Fleet>> {
    let reference = ResourceRef::new(ctx.org_id.clone(), name.clone());
    let fleet = state.store.get_fleet(&reference).await?;
    let approval_method = fleet
        .rollout_policy()
        .and_then(|p| p.approval_method)
        .unwrap_or(RolloutApprovalMethod::Automatic);
    if approval_method != RolloutApprovalMethod::Manual {
        return Err(ApiError::BadRequest(
            "fleet rollout policy does not require manual approval".into(),
        ));
    }
    let expected = fleet.metadata.resource_version.unwrap();
    let updated = state
        .store
        .update_fleet(
            &reference,
            expected,
            Box::new(|fleet| {
                fleet.metadata.set_annotation(AnnotationKey::RolloutApproved, "true");
            }),
        )
        .await?;
    state.events.publish(ResourceChanged::new(
        ResourceKind::Fleet,
        ctx.org_id,
        name,
        ChangeOp::Updated,
    ));
    Ok(Json(updated))
}

// ---------------------------------------------------------------- Devices

pub async fn list_devices(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Json<Vec<Device>> {
    let selector = parse_label_selector(&params);
    Json(state.store.list_devices(&ctx.org_id, &selector).await)
}

pub async fn get_device(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(name): Path<String>,
) -> ApiResult<Json<Device>> {
    let reference = ResourceRef::new(ctx.org_id.clone(), name);
    Ok(Json(state.store.get_device(&reference).await?))
}

/// Registers a device record directly; real fleets normally gain devices
/// through the Enrollment Controller (`flightctl-pki`), but an operator
/// seeding a standalone (fleet-less) device needs a direct path too.
pub async fn create_device(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(mut device): Json<Device>,
) -> ApiResult<(StatusCode, Json<Device>)> {
    device.metadata.org_id = ctx.org_id.clone();
    device.metadata.resource_version = None;
    let errors = validate_device_resource(&device);
    if !errors.is_empty() {
        return Err(errors.into());
    }
    let created = state.store.create_device(device).await?;
    state.events.publish(ResourceChanged::new(
        ResourceKind::Device,
        ctx.org_id,
        created.metadata.name.clone(),
        ChangeOp::Created,
    ));
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn patch_device(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(name): Path<String>,
    Json(ops): Json<Vec<PatchOperation>>,
) -> ApiResult<Json<Device>> {
    let reference = ResourceRef::new(ctx.org_id.clone(), name.clone());
    let device = state.store.get_device(&reference).await?;
    let expected = device.metadata.resource_version.unwrap();
    let updated = state
        .store
        .update_device(
            &reference,
            expected,
            Box::new(move |device| {
                if let Err(err) = apply_metadata_patch(&mut device.metadata, &ops) {
                    tracing::warn!(error = %err, "patch rejected, leaving device unchanged");
                }
            }),
        )
        .await?;
    state.events.publish(ResourceChanged::new(
        ResourceKind::Device,
        ctx.org_id,
        name,
        ChangeOp::Updated,
    ));
    Ok(Json(updated))
}

// --------------------------------------------------- EnrollmentRequests
//
// No bulk LIST here: the reference `Store` doesn't index enrollment
// requests for org-wide listing, only point lookups by name (a device
// knows its own enrollment request's name from the enrollment flow
// itself).

pub async fn get_enrollment_request(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(name): Path<String>,
) -> ApiResult<Json<EnrollmentRequest>> {
    let reference = ResourceRef::new(ctx.org_id.clone(), name);
    Ok(Json(state.store.get_enrollment_request(&reference).await?))
}

pub async fn create_enrollment_request(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(mut er): Json<EnrollmentRequest>,
) -> ApiResult<(StatusCode, Json<EnrollmentRequest>)> {
    er.metadata.org_id = ctx.org_id.clone();
    er.metadata.resource_version = None;
    er.created_at = Utc::now();
    if !is_dns1123_label(&er.spec.device_name) {
        return Err(ApiError::Unprocessable("spec.deviceName must be a valid DNS-1123 name".into()));
    }
    let created = state.store.create_enrollment_request(er).await?;
    state.events.publish(ResourceChanged::new(
        ResourceKind::EnrollmentRequest,
        ctx.org_id,
        created.metadata.name.clone(),
        ChangeOp::Created,
    ));
    Ok((StatusCode::CREATED, Json(created)))
}

// ---------------------------------------- CertificateSigningRequests

pub async fn list_csrs(State(state): State<AppState>, Extension(ctx): Extension<AuthContext>) -> Json<Vec<CertificateSigningRequest>> {
    Json(state.store.list_csrs(&ctx.org_id).await)
}

pub async fn get_csr(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(name): Path<String>,
) -> ApiResult<Json<CertificateSigningRequest>> {
    let reference = ResourceRef::new(ctx.org_id.clone(), name);
    Ok(Json(state.store.get_csr(&reference).await?))
}

pub async fn create_csr(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(mut csr): Json<CertificateSigningRequest>,
) -> ApiResult<(StatusCode, Json<CertificateSigningRequest>)> {
    csr.metadata.org_id = ctx.org_id.clone();
    csr.metadata.resource_version = None;
    let created = state.store.create_csr(csr).await?;
    state.events.publish(ResourceChanged::new(
        ResourceKind::CertificateSigningRequest,
        ctx.org_id,
        created.metadata.name.clone(),
        ChangeOp::Created,
    ));
    Ok((StatusCode::CREATED, Json(created)))
}

/// Approve/deny is expressed as a PUT replacing `status.conditions`
/// (§4.5, §6): `/spec/*` is immutable (enforced at the JSON-Patch layer
/// for PATCH; a PUT attempting to change it is rejected here the same
/// way), and `preserve_conditions_across_replace` keeps a prior `Denied`
/// from ever being cleared no matter what the caller's body contains.
pub async fn replace_csr(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(name): Path<String>,
    Json(incoming): Json<CertificateSigningRequest>,
) -> ApiResult<Json<CertificateSigningRequest>> {
    let reference = ResourceRef::new(ctx.org_id.clone(), name.clone());
    let existing = state.store.get_csr(&reference).await?;
    if incoming.spec.request_pem != existing.spec.request_pem || incoming.spec.signer_name != existing.spec.signer_name {
        return Err(ApiError::BadRequest("spec is immutable after create".into()));
    }
    let expected = incoming
        .metadata
        .resource_version
        .ok_or_else(|| ApiError::BadRequest("metadata.resourceVersion is required on replace".into()))?;
    let updated = state.store.replace_csr(&reference, expected, incoming).await?;
    state.events.publish(ResourceChanged::new(
        ResourceKind::CertificateSigningRequest,
        ctx.org_id,
        name,
        ChangeOp::Updated,
    ));
    Ok(Json(updated))
}

// ----------------------------------------------------------- AuthProvider

pub async fn list_auth_providers(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Json<Vec<AuthProvider>> {
    let mut providers = state.store.list_auth_providers(&ctx.org_id).await;
    flightctl_pki::sensitive::hide_auth_providers(&mut providers);
    Json(providers)
}

pub async fn get_auth_provider(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(name): Path<String>,
) -> ApiResult<Json<AuthProvider>> {
    let reference = ResourceRef::new(ctx.org_id.clone(), name);
    let mut provider = state.store.get_auth_provider(&reference).await?;
    flightctl_pki::sensitive::hide_auth_provider(&mut provider);
    Ok(Json(provider))
}

pub async fn create_auth_provider(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(mut provider): Json<AuthProvider>,
) -> ApiResult<(StatusCode, Json<AuthProvider>)> {
    provider.metadata.org_id = ctx.org_id.clone();
    provider.metadata.resource_version = None;
    let mut created = state.store.create_auth_provider(provider).await?;
    flightctl_pki::sensitive::hide_auth_provider(&mut created);
    Ok((StatusCode::CREATED, Json(created)))
}

// ----------------------------------------------------------------- Events

pub async fn list_events(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(params): Query<BTreeMap<String, String>>,
) -> ApiResult<Json<Vec<Event>>> {
    let kind = params.get("kind").ok_or_else(|| ApiError::BadRequest("kind query param is required".into()))?;
    let name = params.get("name").ok_or_else(|| ApiError::BadRequest("name query param is required".into()))?;
    let _ = &ctx; // event storage is not org-partitioned in the reference Store
    Ok(Json(state.store.list_events_for(kind, name).await))
}

// ----------------------------------------------------------------- Health

pub async fn healthz(State(state): State<AppState>) -> Json<Status> {
    let uptime = state.started_at.elapsed().as_secs();
    Json(Status::success(200, format!("ok, uptime={uptime}s")))
}

pub async fn readyz(State(state): State<AppState>) -> ApiResult<Json<Status>> {
    if state.is_shutting_down.load(std::sync::atomic::Ordering::Relaxed) {
        return Err(ApiError::Internal("draining".into()));
    }
    Ok(Json(Status::success(200, "ready")))
}

