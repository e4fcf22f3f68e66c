//! Management-cert renewal signer (§4.6): devices periodically request a
//! fresh client certificate before their current one expires, submitted
//! as a `CertificateSigningRequest` with `signer_name ==
//! DeviceManagementRenewal`. Distinct from the enrollment signer path in
//! `enrollment.rs` so downstream callers can tell initial issuance apart
//! from a renewal purely by inspecting the certificate's signer-name
//! extension.

use std::sync::Arc;

use flightctl_events::{ChangeOp, EventBus, ResourceChanged, ResourceKind};
use flightctl_store::Store;
use flightctl_types::csr::SignerName;
use flightctl_types::{Event, EventReason, InvolvedObject, ResourceRef, ResourceVersion};
use tracing::info;

use crate::ca::{device_fingerprint, CertificateAuthority};
use crate::error::{PkiError, PkiResult};

const ACTOR: &str = "system:management-cert-renewal";
const SOURCE_COMPONENT: &str = "flightctl-pki";

pub struct ManagementCertRenewal {
    store: Arc<dyn Store>,
    events: Arc<EventBus>,
    ca: Arc<CertificateAuthority>,
}

impl ManagementCertRenewal {
    pub fn new(store: Arc<dyn Store>, events: Arc<EventBus>, ca: Arc<CertificateAuthority>) -> Self {
        Self { store, events, ca }
    }

    /// Same opaque-blob convention as the enrollment path (see
    /// `enrollment.rs`): the renewal request's first content line names the
    /// device requesting renewal.
    fn extract_device_name(request_pem: &str) -> Option<String> {
        request_pem
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty() && !line.starts_with("-----"))
            .map(str::to_string)
    }

    /// Reconcile one renewal `CertificateSigningRequest`. On success, signs
    /// with the distinct renewal signer name, stamps the CN with the
    /// device's fingerprint, and reflects the renewed cert's serial/expiry
    /// onto the device's status (§4.6).
    pub async fn reconcile_renewal_csr(&self, reference: &ResourceRef) -> PkiResult<()> {
        let csr = self.store.get_csr(reference).await?;
        if csr.spec.signer_name != SignerName::DeviceManagementRenewal {
            return Ok(());
        }
        if csr.status.conditions.denied || csr.status.certificate_pem.is_some() {
            return Ok(());
        }

        let device_name = Self::extract_device_name(&csr.spec.request_pem)
            .ok_or_else(|| PkiError::CsrRejected("renewal csr missing device name".into()))?;
        let device_ref = ResourceRef::new(reference.org_id.clone(), device_name.clone());
        // The device must already exist and be enrolled; a renewal for an
        // unknown device is a rejection, not a retryable transient error.
        let device = self
            .store
            .get_device(&device_ref)
            .await
            .map_err(|_| PkiError::CsrRejected(format!("unknown device {device_name}")))?;

        let fingerprint = device_fingerprint(&device_name);
        let cn = format!("{device_name}-{fingerprint}");
        let issued = self.ca.issue(&cn, SignerName::DeviceManagementRenewal, Some(&fingerprint))?;

        let mut incoming = csr.clone();
        incoming.status.conditions.approved = true;
        incoming.status.certificate_pem = Some(issued.certificate_pem.clone());
        let expected_csr_version = csr.metadata.resource_version.unwrap_or(ResourceVersion::INITIAL);
        self.store.replace_csr(reference, expected_csr_version, incoming).await?;

        let serial = issued.serial.clone();
        let not_after = issued.not_after;
        let expected_device_version = device.metadata.resource_version.unwrap_or(ResourceVersion::INITIAL);
        self.store
            .update_device(
                &device_ref,
                expected_device_version,
                Box::new(move |device| {
                    device.status.management_cert_serial = Some(serial);
                    device.status.management_cert_not_after = Some(not_after);
                }),
            )
            .await?;

        self.events.publish(ResourceChanged::new(
            ResourceKind::Device,
            reference.org_id.clone(),
            device_name.clone(),
            ChangeOp::Updated,
        ));
        self.store
            .emit_event(Event {
                involved_object: InvolvedObject {
                    kind: "Device".into(),
                    name: device_name.clone(),
                },
                reason: EventReason::ManagementCertRenewed,
                actor: ACTOR.into(),
                source_component: SOURCE_COMPONENT.into(),
                request_id: None,
                details: format!("renewed management certificate, serial {}", issued.serial),
                occurred_at: chrono::Utc::now(),
            })
            .await;

        info!(device = %device_name, serial = %issued.serial, "renewed management certificate");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flightctl_store::MemoryStore;
    use flightctl_types::csr::CertificateSigningRequestSpec;
    use flightctl_types::device::{ConsoleConfig, DeviceSpec, OciReference};
    use flightctl_types::metadata::ObjectMeta;
    use flightctl_types::{CertificateSigningRequest, Device, DeviceStatus};

    async fn setup_with_device(device_name: &str) -> (ManagementCertRenewal, ResourceRef) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let events = Arc::new(EventBus::default());
        let ca = Arc::new(CertificateAuthority::generate().unwrap());

        let device = Device {
            metadata: ObjectMeta::new("org1", device_name),
            spec: DeviceSpec {
                os_image: OciReference("quay.io/flightctl/os@sha256:abc".into()),
                config_providers: vec![],
                applications: vec![],
                resource_monitors: vec![],
                systemd_matches: vec![],
                console: ConsoleConfig::default(),
            },
            status: DeviceStatus::default(),
        };
        store.create_device(device).await.unwrap();

        let csr = CertificateSigningRequest {
            metadata: ObjectMeta::new("org1", "renewal-csr-1"),
            spec: CertificateSigningRequestSpec {
                signer_name: SignerName::DeviceManagementRenewal,
                request_pem: format!(
                    "-----BEGIN CERTIFICATE REQUEST-----\n{device_name}\n-----END CERTIFICATE REQUEST-----"
                ),
            },
            status: Default::default(),
        };
        store.create_csr(csr).await.unwrap();

        (ManagementCertRenewal::new(store, events, ca), ResourceRef::new("org1", "renewal-csr-1"))
    }

    #[tokio::test]
    async fn renewal_updates_device_cert_status() {
        let (renewal, csr_ref) = setup_with_device("dev-1").await;
        renewal.reconcile_renewal_csr(&csr_ref).await.unwrap();

        let device = renewal
            .store
            .get_device(&ResourceRef::new("org1", "dev-1"))
            .await
            .unwrap();
        assert!(device.status.management_cert_serial.is_some());
        assert!(device.status.management_cert_not_after.is_some());

        let csr = renewal.store.get_csr(&csr_ref).await.unwrap();
        assert!(csr.status.certificate_pem.is_some());
    }

    #[tokio::test]
    async fn renewal_for_unknown_device_is_rejected() {
        let (renewal, _) = setup_with_device("dev-1").await;
        let csr = CertificateSigningRequest {
            metadata: ObjectMeta::new("org1", "renewal-csr-2"),
            spec: CertificateSigningRequestSpec {
                signer_name: SignerName::DeviceManagementRenewal,
                request_pem: "-----BEGIN CERTIFICATE REQUEST-----\nghost-device\n-----END CERTIFICATE REQUEST-----".into(),
            },
            status: Default::default(),
        };
        renewal.store.create_csr(csr).await.unwrap();
        let reference = ResourceRef::new("org1", "renewal-csr-2");

        let err = renewal.reconcile_renewal_csr(&reference).await.unwrap_err();
        assert!(matches!(err, PkiError::CsrRejected(_)));
    }
}
