use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metadata::ObjectMeta;

/// The two signer purposes named in §4.5/§4.6. Embedded in the cert's
/// signer-name extension so downstream callers can tell initial issuance
/// from a renewal by inspecting the certificate alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignerName {
    DeviceEnrollment,
    DeviceManagementRenewal,
}

impl SignerName {
    pub fn as_str(self) -> &'static str {
        match self {
            SignerName::DeviceEnrollment => "flightctl.io/device-enrollment",
            SignerName::DeviceManagementRenewal => "flightctl.io/device-management-renewal",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateSigningRequestSpec {
    pub signer_name: SignerName,
    /// PEM-encoded CSR bytes. Immutable after create (§3, §4.5).
    pub request_pem: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CsrConditions {
    pub approved: bool,
    pub denied: bool,
    pub failed: bool,
    pub failure_message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertificateSigningRequestStatus {
    pub certificate_pem: Option<String>,
    #[serde(default)]
    pub conditions: CsrConditions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateSigningRequest {
    pub metadata: ObjectMeta,
    pub spec: CertificateSigningRequestSpec,
    #[serde(default)]
    pub status: CertificateSigningRequestStatus,
}

impl crate::metadata::WithMeta for CertificateSigningRequest {
    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl crate::metadata::WithMeta for EnrollmentRequest {
    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl CertificateSigningRequest {
    /// Re-stamp the existing approval/denial conditions onto an incoming
    /// replacement so a PUT/PATCH can never clear them (§4.5, §8). Once
    /// `Denied` has been set, no replace may grant `Approved`, even if the
    /// replacement object tries to — this is what keeps a denied-after-
    /// failed-signing CSR denied forever (§8 scenario 5).
    pub fn preserve_conditions_across_replace(&self, incoming: &mut CertificateSigningRequest) {
        incoming.status.conditions.approved =
            self.status.conditions.approved || incoming.status.conditions.approved;
        incoming.status.conditions.denied =
            self.status.conditions.denied || incoming.status.conditions.denied;
        if self.status.conditions.denied {
            incoming.status.conditions.approved = false;
        }
        if incoming.status.certificate_pem.is_none() {
            incoming.status.certificate_pem = self.status.certificate_pem.clone();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentRequestSpec {
    pub csr_pem: String,
    pub device_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrollmentRequestApproval {
    pub approved: bool,
    #[serde(default)]
    pub labels: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrollmentRequestStatus {
    pub certificate_pem: Option<String>,
    pub approval: Option<EnrollmentRequestApproval>,
    pub denied: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentRequest {
    pub metadata: ObjectMeta,
    pub spec: EnrollmentRequestSpec,
    #[serde(default)]
    pub status: EnrollmentRequestStatus,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_csr() -> CertificateSigningRequest {
        CertificateSigningRequest {
            metadata: ObjectMeta::new("org1", "csr-1"),
            spec: CertificateSigningRequestSpec {
                signer_name: SignerName::DeviceEnrollment,
                request_pem: "-----BEGIN CERTIFICATE REQUEST-----".into(),
            },
            status: CertificateSigningRequestStatus::default(),
        }
    }

    #[test]
    fn denied_condition_survives_replace_with_clear_attempt() {
        // Operator already denied and removed Approved out of band.
        let mut existing = base_csr();
        existing.status.conditions.approved = false;
        existing.status.conditions.denied = true;

        let mut incoming = base_csr();
        // A later metadata-only PUT that (incorrectly) tries to restore Approved.
        incoming.status.conditions.denied = false;
        incoming.status.conditions.approved = true;

        existing.preserve_conditions_across_replace(&mut incoming);

        assert!(incoming.status.conditions.denied, "Denied must stick");
        assert!(
            !incoming.status.conditions.approved,
            "Approved must never be restored once Denied is set"
        );
    }
}
