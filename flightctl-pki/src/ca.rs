//! X.509 issuance (§4.5, §4.6's AMBIENT note): `rcgen` builds and signs
//! certificates, keyed by a single in-process CA whose signing key is
//! Ed25519 (`rcgen`'s native `PKCS_ED25519` algorithm) — the same curve
//! the teacher already standardizes on for its challenge/JWT auth flow
//! (`api::auth`'s `ed25519-dalek` usage), so the CA identity and the
//! agent-challenge identity share one asymmetric-crypto choice across the
//! repository even though the two live in different crates.
//!
//! The submitted CSR PEM (`EnrollmentRequestSpec::csr_pem` /
//! `CertificateSigningRequestSpec::request_pem`) is treated as an opaque
//! blob: this reference CA never re-keys a client-submitted public key,
//! it issues a fresh leaf keypair of its own and signs it, the way a
//! short-lived CI/test CA typically does. Parsing/honoring the
//! client-submitted key is a real-world concern the SQL/driver-layer
//! Non-goal (§1) already puts out of scope for this repository.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use flightctl_types::csr::SignerName;
use rcgen::{
    BasicConstraints, CertificateParams, CustomExtension, DistinguishedName, DnType, IsCa,
    Issuer, KeyPair,
};

use crate::error::{PkiError, PkiResult};

/// Private-use OID arbitrarily rooted under an unassigned enterprise
/// number; not IANA-registered. Only ever read back by this same CA's own
/// callers, never by a third party, so collision with a real assignment
/// is not a concern.
const SIGNER_NAME_OID: &[u64] = &[1, 3, 6, 1, 4, 1, 99999, 1, 1];
const FINGERPRINT_OID: &[u64] = &[1, 3, 6, 1, 4, 1, 99999, 1, 2];

/// Default validity window this reference CA tracks for its own
/// bookkeeping (`managementCertNotAfter` etc). Independent of whatever
/// default `rcgen::CertificateParams` stamps into the X.509 `notAfter`
/// field itself.
const DEFAULT_VALIDITY_DAYS: i64 = 365;

pub struct IssuedCertificate {
    pub certificate_pem: String,
    pub serial: String,
    pub not_after: DateTime<Utc>,
}

/// The enrollment + management-renewal signing authority. One instance is
/// shared (behind an `Arc`) by the Enrollment Controller and the renewal
/// signer — both issuance paths differ only in `SignerName` and subject.
pub struct CertificateAuthority {
    ca_params: CertificateParams,
    ca_key: KeyPair,
    ca_cert_pem: String,
    serial_counter: AtomicU64,
}

impl CertificateAuthority {
    /// Generate a fresh self-signed root. A real deployment would load this
    /// from a mounted secret instead; key material provisioning is outside
    /// this repository's scope the same way the SQL schema is (§1).
    pub fn generate() -> PkiResult<Self> {
        let ca_key = KeyPair::generate_for(&rcgen::PKCS_ED25519)
            .map_err(|e| PkiError::CaInit(e.to_string()))?;

        let mut ca_params = CertificateParams::new(Vec::<String>::new())
            .map_err(|e| PkiError::CaInit(e.to_string()))?;
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params.distinguished_name = root_dn("FlightCtl Reference CA");

        let ca_cert = ca_params
            .clone()
            .self_signed(&ca_key)
            .map_err(|e| PkiError::CaInit(e.to_string()))?;
        let ca_cert_pem = ca_cert.pem();

        Ok(Self {
            ca_params,
            ca_key,
            ca_cert_pem,
            serial_counter: AtomicU64::new(1),
        })
    }

    pub fn ca_certificate_pem(&self) -> &str {
        &self.ca_cert_pem
    }

    /// Issue and sign a leaf certificate whose CN is `cn`, carrying
    /// `signer_name` (and, for management renewals, the device fingerprint)
    /// in private custom extensions so a downstream caller can tell
    /// issuance purpose apart by inspecting the certificate alone (§4.6).
    pub fn issue(
        &self,
        cn: &str,
        signer_name: SignerName,
        fingerprint: Option<&str>,
    ) -> PkiResult<IssuedCertificate> {
        let leaf_key = KeyPair::generate_for(&rcgen::PKCS_ED25519)
            .map_err(|e| PkiError::IssuanceFailed(e.to_string()))?;

        let mut leaf_params = CertificateParams::new(Vec::<String>::new())
            .map_err(|e| PkiError::IssuanceFailed(e.to_string()))?;
        leaf_params.is_ca = IsCa::NoCa;
        leaf_params.distinguished_name = root_dn(cn);
        leaf_params
            .custom_extensions
            .push(CustomExtension::from_oid_content(
                SIGNER_NAME_OID,
                signer_name.as_str().as_bytes().to_vec(),
            ));
        if let Some(fingerprint) = fingerprint {
            leaf_params
                .custom_extensions
                .push(CustomExtension::from_oid_content(
                    FINGERPRINT_OID,
                    fingerprint.as_bytes().to_vec(),
                ));
        }

        let issuer = Issuer::new(self.ca_params.clone(), &self.ca_key);
        let leaf_cert = leaf_params
            .signed_by(&leaf_key, &issuer)
            .map_err(|e| PkiError::IssuanceFailed(e.to_string()))?;

        let serial_num = self.serial_counter.fetch_add(1, Ordering::SeqCst);
        let serial = format!("{serial_num:016x}");
        let not_after = Utc::now() + ChronoDuration::days(DEFAULT_VALIDITY_DAYS);

        Ok(IssuedCertificate {
            certificate_pem: leaf_cert.pem(),
            serial,
            not_after,
        })
    }
}

fn root_dn(cn: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, cn);
    dn
}

/// Device fingerprint used as the CN suffix for management-renewal certs
/// (§4.6: "the fingerprint MUST equal the CN suffix after the last `-`
/// character"). Derived deterministically from the device name so the
/// same device always renews to the same fingerprint.
pub fn device_fingerprint(device_name: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(device_name.as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ca_issues_a_pem_encoded_certificate() {
        let ca = CertificateAuthority::generate().unwrap();
        let issued = ca.issue("dev-1", SignerName::DeviceEnrollment, None).unwrap();
        assert!(issued.certificate_pem.starts_with("-----BEGIN CERTIFICATE-----"));
    }

    #[test]
    fn renewal_cn_suffix_matches_fingerprint() {
        let fingerprint = device_fingerprint("dev-1");
        let cn = format!("dev-1-{fingerprint}");
        let suffix = cn.rsplit('-').next().unwrap();
        assert_eq!(suffix, fingerprint);
    }
}
