//! Enrollment/CSR Controller (§4.5), management-certificate renewal
//! signer (§4.6), and sensitive-data hiding (§4.7).
//!
//! X.509 issuance uses `rcgen` with an Ed25519 CA key (§4.6 AMBIENT note)
//! — the same curve the teacher's challenge/JWT auth flow already
//! standardizes on via `ed25519-dalek`.

pub mod ca;
pub mod enrollment;
pub mod error;
pub mod renewal;
pub mod sensitive;

pub use ca::CertificateAuthority;
pub use enrollment::EnrollmentController;
pub use error::{PkiError, PkiResult};
pub use renewal::ManagementCertRenewal;
