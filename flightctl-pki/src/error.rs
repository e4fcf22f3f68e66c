use thiserror::Error;

/// The PKI-slice of the error taxonomy in §7. A failed signing attempt is
/// deliberately NOT a `Denied` — the CSR controller writes a `Failed`
/// condition and leaves `Denied` for an operator (§4.5).
#[derive(Debug, Error)]
pub enum PkiError {
    #[error(transparent)]
    Store(#[from] flightctl_store::StoreError),

    #[error("csr rejected: {0}")]
    CsrRejected(String),

    #[error("certificate issuance failed: {0}")]
    IssuanceFailed(String),

    #[error("ca initialization failed: {0}")]
    CaInit(String),
}

pub type PkiResult<T> = Result<T, PkiError>;
