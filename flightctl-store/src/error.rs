use flightctl_types::ResourceVersion;
use thiserror::Error;

/// The Store-level slice of the error taxonomy in §7: `NotFound` and
/// `Conflict` are the two kinds a Store implementation can raise on its
/// own; `Transient`/`Fatal` are left to real backends (a Postgres pool
/// timeout, a disk full) that this in-memory reference implementation
/// never produces.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {org_id}/{name} not found")]
    NotFound {
        kind: &'static str,
        org_id: String,
        name: String,
    },

    #[error("{kind} {org_id}/{name} already exists")]
    AlreadyExists {
        kind: &'static str,
        org_id: String,
        name: String,
    },

    #[error("stale resourceVersion for {kind} {org_id}/{name}: expected {expected}, found {actual}")]
    Conflict {
        kind: &'static str,
        org_id: String,
        name: String,
        expected: ResourceVersion,
        actual: ResourceVersion,
    },

    #[error("{field} is immutable and cannot be changed after create")]
    ImmutableField { field: &'static str },
}

pub type StoreResult<T> = Result<T, StoreError>;
