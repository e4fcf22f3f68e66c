use flightctl_types::ResourceVersion;
use thiserror::Error;

/// The rollout-engine slice of the error taxonomy in §7. `Transient`
/// carries the attempt count so the caller's retry/backoff loop can decide
/// when the budget is exhausted (§5 "retry with jitter, cap ~10
/// attempts").
#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("fleet {0} not found")]
    FleetNotFound(String),

    #[error(transparent)]
    Store(#[from] flightctl_store::StoreError),

    #[error(transparent)]
    Render(#[from] flightctl_render::render::RenderError),

    #[error("stale resourceVersion on {0}, retrying")]
    Conflict(ResourceVersion),

    #[error("retry budget exhausted after {attempts} attempts: {source}")]
    Transient {
        attempts: u32,
        #[source]
        source: Box<RolloutError>,
    },

    #[error("fatal integrity violation for device {device}: {detail}")]
    Fatal { device: String, detail: String },
}

pub type RolloutResult<T> = Result<T, RolloutError>;
