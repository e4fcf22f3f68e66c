//! Thin REST surface boundary (§6): turns HTTP into calls against
//! `flightctl-store`/`flightctl-validate`/`flightctl-pki`. Exposed as a
//! library so `flightctl-controlplane` can host this router alongside its
//! own background reconcile loops in one process.

pub mod auth;
pub mod auth_middleware;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod patch;
pub mod request_tracing;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::build_router;
pub use state::AppState;
