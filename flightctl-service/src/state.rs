//! Shared application state (§6 AMBIENT, grounded in the teacher's
//! `api::state::AppState`): a cheap-to-clone handle to everything a
//! handler needs, carried through axum's `State` extractor.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use flightctl_events::EventBus;
use flightctl_pki::CertificateAuthority;
use flightctl_store::Store;
use prometheus::Registry;

use crate::auth::AuthManager;
use crate::metrics;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub events: Arc<EventBus>,
    pub ca: Arc<CertificateAuthority>,
    pub auth: Arc<AuthManager>,
    pub registry: Registry,
    pub started_at: Instant,
    pub is_shutting_down: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        events: Arc<EventBus>,
        ca: Arc<CertificateAuthority>,
        auth: Arc<AuthManager>,
    ) -> Self {
        let registry = Registry::new();
        if let Err(err) = metrics::register_all(&registry) {
            tracing::error!(error = %err, "failed to register prometheus metrics");
        }
        Self {
            store,
            events,
            ca,
            auth,
            registry,
            started_at: Instant::now(),
            is_shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }
}
