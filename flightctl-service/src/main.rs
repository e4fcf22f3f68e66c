//! Standalone REST-surface binary (§6): wires an in-memory `Store`, a
//! fresh reference CA, and this crate's router, with no background
//! reconcile loops of its own — those run in `flightctl-controlplane`,
//! which hosts this same router alongside them. This binary exists so
//! the REST boundary can be exercised and tested in isolation.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Result;
use dotenv::dotenv;
use flightctl_events::EventBus;
use flightctl_pki::CertificateAuthority;
use flightctl_service::auth::AuthManager;
use flightctl_service::request_tracing;
use flightctl_service::AppState;
use flightctl_store::{MemoryStore, Store};
use tokio::signal;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    request_tracing::init_json_tracing();

    let auth = match AuthManager::from_env() {
        Ok(auth) => auth,
        Err(err) => {
            tracing::error!(error = %err, "JWT authentication configuration is invalid");
            return Err(anyhow::anyhow!("invalid JWT configuration: {err}"));
        }
    };

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let events = Arc::new(EventBus::default());
    let ca = Arc::new(CertificateAuthority::generate()?);
    let state = AppState::new(store, events, ca, Arc::new(auth));
    let is_shutting_down = state.is_shutting_down.clone();

    let app = flightctl_service::build_router(state)
        .layer(axum::middleware::from_fn(request_tracing::tracing_middleware));

    let addr = SocketAddr::from(([0, 0, 0, 0], 8080));
    tracing::info!(%addr, "flightctl-service listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(is_shutting_down))
        .await?;

    Ok(())
}

async fn shutdown_signal(is_shutting_down: Arc<std::sync::atomic::AtomicBool>) {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, draining in-flight requests");
    is_shutting_down.store(true, Ordering::SeqCst);
}
