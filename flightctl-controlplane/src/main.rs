//! Long-running control-plane process: hosts `flightctl-service`'s router
//! and drives the `Scheduler`'s background reconcile loop in the same
//! process, grounded in the teacher's `main.rs` startup/shutdown sequence
//! (fail-fast JWT check, structured JSON tracing, ctrl_c/SIGTERM select,
//! in-flight-drain loop with a timeout).

mod config;
mod scheduler;

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

use config::Config;
use scheduler::Scheduler;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    request_tracing::init_json_tracing();

    let config = Config::from_env();

    let auth = match AuthManager::from_env() {
        Ok(auth) => auth,
        Err(err) => {
            tracing::error!(
                error = %err,
                "JWT authentication configuration is invalid. Set JWT_SECRET to a strong value with at least {} characters.",
                flightctl_service::auth::MIN_JWT_SECRET_LEN,
            );
            return Err(anyhow::anyhow!("invalid JWT configuration: {err}"));
        }
    };

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let events = Arc::new(EventBus::new(config.event_bus_capacity));
    let ca = Arc::new(CertificateAuthority::generate()?);
    let state = AppState::new(store.clone(), events.clone(), ca.clone(), Arc::new(auth));
    let is_shutting_down = state.is_shutting_down.clone();

    let app = flightctl_service::build_router(state)
        .layer(axum::middleware::from_fn(request_tracing::tracing_middleware));

    let scheduler = Arc::new(Scheduler::new(store, events, ca));
    let (scheduler_shutdown_tx, scheduler_shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let scheduler_handle = tokio::spawn({
        let scheduler = scheduler.clone();
        let reconcile_interval = config.reconcile_interval;
        let sweep_interval = config.sweep_interval;
        async move {
            scheduler
                .run(reconcile_interval, sweep_interval, async {
                    let _ = scheduler_shutdown_rx.await;
                })
                .await;
        }
    });

    tracing::info!(bind_addr = %config.bind_addr, "flightctl-controlplane listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);

    let server = axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>())
        .with_graceful_shutdown(async move {
            wait_for_termination_signal().await;
            tracing::info!("SIGTERM/SIGINT received, failing health checks and stopping new requests");
            let _ = shutdown_tx.send(()).await;
        });

    let server_task = tokio::spawn(async move {
        if let Err(err) = server.await {
            tracing::error!(error = %err, "server error");
        }
    });

    if shutdown_rx.recv().await.is_some() {
        is_shutting_down.store(true, Ordering::SeqCst);
        drain_in_flight(config.shutdown_timeout).await;

        let _ = scheduler_shutdown_tx.send(());
        if let Err(err) = scheduler_handle.await {
            tracing::error!(error = %err, "scheduler task panicked during shutdown");
        }
    }

    server_task.await.ok();
    tracing::info!("shutdown complete");
    Ok(())
}

async fn wait_for_termination_signal() {
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
}

/// Polls the readiness-relevant in-flight counter until it drains to zero
/// or `timeout` elapses, same shape as the teacher's shutdown loop.
async fn drain_in_flight(timeout: std::time::Duration) {
    let start = std::time::Instant::now();
    loop {
        let in_flight = flightctl_service::metrics::HTTP_REQUESTS_IN_FLIGHT.get();
        if in_flight == 0 {
            tracing::info!(elapsed_ms = start.elapsed().as_millis() as u64, "all in-flight requests completed");
            return;
        }
        if start.elapsed() > timeout {
            tracing::error!(in_flight, timeout_secs = timeout.as_secs(), "graceful shutdown timeout reached with requests still in-flight");
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
}
