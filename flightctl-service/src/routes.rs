//! Router assembly (§6), grounded in the teacher's `main.rs`
//! `Router::new().merge(routes::...)` pattern: one function per resource
//! group, merged into a single router carrying `AppState`.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::auth_middleware::require_bearer_auth;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;

fn fleet_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/fleets", get(handlers::list_fleets).post(handlers::create_fleet))
        .route(
            "/api/v1/fleets/:name",
            get(handlers::get_fleet)
                .put(handlers::replace_fleet)
                .patch(handlers::patch_fleet)
                .delete(handlers::delete_fleet),
        )
        .route("/api/v1/fleets/:name/approve", post(handlers::approve_fleet_rollout))
        .route_layer(middleware::from_fn_with_state(state, require_bearer_auth))
}

fn device_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/devices", get(handlers::list_devices).post(handlers::create_device))
        .route("/api/v1/devices/:name", get(handlers::get_device).patch(handlers::patch_device))
        .route_layer(middleware::from_fn_with_state(state, require_bearer_auth))
}

fn enrollment_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/enrollmentrequests", post(handlers::create_enrollment_request))
        .route("/api/v1/enrollmentrequests/:name", get(handlers::get_enrollment_request))
        .route_layer(middleware::from_fn_with_state(state, require_bearer_auth))
}

fn csr_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/certificatesigningrequests", get(handlers::list_csrs).post(handlers::create_csr))
        .route(
            "/api/v1/certificatesigningrequests/:name",
            get(handlers::get_csr).put(handlers::replace_csr),
        )
        .route_layer(middleware::from_fn_with_state(state, require_bearer_auth))
}

fn auth_provider_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/authproviders",
            get(handlers::list_auth_providers).post(handlers::create_auth_provider),
        )
        .route("/api/v1/authproviders/:name", get(handlers::get_auth_provider))
        .route_layer(middleware::from_fn_with_state(state, require_bearer_auth))
}

fn event_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/events", get(handlers::list_events))
        .route_layer(middleware::from_fn_with_state(state, require_bearer_auth))
}

fn unauthenticated_routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .route("/metrics", get(metrics_handler))
}

/// Build the full router. `state` is threaded twice: once into each
/// `route_layer`'s auth middleware (which needs it before axum's `State`
/// extractor has a chance to run) and once as the router's own state via
/// `.with_state` at the call site.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(unauthenticated_routes())
        .merge(fleet_routes(state.clone()))
        .merge(device_routes(state.clone()))
        .merge(enrollment_routes(state.clone()))
        .merge(csr_routes(state.clone()))
        .merge(auth_provider_routes(state.clone()))
        .merge(event_routes(state.clone()))
        .with_state(state)
}
