//! Prometheus registry and `/metrics` handler (§6 AMBIENT), grounded in
//! the teacher's `metrics.rs`/`metrics_handler.rs`: same
//! registry-as-shared-state pattern, rebuilt here for the
//! rollout-specific counters and gauges this domain needs instead of
//! the teacher's indexer/RPC metrics.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use once_cell::sync::Lazy;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};

use crate::state::AppState;

pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("flightctl_http_requests_total", "Total HTTP requests handled"),
        &["method", "path", "status"],
    )
    .expect("metric options are valid")
});

pub static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "flightctl_http_request_duration_seconds",
            "HTTP request latency in seconds",
        ),
        &["method", "path"],
    )
    .expect("metric options are valid")
});

pub static ROLLOUT_BATCH_COMPLETIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "flightctl_rollout_batch_completions_total",
            "Rollout batches evaluated, by outcome",
        ),
        &["org_id", "outcome"],
    )
    .expect("metric options are valid")
});

pub static FLEET_DEVICES_UP_TO_DATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "flightctl_fleet_devices_up_to_date",
            "Devices in a fleet reporting the fleet's current rendered version",
        ),
        &["org_id", "fleet"],
    )
    .expect("metric options are valid")
});

/// Tracks in-flight HTTP requests so shutdown can drain to zero before
/// exiting, same role as the teacher's `HTTP_IN_FLIGHT`.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("flightctl_http_requests_in_flight", "HTTP requests currently being handled")
        .expect("metric options are valid")
});

pub static ENROLLMENT_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "flightctl_enrollment_requests_total",
            "Enrollment requests processed, by outcome",
        ),
        &["outcome"],
    )
    .expect("metric options are valid")
});

/// Registers every collector once per process. Called from
/// `AppState::new`; a registration failure is logged but never panics
/// the process, since a missing gauge is degraded observability, not a
/// correctness problem.
pub fn register_all(registry: &Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(HTTP_REQUESTS_TOTAL.clone()))?;
    registry.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()))?;
    registry.register(Box::new(ROLLOUT_BATCH_COMPLETIONS_TOTAL.clone()))?;
    registry.register(Box::new(FLEET_DEVICES_UP_TO_DATE.clone()))?;
    registry.register(Box::new(ENROLLMENT_REQUESTS_TOTAL.clone()))?;
    registry.register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))?;
    Ok(())
}

pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let metric_families = state.registry.gather();
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&metric_families) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            body,
        )
            .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
