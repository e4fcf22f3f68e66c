//! Structured request tracing middleware, grounded in the teacher's
//! `api::request_tracing` — same per-request UUID, `X-Request-ID`
//! response header, and one JSON log line per completed request.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::time::Instant;
use uuid::Uuid;

const SKIP_LOG_PATHS: &[&str] = &["/healthz", "/readyz", "/metrics"];

pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

#[derive(Clone, Debug)]
pub struct RequestId(pub String);

pub async fn tracing_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let method = req.method().to_string();
    let path = req.uri().path().to_owned();
    let client_ip = addr.ip().to_string();

    req.extensions_mut().insert(RequestId(request_id.clone()));

    crate::metrics::HTTP_REQUESTS_IN_FLIGHT.inc();
    let start = Instant::now();
    let mut response = next.run(req).await;
    crate::metrics::HTTP_REQUESTS_IN_FLIGHT.dec();
    let duration_ms = start.elapsed().as_millis() as u64;

    if let Ok(val) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(X_REQUEST_ID.clone(), val);
    }

    if SKIP_LOG_PATHS.iter().any(|p| path.starts_with(p)) {
        return response;
    }

    let status = response.status().as_u16();
    crate::metrics::HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status.to_string()])
        .inc();
    crate::metrics::HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[&method, &path])
        .observe(start.elapsed().as_secs_f64());

    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = status,
        duration_ms = duration_ms,
        client_ip = %client_ip,
        "request"
    );

    response
}

/// Call once at process startup, before anything else touches `tracing`.
pub fn init_json_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flightctl=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}
