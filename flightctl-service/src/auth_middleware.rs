//! Bearer-auth gate for mutation endpoints, grounded in the teacher's
//! `api::auth_middleware::auth_middleware` — same header parsing and
//! "unauthorized reason as a structured JSON body" shape, re-pointed at
//! this crate's `AuthClaims`/`Status` wire types (§6, §7).

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::error::ApiError;
use crate::state::AppState;

/// Identity attached to request extensions once a bearer token validates,
/// so handlers can read the caller's `orgId` without re-parsing headers.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub subject: String,
    pub org_id: String,
}

pub async fn require_bearer_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    let Some(token) = token else {
        return Err(ApiError::Unauthorized);
    };

    let claims = state.auth.validate(token).map_err(|_| ApiError::Unauthorized)?;
    request.extensions_mut().insert(AuthContext {
        subject: claims.sub,
        org_id: claims.org_id,
    });

    Ok(next.run(request).await)
}
