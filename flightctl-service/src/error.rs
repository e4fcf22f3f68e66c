//! Error taxonomy → `Status` wire-shape mapping (§6, §7). Every handler
//! returns `Result<T, ApiError>`; `ApiError`'s `IntoResponse` impl is the
//! single place the taxonomy's kinds turn into HTTP status codes so no
//! handler has to pick one itself.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use flightctl_types::status::Status;
use flightctl_store::StoreError;
use flightctl_validate::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => ApiError::NotFound,
            StoreError::AlreadyExists { .. } => ApiError::Conflict(err.to_string()),
            StoreError::Conflict { .. } => ApiError::Conflict(err.to_string()),
            StoreError::ImmutableField { .. } => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl From<Vec<ValidationError>> for ApiError {
    fn from(errors: Vec<ValidationError>) -> Self {
        let joined = errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ");
        ApiError::Unprocessable(joined)
    }
}

impl From<flightctl_pki::PkiError> for ApiError {
    fn from(err: flightctl_pki::PkiError) -> Self {
        match err {
            flightctl_pki::PkiError::Store(e) => e.into(),
            flightctl_pki::PkiError::CsrRejected(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, reason, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BadRequest", msg.clone()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized", self.to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden", self.to_string()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "NotFound", self.to_string()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "Conflict", msg.clone()),
            ApiError::Unprocessable(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "ValidationFailed", msg.clone())
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError", msg.clone()),
        };
        let status = Status::failure(code.as_u16(), reason, message);
        (code, Json(status)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
