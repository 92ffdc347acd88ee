//! Custom error types for the API service

use access::AccessError;
use axum::{
    Json,
    extract::rejection::{BytesRejection, JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Custom error type for the API service
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing or invalid bearer token
    #[error("Unauthorized")]
    Unauthorized,

    /// Malformed path, query or body
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Failure reported by an access-code or payment operation
    #[error(transparent)]
    Access(#[from] AccessError),
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid_value"),
            ApiError::Access(e) => {
                let status = match e {
                    AccessError::NotFound { .. } => StatusCode::NOT_FOUND,
                    AccessError::InvalidValue(_) => StatusCode::BAD_REQUEST,
                    AccessError::Unauthorized(_) => StatusCode::FORBIDDEN,
                    AccessError::Terminal { .. }
                    | AccessError::InvalidTransition { .. }
                    | AccessError::NotActivated
                    | AccessError::NotPending { .. } => StatusCode::CONFLICT,
                    AccessError::GenerationExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
                    AccessError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.kind())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        let error_message = match &self {
            ApiError::Access(AccessError::Store(e)) => {
                error!("Storage failure: {}", e);
                "Internal server error".to_string()
            }
            ApiError::Access(AccessError::GenerationExhausted { .. }) => {
                error!("{}", self);
                self.to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": error_message,
            "kind": kind,
        }));

        (status, body).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;
