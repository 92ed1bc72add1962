//! # HTTP API Errors
//!
//! Terminal outcomes of the request pipeline and their rendering. Engine
//! error text never reaches a response body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::Json;
use thiserror::Error;

use super::response::Response;
use super::validate::FieldError;

/// Result type for handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// HTTP API errors
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    // ==================
    // Client Errors (4xx)
    // ==================
    /// Path key missing
    #[error("key is empty")]
    EmptyKey,

    /// No request body
    #[error("empty request")]
    EmptyBody,

    /// Body is not the expected JSON
    #[error("failed to decode request")]
    Decode,

    /// Field constraints failed
    #[error("invalid request")]
    Validation(Vec<FieldError>),

    /// Key absent
    #[error("key not found")]
    NotFound,

    /// Create against an existing key
    #[error("duplicated key")]
    Duplicate,

    /// Body over the extractor limit
    #[error("request body too large")]
    PayloadTooLarge,

    /// No route for the path
    #[error("not found")]
    RouteNotFound,

    /// Route exists, method does not
    #[error("method not allowed")]
    MethodNotAllowed,

    // ==================
    // Server Errors (5xx)
    // ==================
    /// Generic failure; the message is fixed per operation
    #[error("{0}")]
    Internal(&'static str),
}

impl ApiError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::EmptyKey
            | ApiError::EmptyBody
            | ApiError::Decode
            | ApiError::Validation(_)
            | ApiError::Duplicate => StatusCode::BAD_REQUEST,

            ApiError::NotFound | ApiError::RouteNotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,

            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ApiError> for Response {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Validation(fields) => Response::validation(fields),
            other => Response::error(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> HttpResponse {
        let status = self.status_code();
        let body = Json(Response::from(self));
        (status, body).into_response()
    }
}
