//! Error types for the threat-modeling core
//!
//! Provides unified error handling using thiserror. `ApiError` is the only
//! type that reaches HTTP callers; cache failures stay inside the cache layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Api Error Enum ==
/// Caller-facing error taxonomy. Every variant maps to one stable HTTP status.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Entity or metadata triple absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate key or unique-constraint violation
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Malformed key, oversized batch, bad patch operation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Privileged field touched without the Owner role
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Store or cache I/O failure not attributable to caller input
    #[error("Server error: {0}")]
    ServerError(String),
}

impl ApiError {
    /// Returns the HTTP status this error is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match self {
            ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::InvalidInput(msg)
            | ApiError::Forbidden(msg)
            | ApiError::ServerError(msg) => msg,
        };

        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

// == Cache Error Enum ==
/// Failures inside the cache layer. Logged and swallowed by callers.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The key-value client failed (network, protocol, backend)
    #[error("cache client error: {0}")]
    Client(String),

    /// A value could not be encoded or decoded
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        ApiError::ServerError(err.to_string())
    }
}

// == Result Type Aliases ==
/// Convenience Result type for caller-facing operations.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Result type for cache-layer operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;
