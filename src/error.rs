/// Unified error types for the operator publishing service
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the publishing pipeline
#[derive(Error, Debug)]
pub enum PublishError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Validation errors (missing required fields, bad input)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Static content generation failed before any commit
    #[error("Static content generation failed: {0}")]
    Generation(String),

    /// Snapshot or primary-record commit failed mid-publish
    #[error("Commit failed: {0}")]
    Commit(String),

    /// Publish rejected because one is already in flight or the retry
    /// budget is exhausted
    #[error("Publish rejected: {0}")]
    Concurrency(String),

    /// The wrapped operation exceeded the publishing timeout
    #[error("Operation timed out after {0}s")]
    Timeout(u64),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert PublishError to HTTP response
impl IntoResponse for PublishError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            PublishError::Validation(_) => {
                (StatusCode::BAD_REQUEST, "InvalidRequest", self.to_string())
            }
            PublishError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound", self.to_string()),
            PublishError::Concurrency(_) => (StatusCode::CONFLICT, "Conflict", self.to_string()),
            PublishError::Timeout(_) => {
                (StatusCode::GATEWAY_TIMEOUT, "Timeout", self.to_string())
            }
            PublishError::Generation(_) | PublishError::Commit(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "PublishFailed",
                self.to_string(),
            ),
            PublishError::Database(_) | PublishError::Internal(_) | PublishError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for publishing operations
pub type PublishResult<T> = Result<T, PublishError>;
