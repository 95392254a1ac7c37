//! Error types and error handling for the application
//!
//! This module defines custom error types that can be converted to HTTP responses.
//! All errors implement `IntoResponse` to provide consistent error formatting.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level error types
///
/// All errors that can occur in the application are represented by this enum.
/// Each variant implements automatic conversion to HTTP responses via `IntoResponse`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Establishing or using the LLM connection failed
    #[error("LLM connection failure: {0}")]
    LlmConnection(String),

    /// No LLM response arrived within the configured budget
    #[error("LLM request timed out: {0}")]
    LlmTimeout(String),

    /// The LLM service explicitly signalled an error
    #[error("LLM error: {0}")]
    LlmService(String),

    /// The LLM response frame could not be interpreted
    #[error("Malformed LLM response: {0}")]
    LlmProtocol(String),

    /// Requested entity was not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request failed validation
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Error occurred during a database operation
    #[error("Database error: {0}")]
    Database(String),

    /// Internal server error (catch-all for unexpected errors)
    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether the dispatcher may retry after this failure.
    ///
    /// Connection loss and timeouts are transient; an explicit service error
    /// or a malformed frame propagates immediately without another attempt.
    pub fn is_transient_dispatch(&self) -> bool {
        matches!(self, AppError::LlmConnection(_) | AppError::LlmTimeout(_))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::LlmConnection(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::LlmTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, self.to_string()),
            AppError::LlmService(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::LlmProtocol(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
