//! Escrow server error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Message returned for every failure whose detail must stay server-side.
pub const GENERIC_SERVER_ERROR: &str = "Server error";

/// Escrow server error types mapped to HTTP status codes.
#[derive(Debug, Error)]
pub enum EscrowError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Input rejected before the store is touched (out-of-enum state).
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Payload too large")]
    PayloadTooLarge,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EscrowError {
    pub fn key_not_found() -> Self {
        Self::NotFound("Key not found".to_string())
    }

    pub fn invalid_state() -> Self {
        Self::Validation("Invalid state value".to_string())
    }
}

impl IntoResponse for EscrowError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Validation(e) | Self::BadRequest(e) => (StatusCode::BAD_REQUEST, e.clone()),
            Self::NotFound(e) => (StatusCode::NOT_FOUND, e.clone()),
            Self::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Payload too large".to_string(),
            ),
            Self::Database(_) | Self::Internal(_) => {
                tracing::error!(error = %self, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    GENERIC_SERVER_ERROR.to_string(),
                )
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<rusqlite::Error> for EscrowError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}
