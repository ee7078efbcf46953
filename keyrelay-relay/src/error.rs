//! Relay error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Relay server error types mapped to HTTP status codes.
#[derive(Debug)]
pub enum RelayError {
    Database(String),
    InvalidPath(String),
    RateLimited,
    BadRequest(String),
    Internal(String),
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Database(e) => write!(f, "Database error: {}", e),
            Self::InvalidPath(p) => write!(f, "Invalid path: {}", p),
            Self::RateLimited => write!(f, "Rate limited"),
            Self::BadRequest(e) => write!(f, "Bad request: {}", e),
            Self::Internal(e) => write!(f, "Internal error: {}", e),
        }
    }
}

impl std::error::Error for RelayError {}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            Self::InvalidPath(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            Self::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()),
            Self::BadRequest(e) => (StatusCode::BAD_REQUEST, e.clone()),
            Self::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!("{}", self);
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<rusqlite::Error> for RelayError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}
