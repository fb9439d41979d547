//! Error types for the workspace proxy

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Result type for workspace proxy operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for workspace proxy operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing, malformed or invalid credential
    #[error("invalid bearer token: {0}")]
    Unauthorized(String),

    /// Caller may not access the requested workspace or namespace
    #[error("{0}")]
    Forbidden(String),

    /// Malformed request path
    #[error("{0}")]
    BadRequest(String),

    /// Requested object does not exist or is not visible to the caller
    #[error("{0}")]
    NotFound(String),

    /// Upstream member cluster could not be reached
    #[error("proxy error: {0}")]
    Proxy(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Lookup or resolution failure not attributable to the caller
    #[error("{0}")]
    Internal(String),
}

impl Error {
    /// HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Proxy(_) => StatusCode::BAD_GATEWAY,
            Error::Config(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> &'static str {
        match self {
            Error::Unauthorized(_) => "authentication failed",
            Error::Forbidden(_) => "authorization failed",
            Error::BadRequest(_) => "invalid request",
            Error::NotFound(_) => "not found",
            Error::Proxy(_) => "upstream unavailable",
            Error::Config(_) | Error::Internal(_) => "internal error",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = serde_json::json!({
            "status": status.canonical_reason().unwrap_or("Unknown"),
            "code": status.as_u16(),
            "message": self.to_string(),
            "details": self.details(),
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Proxy(e.to_string())
    }
}
