//! Caller authentication
//!
//! Pulls the bearer credential out of the request (the `Authorization` header,
//! or the WebSocket sub-protocol for upgrade requests) and turns it into an
//! [`Identity`] through the injected [`TokenParser`].

use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::websocket::{extract_protocol_token, is_websocket_request};

/// Identity the public viewer feature impersonates for anonymous browsing
pub const PUBLIC_VIEWER_USERNAME: &str = "kubesaw-authenticated";

/// Claims the gateway needs from a validated token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    /// `sub` claim
    pub subject: String,
    /// `preferred_username` claim
    pub preferred_username: String,
    /// `email` claim, when present
    pub email: Option<String>,
}

/// Token validation failures
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Token could not be decoded or failed signature/time validation
    #[error("token is invalid: {0}")]
    Invalid(String),

    /// Token header names no usable signing key
    #[error("no matching key: {0}")]
    UnknownKey(String),

    /// Token is valid but lacks a required claim
    #[error("token does not comply to expected claims: {0}")]
    MissingClaim(&'static str),
}

/// Validates raw bearer tokens
///
/// Implementations must not perform network I/O per call; signing keys are
/// fetched ahead of time.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenParser: Send + Sync {
    /// Validate `token` and return its claims
    async fn parse(&self, token: &str) -> std::result::Result<TokenClaims, TokenError>;
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable subject identifier, preferred for lookups
    pub user_id: String,
    /// Username reported by the identity provider
    pub username: String,
    /// Email address, used for the banned-user check
    pub email: Option<String>,
}

impl Identity {
    /// The synthetic identity shared by all public viewers
    pub fn public_viewer() -> Self {
        Self {
            user_id: String::new(),
            username: PUBLIC_VIEWER_USERNAME.to_string(),
            email: None,
        }
    }

    /// Whether this is the public viewer identity
    pub fn is_public_viewer(&self) -> bool {
        self.username == PUBLIC_VIEWER_USERNAME
    }
}

impl From<TokenClaims> for Identity {
    fn from(claims: TokenClaims) -> Self {
        Self {
            user_id: claims.subject,
            username: claims.preferred_username,
            email: claims.email,
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header
///
/// Any other shape (absent header, repeated header, other scheme, empty or
/// whitespace-containing token) is rejected.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str> {
    let mut values = headers.get_all(AUTHORIZATION).iter();
    let value = values
        .next()
        .ok_or_else(|| Error::Unauthorized("no token found: a Bearer token is expected".into()))?;
    if values.next().is_some() {
        return Err(Error::Unauthorized(
            "multiple Authorization headers: a single Bearer token is expected".into(),
        ));
    }

    value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty() && !token.contains(char::is_whitespace))
        .ok_or_else(|| Error::Unauthorized("a Bearer token is expected".into()))
}

/// Authenticate the caller of a request
pub async fn authenticate(parser: &dyn TokenParser, headers: &HeaderMap) -> Result<Identity> {
    let token = if is_websocket_request(headers) {
        extract_protocol_token(headers)?
    } else {
        extract_bearer_token(headers)?.to_string()
    };

    let claims = parser.parse(&token).await.map_err(|e| {
        warn!(error = %e, "Token validation failed");
        Error::Unauthorized("unable to extract userID from token".into())
    })?;

    debug!(user_id = %claims.subject, username = %claims.preferred_username, "Authenticated caller");

    Ok(claims.into())
}
