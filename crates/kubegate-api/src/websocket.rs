//! Bearer tokens carried in WebSocket sub-protocols
//!
//! Browsers cannot set an `Authorization` header on a WebSocket handshake, so
//! Kubernetes clients smuggle the token in `Sec-WebSocket-Protocol` as a
//! `base64url.bearer.authorization.k8s.io.<token>` entry.

use axum::http::header::{CONNECTION, SEC_WEBSOCKET_PROTOCOL, UPGRADE};
use axum::http::{HeaderMap, HeaderValue};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::error::Error;

/// Sub-protocol prefix marking a bearer token entry
pub const BEARER_PROTOCOL_PREFIX: &str = "base64url.bearer.authorization.k8s.io.";

/// Whether the request asks for a WebSocket upgrade
pub fn is_websocket_request(headers: &HeaderMap) -> bool {
    header_contains_token(headers, CONNECTION.as_str(), "upgrade")
        && header_contains_token(headers, UPGRADE.as_str(), "websocket")
}

fn header_contains_token(headers: &HeaderMap, name: &str, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

fn protocol_entries(headers: &HeaderMap) -> impl Iterator<Item = &str> {
    headers
        .get_all(SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
}

/// Extract the bearer token from the `Sec-WebSocket-Protocol` header
///
/// At most one bearer entry may be present. The entry is unpadded base64url
/// and must decode to UTF-8 text.
pub fn extract_protocol_token(headers: &HeaderMap) -> Result<String, Error> {
    let mut encoded: Option<&str> = None;
    for entry in protocol_entries(headers) {
        if let Some(token) = entry.strip_prefix(BEARER_PROTOCOL_PREFIX) {
            if encoded.is_some() {
                return Err(Error::Unauthorized(
                    "multiple base64.bearer.authorization tokens specified".into(),
                ));
            }
            encoded = Some(token);
        }
    }

    let Some(encoded) = encoded else {
        return Err(Error::Unauthorized(
            "no base64.bearer.authorization token found".into(),
        ));
    };

    let decoded = URL_SAFE_NO_PAD.decode(encoded).map_err(|_| {
        Error::Unauthorized("invalid base64.bearer.authorization token encoding".into())
    })?;

    let token = String::from_utf8(decoded).map_err(|_| {
        Error::Unauthorized(
            "invalid base64.bearer.authorization token: contains non UTF-8-encoded runes".into(),
        )
    })?;

    if token.is_empty() {
        return Err(Error::Unauthorized(
            "no base64.bearer.authorization token found".into(),
        ));
    }

    Ok(token)
}

/// Replace the bearer entry of `Sec-WebSocket-Protocol` with `token`
///
/// Every other entry is kept in its original order. The result is written back
/// as a single header value.
pub fn replace_protocol_token(headers: &mut HeaderMap, token: &str) -> Result<(), Error> {
    let replacement = format!("{}{}", BEARER_PROTOCOL_PREFIX, URL_SAFE_NO_PAD.encode(token));

    let entries: Vec<String> = protocol_entries(headers)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            if entry.starts_with(BEARER_PROTOCOL_PREFIX) {
                replacement.clone()
            } else {
                entry.to_string()
            }
        })
        .collect();

    let value = HeaderValue::from_str(&entries.join(","))
        .map_err(|e| Error::Internal(format!("invalid websocket protocol header: {}", e)))?;
    headers.insert(SEC_WEBSOCKET_PROTOCOL, value);
    Ok(())
}
