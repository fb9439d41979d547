//! CORS handling
//!
//! Preflight requests are answered by the gateway itself and never reach the
//! routing pipeline. Actual responses get their CORS headers overwritten so
//! backends need not be CORS-aware.

use axum::body::Body;
use axum::extract::Request;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS, ACCESS_CONTROL_REQUEST_HEADERS,
    ACCESS_CONTROL_REQUEST_METHOD, ORIGIN, VARY,
};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, info};

/// Methods a preflight may ask for
pub const ALLOWED_METHODS: &[&str] = &["PUT", "PATCH", "POST", "GET", "DELETE", "OPTIONS"];

const EXPOSED_HEADERS: &str = "Content-Length, Content-Encoding, Authorization";

/// Whether a request is a CORS preflight
pub fn is_preflight(method: &Method, headers: &HeaderMap) -> bool {
    method == Method::OPTIONS
        && headers
            .get(ACCESS_CONTROL_REQUEST_METHOD)
            .is_some_and(|v| !v.is_empty())
}

/// Middleware answering preflights with `204 No Content`
pub async fn preflight_layer(request: Request, next: Next) -> Response {
    if !is_preflight(request.method(), request.headers()) {
        return next.run(request).await;
    }

    info!("Handling preflight request");
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    preflight_headers(request.headers(), response.headers_mut());
    response
}

/// Populate the preflight response headers
pub fn preflight_headers(request: &HeaderMap, response: &mut HeaderMap) {
    for vary in [
        "Origin",
        "Access-Control-Request-Method",
        "Access-Control-Request-Headers",
    ] {
        response.append(VARY, HeaderValue::from_static(vary));
    }

    let origin = header_str(request, ORIGIN.as_str());
    if origin.is_empty() {
        debug!("Preflight aborted: empty origin");
        return;
    }

    let method = header_str(request, ACCESS_CONTROL_REQUEST_METHOD.as_str());
    if !is_method_allowed(method) {
        debug!(method = %method, "Preflight aborted: method not allowed");
        return;
    }

    let requested = parse_header_list(header_str(request, ACCESS_CONTROL_REQUEST_HEADERS.as_str()));

    response.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    if let Ok(methods) = HeaderValue::from_str(&ALLOWED_METHODS.join(", ")) {
        response.insert(ACCESS_CONTROL_ALLOW_METHODS, methods);
    }
    if !requested.is_empty() {
        if let Ok(headers) = HeaderValue::from_str(&requested.join(", ")) {
            response.insert(ACCESS_CONTROL_ALLOW_HEADERS, headers);
        }
    }
    response.insert(
        ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
}

/// Overwrite CORS headers on a proxied response
pub fn apply_response_headers(headers: &mut HeaderMap) {
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(
        ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static(EXPOSED_HEADERS),
    );
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

fn is_method_allowed(method: &str) -> bool {
    let method = method.to_ascii_uppercase();
    ALLOWED_METHODS.iter().any(|m| *m == method)
}

/// Tokenize a header list and canonicalize each name
///
/// Names are split on commas and spaces; the first letter and every letter
/// following `-` or `_` is upper-cased, all others lower-cased. Characters
/// other than letters, digits, `-`, `_` and `.` are dropped.
///
/// ```
/// use kubegate_api::cors::parse_header_list;
///
/// assert_eq!(
///     parse_header_list("content-type, x-REQUESTED-with"),
///     vec!["Content-Type", "X-Requested-With"]
/// );
/// ```
pub fn parse_header_list(list: &str) -> Vec<String> {
    let bytes = list.as_bytes();
    let mut headers = Vec::with_capacity(bytes.iter().filter(|b| **b == b',').count() + 1);
    let mut current = String::new();
    let mut upper = true;

    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' => current.push(if upper {
                b.to_ascii_uppercase() as char
            } else {
                b.to_ascii_lowercase() as char
            }),
            b'-' | b'_' | b'.' | b'0'..=b'9' => current.push(b as char),
            _ => {}
        }

        if b == b' ' || b == b',' || i == bytes.len() - 1 {
            if !current.is_empty() {
                headers.push(std::mem::take(&mut current));
                upper = true;
            }
        } else {
            upper = b == b'-' || b == b'_';
        }
    }

    headers
}
