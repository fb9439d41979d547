//! Reverse proxy to member clusters
//!
//! Rewrites an authorized request for its [`ClusterAccess`] target and streams
//! it to the member cluster API server or plugin route.
//!
//! # Security
//!
//! **Impersonation headers from callers are always stripped** before anything
//! else runs. The gateway authenticates to the member cluster with the
//! cluster's own service account token and asks it to act as the caller via
//! `Impersonate-User`, so a forged `Impersonate-*` header would let a caller
//! pick any identity.
//!
//! # Dependency Injection
//!
//! The outbound call goes through the [`Upstream`] trait. Tests inject a mock
//! and assert on the [`OutboundRequest`] the director produced.

use async_trait::async_trait;
use axum::body::{Body, HttpBody};
use axum::extract::Request;
use axum::http::header::{
    AUTHORIZATION, CONNECTION, HOST, SEC_WEBSOCKET_PROTOCOL, UPGRADE, USER_AGENT,
};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use hyper::upgrade::OnUpgrade;
use tracing::{debug, error, info};
use url::Url;

use crate::access::ClusterAccess;
use crate::cors::apply_response_headers;
use crate::error::Error;
use crate::routing::single_joining_slash;
use crate::websocket::{is_websocket_request, replace_protocol_token};

// ============================================================================
// Constants
// ============================================================================

/// Header carrying the identity the member cluster should act as
pub const IMPERSONATE_USER: &str = "impersonate-user";

/// Prefix shared by every Kubernetes impersonation header
const IMPERSONATION_PREFIX: &str = "impersonate-";

/// Environment name in which member cluster certificates are verified
pub const PRODUCTION_ENVIRONMENT: &str = "prod";

/// Hop-by-hop headers, never forwarded as-is
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

// ============================================================================
// Transport
// ============================================================================

/// TLS and protocol policy toward member clusters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportPolicy {
    /// Skip certificate verification
    pub insecure_skip_verify: bool,
}

impl TransportPolicy {
    /// Verification is skipped everywhere except production
    pub fn for_environment(environment: &str) -> Self {
        Self {
            insecure_skip_verify: environment != PRODUCTION_ENVIRONMENT,
        }
    }
}

/// Prebuilt HTTP clients for outbound requests
///
/// No connect, idle or total timeout is set: exec sessions and log tails are
/// long-lived. Redirects are returned to the caller, not followed. The
/// default client negotiates HTTP/2 over ALPN; upgrades need the HTTP/1.1
/// client.
#[derive(Clone)]
pub struct Transports {
    default: reqwest::Client,
    http1: reqwest::Client,
}

impl Transports {
    /// Build both clients for `policy`
    pub fn new(policy: TransportPolicy) -> Result<Self, Error> {
        let builder = || {
            reqwest::Client::builder()
                .danger_accept_invalid_certs(policy.insecure_skip_verify)
                .redirect(reqwest::redirect::Policy::none())
                .pool_idle_timeout(None)
                .tcp_keepalive(None)
        };

        let default = builder()
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;
        let http1 = builder()
            .http1_only()
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP/1.1 client: {}", e)))?;

        Ok(Self { default, http1 })
    }

    fn client(&self, force_http1: bool) -> &reqwest::Client {
        if force_http1 {
            &self.http1
        } else {
            &self.default
        }
    }
}

// ============================================================================
// Director
// ============================================================================

/// A request rewritten for its member cluster target
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    /// HTTP method
    pub method: Method,
    /// Full target URL
    pub url: Url,
    /// Headers to send
    pub headers: HeaderMap,
    /// Caller asked for a protocol upgrade
    pub upgrade: bool,
    /// Must be sent over HTTP/1.1
    pub force_http1: bool,
}

/// Rewrite an inbound request for `access`
///
/// `path` is the inbound path with routing prefixes removed. Plugin requests
/// also get their `Host` header pointed at the route.
pub fn direct(
    access: &ClusterAccess,
    parts: &Parts,
    path: &str,
    plugin: bool,
) -> Result<OutboundRequest, Error> {
    let target = access.api_url();

    let mut url = target.clone();
    url.set_path(&single_joining_slash(target.path(), path));
    let query = match (
        target.query().unwrap_or_default(),
        parts.uri.query().unwrap_or_default(),
    ) {
        ("", "") => None,
        (target_query, "") => Some(target_query.to_string()),
        ("", request_query) => Some(request_query.to_string()),
        (target_query, request_query) => Some(format!("{}&{}", target_query, request_query)),
    };
    url.set_query(query.as_deref());

    let upgrade_value = upgrade_protocol(&parts.headers);
    let mut headers = parts.headers.clone();
    remove_hop_by_hop_headers(&mut headers);
    headers.remove(HOST);

    if let Some(protocol) = &upgrade_value {
        headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
        headers.insert(UPGRADE, protocol.clone());
    }

    if plugin {
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        };
        headers.insert(HOST, header_value(&host)?);
    }

    if !headers.contains_key(USER_AGENT) {
        headers.insert(USER_AGENT, HeaderValue::from_static(""));
    }

    if is_websocket_request(&parts.headers) && headers.contains_key(SEC_WEBSOCKET_PROTOCOL) {
        headers.remove(AUTHORIZATION);
        replace_protocol_token(&mut headers, access.impersonation_token())?;
    } else {
        headers.insert(
            AUTHORIZATION,
            header_value(&format!("Bearer {}", access.impersonation_token()))?,
        );
    }

    headers.insert(
        HeaderName::from_static(IMPERSONATE_USER),
        header_value(access.impersonated_username())?,
    );

    let force_http1 = upgrade_value.is_some();

    Ok(OutboundRequest {
        method: parts.method.clone(),
        url,
        headers,
        upgrade: upgrade_value.is_some(),
        force_http1,
    })
}

/// Protocol named in `Upgrade`, when the request asks for an upgrade
fn upgrade_protocol(headers: &HeaderMap) -> Option<HeaderValue> {
    let upgrade = headers.get(UPGRADE)?;
    let connection_upgrade = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case("upgrade"));
    connection_upgrade.then(|| upgrade.clone())
}

/// Whether the request upgrades to SPDY (exec, attach, port-forward)
pub fn is_spdy_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_uppercase().starts_with("SPDY/"))
}

fn remove_hop_by_hop_headers(headers: &mut HeaderMap) {
    // Headers named in Connection are hop-by-hop too
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(*name);
    }
}

fn header_value(value: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(value)
        .map_err(|e| Error::Internal(format!("invalid outbound header value: {}", e)))
}

// ============================================================================
// Upstream
// ============================================================================

/// Sends rewritten requests to member clusters
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Send `request` with `body`; bridge the connection if `upgrade` is set
    /// and the member cluster switches protocols
    async fn send(
        &self,
        request: OutboundRequest,
        body: Body,
        upgrade: Option<OnUpgrade>,
    ) -> Result<Response<Body>, Error>;
}

/// [`Upstream`] backed by reqwest
pub struct ReqwestUpstream {
    transports: Transports,
}

impl ReqwestUpstream {
    /// Create an upstream over prebuilt transports
    pub fn new(transports: Transports) -> Self {
        Self { transports }
    }
}

#[async_trait]
impl Upstream for ReqwestUpstream {
    async fn send(
        &self,
        request: OutboundRequest,
        body: Body,
        upgrade: Option<OnUpgrade>,
    ) -> Result<Response<Body>, Error> {
        let client = self.transports.client(request.force_http1);

        let mut builder = client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers);
        if body.size_hint().exact() != Some(0) {
            builder = builder.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        let host = request.url.host_str().unwrap_or_default().to_string();
        let upstream_response = builder
            .send()
            .await
            .map_err(|e| Error::Proxy(format!("failed to reach {}: {}", host, e)))?;

        let status = upstream_response.status();
        debug!(status = %status, url = %request.url, "Received upstream response");

        match upgrade {
            Some(incoming) if status == StatusCode::SWITCHING_PROTOCOLS => {
                bridge_upgrade(incoming, upstream_response).await
            }
            _ => streaming_response(upstream_response),
        }
    }
}

/// Pass an upstream response through without buffering
fn streaming_response(upstream: reqwest::Response) -> Result<Response<Body>, Error> {
    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    remove_hop_by_hop_headers(&mut headers);

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Return the upstream 101 to the caller and splice the two connections
async fn bridge_upgrade(
    incoming: OnUpgrade,
    upstream_response: reqwest::Response,
) -> Result<Response<Body>, Error> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    *response.headers_mut() = upstream_response.headers().clone();

    let mut upstream = upstream_response
        .upgrade()
        .await
        .map_err(|e| Error::Proxy(format!("failed to upgrade upstream connection: {}", e)))?;

    tokio::spawn(async move {
        match incoming.await {
            Ok(upgraded) => {
                // hyper::Upgraded needs TokioIo for tokio AsyncRead/Write
                let mut incoming = hyper_util::rt::TokioIo::new(upgraded);
                match tokio::io::copy_bidirectional(&mut incoming, &mut upstream).await {
                    Ok((from_client, from_server)) => {
                        info!(from_client, from_server, "Upgraded session ended");
                    }
                    Err(e) => debug!(error = %e, "Upgraded session bridge error"),
                }
            }
            Err(e) => error!(error = %e, "Failed to upgrade incoming connection"),
        }
    });

    Ok(response)
}

// ============================================================================
// Public API
// ============================================================================

/// Forward an authorized request to its target
///
/// The response is streamed back with its CORS headers overwritten.
pub async fn forward(
    upstream: &dyn Upstream,
    access: &ClusterAccess,
    mut request: Request,
    path: &str,
    plugin: bool,
) -> Result<Response<Body>, Error> {
    let incoming_upgrade = upgrade_protocol(request.headers())
        .is_some()
        .then(|| hyper::upgrade::on(&mut request));

    let (parts, body) = request.into_parts();
    let outbound = direct(access, &parts, path, plugin)?;

    debug!(
        method = %outbound.method,
        url = %outbound.url,
        user = %access.impersonated_username(),
        http1 = outbound.force_http1,
        spdy = is_spdy_upgrade(&outbound.headers),
        "Forwarding request with impersonation"
    );

    let mut response = upstream.send(outbound, body, incoming_upgrade).await?;
    apply_response_headers(response.headers_mut());
    Ok(response)
}

// ============================================================================
// Security
// ============================================================================

/// Remove every caller-supplied `Impersonate-*` header
pub fn strip_impersonation_headers(headers: &mut HeaderMap) {
    let forged: Vec<HeaderName> = headers
        .keys()
        .filter(|k| k.as_str().starts_with(IMPERSONATION_PREFIX))
        .cloned()
        .collect();

    for key in forged {
        headers.remove(&key);
    }
}

/// Middleware stripping impersonation headers before any other stage
pub async fn strip_impersonation_layer(mut request: Request, next: Next) -> Response {
    strip_impersonation_headers(request.headers_mut());
    next.run(request).await
}
