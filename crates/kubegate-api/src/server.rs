//! Gateway server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use axum_server::tls_rustls::RustlsConfig;
use hyper_util::rt::TokioTimer;
use kubegate_common::TelemetryHandle;
use tracing::{error, info};

use crate::auth::TokenParser;
use crate::context::request_context_layer;
use crate::cors::preflight_layer;
use crate::directory::{BannedUsers, WorkspaceDirectory};
use crate::error::Error;
use crate::forwarder::{strip_impersonation_layer, Upstream};
use crate::members::AccessResolver;
use crate::proxy::proxy_handler;
use crate::workspaces::{get_workspace_handler, list_workspaces_handler, WORKSPACES_PATH};

/// Path answered by the gateway itself for liveness probes
pub const HEALTH_PATH: &str = "/proxyhealth";

/// Default bound on reading inbound request headers
pub const DEFAULT_HEADER_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind the proxy listener
    pub addr: SocketAddr,
    /// Address to bind the metrics listener
    pub metrics_addr: SocketAddr,
    /// TLS certificate and key PEM; plain HTTP when absent
    pub tls: Option<TlsPem>,
    /// Bound on reading inbound request headers
    pub header_read_timeout: Duration,
}

/// TLS material for the proxy listener
#[derive(Clone)]
pub struct TlsPem {
    /// Certificate chain PEM
    pub cert_pem: String,
    /// Private key PEM
    pub key_pem: String,
}

/// Shared state for handlers
#[derive(Clone)]
pub struct AppState {
    /// Validates caller tokens
    pub token_parser: Arc<dyn TokenParser>,
    /// Workspaces accessible to a caller
    pub workspaces: Arc<dyn WorkspaceDirectory>,
    /// Banned user list
    pub banned: Arc<dyn BannedUsers>,
    /// Resolves member cluster access
    pub resolver: Arc<AccessResolver>,
    /// Sends requests to member clusters
    pub upstream: Arc<dyn Upstream>,
    /// Let anyone browse workspaces shared with the public viewer
    pub public_viewer_enabled: bool,
}

/// Build the proxy router
///
/// Every path other than the health check and the workspace API is proxied.
/// Layers run outermost first: receipt time and access log, CORS preflight, impersonation header
/// stripping.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health))
        .route(WORKSPACES_PATH, get(list_workspaces_handler))
        .route(&format!("{}/{{name}}", WORKSPACES_PATH), get(get_workspace_handler))
        .fallback(proxy_handler)
        .with_state(state)
        .layer(from_fn(strip_impersonation_layer))
        .layer(from_fn(preflight_layer))
        .layer(from_fn(request_context_layer))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "alive": true }))
}

/// Build the metrics router
pub fn metrics_router(telemetry: TelemetryHandle) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .with_state(telemetry)
}

async fn metrics(State(telemetry): State<TelemetryHandle>) -> Response {
    match telemetry.encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Start the gateway and its metrics listener
///
/// Returns when either listener fails.
pub async fn start_server(
    config: ServerConfig,
    state: AppState,
    telemetry: TelemetryHandle,
) -> Result<(), Error> {
    let app = router(state);

    let metrics_addr = config.metrics_addr;
    let metrics = async move {
        info!(addr = %metrics_addr, "Starting metrics server");
        axum_server::bind(metrics_addr)
            .serve(metrics_router(telemetry).into_make_service())
            .await
            .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))
    };

    let proxy = async move {
        let served = match config.tls {
            Some(tls) => {
                let tls_config =
                    RustlsConfig::from_pem(tls.cert_pem.into_bytes(), tls.key_pem.into_bytes())
                        .await
                        .map_err(|e| Error::Config(format!("TLS config error: {}", e)))?;

                info!(addr = %config.addr, "Starting workspace proxy (TLS)");

                let mut server = axum_server::bind_rustls(config.addr, tls_config);
                server
                    .http_builder()
                    .http1()
                    .timer(TokioTimer::new())
                    .header_read_timeout(config.header_read_timeout);
                server.serve(app.into_make_service()).await
            }
            None => {
                info!(addr = %config.addr, "Starting workspace proxy");

                let mut server = axum_server::bind(config.addr);
                server
                    .http_builder()
                    .http1()
                    .timer(TokioTimer::new())
                    .header_read_timeout(config.header_read_timeout);
                server.serve(app.into_make_service()).await
            }
        };
        served.map_err(|e| Error::Internal(format!("Server error: {}", e)))
    };

    tokio::try_join!(proxy, metrics)?;
    Ok(())
}
