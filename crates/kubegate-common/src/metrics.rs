//! Metric instruments for the gateway
//!
//! Provides OpenTelemetry metrics for:
//! - Proxied requests (counts and routing latency by status and target)
//! - Workspace list/get API latency by status and verb
//! - Workspace authorization decisions

use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;

/// Global meter for kubegate metrics
static METER: Lazy<Meter> = Lazy::new(|| global::meter("kubegate"));

/// `route_to` label value for requests that never reached a member cluster
pub const ROUTE_REJECTED: &str = "rejected";

// ============================================================================
// Proxy Metrics
// ============================================================================

/// Counter of proxied requests
///
/// Labels:
/// - `status_code`: HTTP status returned to the caller
/// - `route_to`: target host, or `rejected`
pub static PROXY_REQUESTS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("kubegate_proxy_requests_total")
        .with_description("Total number of requests handled by the workspace proxy")
        .with_unit("{requests}")
        .build()
});

/// Histogram of the time from receiving a request to routing it
///
/// Labels:
/// - `status_code`: HTTP status returned to the caller
/// - `route_to`: target host, or `rejected`
pub static PROXY_API_REQUEST_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("kubegate_proxy_api_request_duration_seconds")
        .with_description("Time taken by the proxy to route a request to a target cluster")
        .with_unit("s")
        .with_boundaries(vec![0.05, 0.1, 0.25, 0.5, 1.0, 5.0, 10.0])
        .build()
});

/// Histogram of workspace list/get API response times
///
/// Labels:
/// - `status_code`: HTTP status returned to the caller
/// - `kube_verb`: get, list
pub static PROXY_WORKSPACE_REQUEST_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("kubegate_proxy_workspace_request_duration_seconds")
        .with_description("Time taken by the proxy to answer a workspace request")
        .with_unit("s")
        .with_boundaries(vec![0.05, 0.1, 0.25, 0.5, 1.0, 5.0, 10.0])
        .build()
});

// ============================================================================
// Authorization Metrics
// ============================================================================

/// Counter of workspace authorization decisions
///
/// Labels:
/// - `decision`: allow, deny
pub static WORKSPACE_AUTHZ_DECISIONS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("kubegate_workspace_authz_decisions_total")
        .with_description("Total number of workspace authorization decisions")
        .with_unit("{decisions}")
        .build()
});

// ============================================================================
// Label Types
// ============================================================================

/// Labels for authorization decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    /// Request was allowed
    Allow,
    /// Request was denied
    Deny,
}

/// Verb label for workspace API requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceVerb {
    /// Single workspace by name
    Get,
    /// All workspaces of the caller
    List,
}

impl WorkspaceVerb {
    /// Convert to label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::List => "list",
        }
    }
}

impl AuthDecision {
    /// Convert to label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }
}

// ============================================================================
// Metric Recording Helpers
// ============================================================================

/// Records a proxied request against the instant it was received
pub struct RouteTimer {
    start: Instant,
}

impl RouteTimer {
    /// Start timing from an already captured instant
    pub fn since(start: Instant) -> Self {
        Self { start }
    }

    /// Routing latency for a decision taken at `decided_at`
    pub fn routing_duration(&self, decided_at: Instant) -> Duration {
        decided_at.saturating_duration_since(self.start)
    }

    /// Record the outcome of a request whose routing was decided at `decided_at`
    ///
    /// The counter covers every request; the histogram measures up to the
    /// decision, not the upstream response.
    pub fn complete(self, decided_at: Instant, status_code: u16, route_to: &str) {
        let duration = self.routing_duration(decided_at).as_secs_f64();
        let labels = [
            KeyValue::new("status_code", status_code.to_string()),
            KeyValue::new("route_to", route_to.to_string()),
        ];

        PROXY_REQUESTS.add(1, &labels);
        PROXY_API_REQUEST_DURATION.record(duration, &labels);
    }
}

/// Record a workspace API response for a request received at `start`
pub fn record_workspace_request(start: Instant, status_code: u16, verb: WorkspaceVerb) {
    PROXY_WORKSPACE_REQUEST_DURATION.record(
        start.elapsed().as_secs_f64(),
        &[
            KeyValue::new("status_code", status_code.to_string()),
            KeyValue::new("kube_verb", verb.as_str()),
        ],
    );
}

/// Record a workspace authorization decision
pub fn record_authz_decision(decision: AuthDecision) {
    WORKSPACE_AUTHZ_DECISIONS.add(1, &[KeyValue::new("decision", decision.as_str())]);
}
