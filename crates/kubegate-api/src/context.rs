//! Per-request routing context and access logging
//!
//! The outermost middleware stamps each request with its receipt time. The
//! proxy handler attaches a [`RequestContext`] to every response it produces,
//! accepted or rejected, and the middleware turns it into one access log line
//! and the request metrics. Routing latency runs from receipt to the
//! forwarding decision, so upstream time is not counted.

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use kubegate_common::metrics::{RouteTimer, ROUTE_REJECTED};
use tracing::info;

use crate::auth::Identity;

/// Instant at which the gateway received the request
#[derive(Debug, Clone, Copy)]
pub struct ReceivedAt(pub Instant);

/// What the proxy handler learned about a request
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Receipt time, copied from [`ReceivedAt`]
    pub received_at: Instant,
    /// Authenticated caller, if authentication got that far
    pub identity: Option<Identity>,
    /// Plugin named in the path
    pub plugin: Option<String>,
    /// Workspace named in the path
    pub workspace: Option<String>,
    /// Namespace named in the forwarded path
    pub namespace: Option<String>,
    /// Host the request was forwarded to; `None` when rejected
    pub route_to: Option<String>,
    /// When the handler decided to forward; `None` when rejected
    pub decided_at: Option<Instant>,
}

impl RequestContext {
    /// Empty context for a request received at `received_at`
    pub fn new(received_at: Instant) -> Self {
        Self {
            received_at,
            identity: None,
            plugin: None,
            workspace: None,
            namespace: None,
            route_to: None,
            decided_at: None,
        }
    }

    /// Label for the `route_to` metric dimension
    pub fn route_label(&self) -> &str {
        self.route_to.as_deref().unwrap_or(ROUTE_REJECTED)
    }

    fn username(&self) -> &str {
        self.identity
            .as_ref()
            .map(|i| i.username.as_str())
            .unwrap_or_default()
    }
}

/// Receipt time of a request, falling back to now when unstamped
pub fn received_at(request: &Request) -> Instant {
    request
        .extensions()
        .get::<ReceivedAt>()
        .map(|r| r.0)
        .unwrap_or_else(Instant::now)
}

/// Middleware stamping receipt time and logging the outcome
pub async fn request_context_layer(mut request: Request, next: Next) -> Response {
    let start = Instant::now();
    request.extensions_mut().insert(ReceivedAt(start));

    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;
    let status = response.status();

    // Only proxied requests carry a context; health checks and preflights do not
    if let Some(context) = response.extensions().get::<RequestContext>() {
        // Rejections are decided when the response is ready
        let decided_at = context.decided_at.unwrap_or_else(Instant::now);
        RouteTimer::since(context.received_at).complete(
            decided_at,
            status.as_u16(),
            context.route_label(),
        );

        info!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            user = %context.username(),
            workspace = context.workspace.as_deref().unwrap_or_default(),
            plugin = context.plugin.as_deref().unwrap_or_default(),
            route_to = %context.route_label(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    #[test]
    fn test_route_label_defaults_to_rejected() {
        let mut context = RequestContext::new(Instant::now());
        assert_eq!(context.route_label(), "rejected");

        context.route_to = Some("api.member-1".into());
        assert_eq!(context.route_label(), "api.member-1");
    }

    #[test]
    fn test_received_at_falls_back_to_now() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let before = Instant::now();
        assert!(received_at(&request) >= before);
    }

    #[tokio::test]
    async fn test_layer_stamps_request_and_passes_context_through() {
        let router = Router::new()
            .route(
                "/api",
                get(|request: Request| async move {
                    let stamped = request.extensions().get::<ReceivedAt>().is_some();
                    let mut response = Response::new(Body::from(stamped.to_string()));
                    response
                        .extensions_mut()
                        .insert(RequestContext::new(received_at(&request)));
                    response
                }),
            )
            .layer(axum::middleware::from_fn(request_context_layer));

        let response = router
            .oneshot(Request::builder().uri("/api").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.extensions().get::<RequestContext>().is_some());
        let body = axum::body::to_bytes(response.into_body(), 64).await.unwrap();
        assert_eq!(&body[..], b"true");
    }
}
