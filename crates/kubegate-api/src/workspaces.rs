//! Workspace list and get API
//!
//! Answers `GET .../workspaces` and `GET .../workspaces/{name}` from the read
//! models instead of forwarding to a member cluster. A caller only ever sees
//! workspaces bound to them; anything else is not found.

use std::time::Instant;

use axum::extract::{Path, Request, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use kubegate_common::metrics::{record_workspace_request, WorkspaceVerb};
use serde::Serialize;
use tracing::debug;

use crate::auth::{authenticate, Identity};
use crate::context::received_at;
use crate::directory::{Workspace, WorkspaceType};
use crate::error::{Error, Result};
use crate::proxy::check_not_banned;
use crate::server::AppState;

/// API group and version of workspace objects
pub const WORKSPACE_API_VERSION: &str = "toolchain.dev.openshift.com/v1alpha1";

/// Path of the workspace collection
pub const WORKSPACES_PATH: &str = "/apis/toolchain.dev.openshift.com/v1alpha1/workspaces";

// ============================================================================
// Wire Types
// ============================================================================

/// A workspace as returned to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceObject {
    /// Always `Workspace`
    pub kind: &'static str,
    /// Always [`WORKSPACE_API_VERSION`]
    pub api_version: &'static str,
    /// Object metadata
    pub metadata: WorkspaceMeta,
    /// Observed state
    pub status: WorkspaceStatus,
}

/// Workspace metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspaceMeta {
    /// Workspace name
    pub name: String,
}

/// Workspace status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspaceStatus {
    /// Namespaces provisioned for the workspace
    pub namespaces: Vec<WorkspaceNamespace>,
    /// Owning user
    pub owner: String,
    /// Caller's role
    #[serde(skip_serializing_if = "String::is_empty")]
    pub role: String,
    /// `home` for the caller's own workspace
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<&'static str>,
}

/// Namespace entry of a workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspaceNamespace {
    /// Namespace name
    pub name: String,
}

/// Workspaces of the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceList {
    /// Always `WorkspaceList`
    pub kind: &'static str,
    /// Always [`WORKSPACE_API_VERSION`]
    pub api_version: &'static str,
    /// Workspaces, in directory order
    pub items: Vec<WorkspaceObject>,
}

impl From<Workspace> for WorkspaceObject {
    fn from(workspace: Workspace) -> Self {
        Self {
            kind: "Workspace",
            api_version: WORKSPACE_API_VERSION,
            metadata: WorkspaceMeta {
                name: workspace.name,
            },
            status: WorkspaceStatus {
                namespaces: workspace
                    .namespaces
                    .into_iter()
                    .map(|name| WorkspaceNamespace { name })
                    .collect(),
                owner: workspace.owner,
                role: workspace.role,
                type_: (workspace.type_ == WorkspaceType::Home).then_some("home"),
            },
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// `GET /apis/toolchain.dev.openshift.com/v1alpha1/workspaces`
pub async fn list_workspaces_handler(State(state): State<AppState>, request: Request) -> Response {
    let start = received_at(&request);

    match list_for(&state, request.headers()).await {
        Ok(workspaces) => {
            record_workspace_request(start, 200, WorkspaceVerb::List);
            Json(WorkspaceList {
                kind: "WorkspaceList",
                api_version: WORKSPACE_API_VERSION,
                items: workspaces.into_iter().map(WorkspaceObject::from).collect(),
            })
            .into_response()
        }
        Err(e) => rejected(start, e, WorkspaceVerb::List),
    }
}

/// `GET /apis/toolchain.dev.openshift.com/v1alpha1/workspaces/{name}`
pub async fn get_workspace_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    request: Request,
) -> Response {
    let start = received_at(&request);

    match get_for(&state, request.headers(), &name).await {
        Ok(workspace) => {
            record_workspace_request(start, 200, WorkspaceVerb::Get);
            Json(WorkspaceObject::from(workspace)).into_response()
        }
        Err(e) => rejected(start, e, WorkspaceVerb::Get),
    }
}

fn rejected(start: Instant, error: Error, verb: WorkspaceVerb) -> Response {
    let status = error.status_code();
    debug!(error = %error, status = status.as_u16(), verb = verb.as_str(), "Workspace request rejected");
    record_workspace_request(start, status.as_u16(), verb);
    error.into_response()
}

async fn caller_identity(state: &AppState, headers: &HeaderMap) -> Result<Identity> {
    let identity = authenticate(state.token_parser.as_ref(), headers).await?;
    check_not_banned(state, &identity).await?;
    Ok(identity)
}

/// Every workspace bound to the caller, plus the public viewer's when enabled
///
/// A caller whose signup is not ready has no workspaces at all.
async fn list_for(state: &AppState, headers: &HeaderMap) -> Result<Vec<Workspace>> {
    let identity = caller_identity(state, headers).await?;
    if !provisioned(state, &identity).await? {
        return Ok(Vec::new());
    }

    let mut workspaces = list_as(state, &identity, None).await?;

    if state.public_viewer_enabled && !identity.is_public_viewer() {
        for shared in list_as(state, &Identity::public_viewer(), None).await? {
            if !workspaces.iter().any(|ws| ws.name == shared.name) {
                workspaces.push(shared);
            }
        }
    }

    Ok(workspaces)
}

/// The named workspace, when bound to the caller
async fn get_for(state: &AppState, headers: &HeaderMap, name: &str) -> Result<Workspace> {
    let identity = caller_identity(state, headers).await?;
    let not_found = || {
        Error::NotFound(format!(
            "workspaces.toolchain.dev.openshift.com \"{}\" not found",
            name
        ))
    };

    if !provisioned(state, &identity).await? {
        return Err(not_found());
    }

    list_as(state, &identity, Some(name))
        .await?
        .into_iter()
        .find(|ws| ws.name == name)
        .ok_or_else(|| {
            debug!(user = %identity.username, workspace = %name, "No binding for workspace");
            not_found()
        })
}

async fn provisioned(state: &AppState, identity: &Identity) -> Result<bool> {
    state
        .resolver
        .is_provisioned(&identity.user_id, &identity.username)
        .await
        .map_err(|e| Error::Internal(format!("unable to retrieve user workspaces: {}", e)))
}

async fn list_as(state: &AppState, identity: &Identity, name: Option<&str>) -> Result<Vec<Workspace>> {
    state
        .workspaces
        .list_workspaces(identity, name)
        .await
        .map_err(|e| Error::Internal(format!("unable to retrieve user workspaces: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
    use axum::http::StatusCode;
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::auth::{MockTokenParser, TokenClaims, PUBLIC_VIEWER_USERNAME};
    use crate::forwarder::MockUpstream;
    use crate::test_support::{member, workspace, FakeDirectory};

    fn directory() -> FakeDirectory {
        FakeDirectory::default()
            .with_member(member("member-1", "https://api.member-1:6443", "token-1"))
            .with_signup("user-1", "smith2", "smith2", "member-1", "https://api.member-1:6443")
            .with_signup("user-9", "jones", "", "member-1", "https://api.member-1:6443")
            .with_workspace(workspace("smith2", WorkspaceType::Home, "member-1", &["smith2-dev", "smith2-stage"]))
            .with_workspace(workspace("teamspace", WorkspaceType::Other, "member-1", &["team-dev"]))
            .with_workspace(workspace("community", WorkspaceType::Other, "member-1", &["community-dev"]))
            .with_workspace(workspace("alice-private", WorkspaceType::Other, "member-1", &["alice-dev"]))
            .with_binding("smith2", "smith2")
            .with_binding("smith2", "teamspace")
            .with_binding(PUBLIC_VIEWER_USERNAME, "community")
    }

    fn parser() -> MockTokenParser {
        let mut parser = MockTokenParser::new();
        parser.expect_parse().returning(|token| {
            let (subject, username) = match token {
                "jones-token" => ("user-9", "jones"),
                _ => ("user-1", "smith2"),
            };
            Ok(TokenClaims {
                subject: subject.into(),
                preferred_username: username.into(),
                email: None,
            })
        });
        parser
    }

    fn app(directory: FakeDirectory, public_viewer_enabled: bool) -> Router {
        let directory = Arc::new(directory);
        let mut upstream = MockUpstream::new();
        upstream.expect_send().never();

        crate::server::router(AppState {
            token_parser: Arc::new(parser()),
            workspaces: directory.clone(),
            banned: directory.clone(),
            resolver: Arc::new(directory.resolver()),
            upstream: Arc::new(upstream),
            public_viewer_enabled,
        })
    }

    fn get(uri: &str, token: &str) -> Request {
        Request::builder()
            .uri(uri)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 16 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn names(list: &Value) -> Vec<&str> {
        list["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["metadata"]["name"].as_str().unwrap())
            .collect()
    }

    #[test]
    fn test_workspace_object_shape() {
        let object = WorkspaceObject::from(workspace("smith2", WorkspaceType::Home, "member-1", &["smith2-dev"]));

        assert_eq!(
            serde_json::to_value(&object).unwrap(),
            json!({
                "kind": "Workspace",
                "apiVersion": "toolchain.dev.openshift.com/v1alpha1",
                "metadata": { "name": "smith2" },
                "status": {
                    "namespaces": [{ "name": "smith2-dev" }],
                    "owner": "smith2",
                    "role": "admin",
                    "type": "home"
                }
            })
        );
    }

    #[test]
    fn test_shared_workspace_has_no_type() {
        let object = WorkspaceObject::from(workspace("teamspace", WorkspaceType::Other, "member-1", &[]));
        let value = serde_json::to_value(&object).unwrap();

        assert!(value["status"].get("type").is_none());
        assert_eq!(value["status"]["owner"], "teamspace-owner");
    }

    #[tokio::test]
    async fn test_list_workspaces() {
        let response = app(directory(), false)
            .oneshot(get(WORKSPACES_PATH, "good-token"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        let list = json_body(response).await;
        assert_eq!(list["kind"], "WorkspaceList");
        assert_eq!(list["apiVersion"], WORKSPACE_API_VERSION);
        assert_eq!(names(&list), ["smith2", "teamspace"]);
        assert_eq!(list["items"][0]["status"]["type"], "home");
    }

    #[tokio::test]
    async fn test_list_includes_public_viewer_workspaces() {
        let response = app(directory(), true)
            .oneshot(get(WORKSPACES_PATH, "good-token"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(names(&json_body(response).await), ["smith2", "teamspace", "community"]);
    }

    #[tokio::test]
    async fn test_list_for_unprovisioned_user_is_empty() {
        let response = app(directory(), true)
            .oneshot(get(WORKSPACES_PATH, "jones-token"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(names(&json_body(response).await).is_empty());
    }

    #[tokio::test]
    async fn test_list_failure_is_internal() {
        let response = app(directory().with_list_error("informer down"), false)
            .oneshot(get(WORKSPACES_PATH, "good-token"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert!(body["message"]
            .as_str()
            .unwrap()
            .contains("unable to retrieve user workspaces"));
    }

    #[tokio::test]
    async fn test_list_requires_token() {
        let request = Request::builder()
            .uri(WORKSPACES_PATH)
            .body(Body::empty())
            .unwrap();

        let response = app(directory(), false).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_get_workspace() {
        let uri = format!("{}/teamspace", WORKSPACES_PATH);
        let response = app(directory(), false)
            .oneshot(get(&uri, "good-token"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let object = json_body(response).await;
        assert_eq!(object["kind"], "Workspace");
        assert_eq!(object["metadata"]["name"], "teamspace");
        assert_eq!(object["status"]["role"], "contributor");
        assert_eq!(object["status"]["namespaces"][0]["name"], "team-dev");
    }

    #[tokio::test]
    async fn test_get_unknown_and_unbound_look_the_same() {
        let mut bodies = Vec::new();
        for name in ["ghost", "alice-private"] {
            let uri = format!("{}/{}", WORKSPACES_PATH, name);
            let response = app(directory(), false)
                .oneshot(get(&uri, "good-token"))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", name);
            let body = json_body(response).await;
            bodies.push(body["message"].as_str().unwrap().replace(name, "<name>"));
        }

        assert_eq!(
            bodies[0],
            "workspaces.toolchain.dev.openshift.com \"<name>\" not found"
        );
        assert_eq!(bodies[0], bodies[1]);
    }

    #[tokio::test]
    async fn test_get_for_unprovisioned_user_is_not_found() {
        let uri = format!("{}/smith2", WORKSPACES_PATH);
        let response = app(directory(), false)
            .oneshot(get(&uri, "jones-token"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_failure_is_internal() {
        let uri = format!("{}/smith2", WORKSPACES_PATH);
        let response = app(directory().with_list_error("informer down"), false)
            .oneshot(get(&uri, "good-token"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_workspace_requests_are_not_forwarded() {
        let response = app(directory(), false)
            .oneshot(get(&format!("{}/smith2", WORKSPACES_PATH), "good-token"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
