//! Workspace-aware proxy handler
//!
//! Authenticates the caller, works out which workspace and member cluster the
//! request is for, authorizes it and forwards it with impersonation.
//!
//! Flow:
//! 1. Authenticate (bearer header or WebSocket sub-protocol)
//! 2. Reject banned users
//! 3. Parse plugin, workspace and namespace from the path
//! 4. List the workspaces the caller may access
//! 5. Resolve the target cluster access
//! 6. Authorize workspace and namespace
//! 7. Forward

use std::time::Instant;

use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use tracing::{debug, error, warn};

use crate::auth::{authenticate, Identity};
use crate::authorize::{authorize_workspace, SPACE_NOT_AVAILABLE};
use crate::context::{received_at, RequestContext};
use crate::directory::Workspace;
use crate::error::{Error, Result};
use crate::forwarder::forward;
use crate::members::AccessError;
use crate::routing::{namespace_from_path, workspace_context};
use crate::server::AppState;

/// Handle every proxied request
///
/// The response, success or error, always carries a [`RequestContext`] for
/// the access log.
pub async fn proxy_handler(State(state): State<AppState>, request: Request) -> Response {
    let mut context = RequestContext::new(received_at(&request));

    let mut response = match route_request(&state, request, &mut context).await {
        Ok(response) => response,
        Err(e) => {
            debug!(error = %e, status = e.status_code().as_u16(), "Request rejected");
            e.into_response()
        }
    };

    response.extensions_mut().insert(context);
    response
}

async fn route_request(
    state: &AppState,
    request: Request,
    context: &mut RequestContext,
) -> Result<Response> {
    // 1. Authenticate
    let identity = authenticate(state.token_parser.as_ref(), request.headers()).await?;
    context.identity = Some(identity.clone());

    // 2. Banned users never reach routing
    check_not_banned(state, &identity).await?;

    // 3. Where is the request going
    let target = workspace_context(request.uri().path())
        .map_err(|e| Error::BadRequest(format!("unable to get workspace context: {}", e)))?;
    let namespace = namespace_from_path(&target.path).map(str::to_string);

    context.plugin = target.plugin.clone();
    context.workspace = target.workspace.clone();
    context.namespace = namespace.clone();

    debug!(
        user = %identity.username,
        workspace = ?target.workspace,
        plugin = ?target.plugin,
        namespace = ?namespace,
        "Routing request"
    );

    // 4. Accessible workspaces, falling back to the public viewer
    let (caller, workspaces) =
        accessible_workspaces(state, identity, target.workspace.as_deref()).await?;
    let unreachable = target
        .workspace
        .as_deref()
        .is_some_and(|name| !workspaces.iter().any(|ws| ws.name == name));

    // 5. Resolve target cluster
    let access = state
        .resolver
        .get_cluster_access(
            &caller.user_id,
            &caller.username,
            target.workspace.as_deref(),
            target.plugin.as_deref(),
            state.public_viewer_enabled,
        )
        .await
        .map_err(|e| match e {
            // Unreachable workspaces answer alike whether or not they exist
            AccessError::SpaceNotAvailable => Error::Forbidden(SPACE_NOT_AVAILABLE.into()),
            other if unreachable => {
                debug!(workspace = ?target.workspace, error = %other, "Unreachable workspace did not resolve");
                Error::Forbidden(SPACE_NOT_AVAILABLE.into())
            }
            other => Error::Internal(format!("unable to get target cluster: {}", other)),
        })?;

    // 6. Authorize
    authorize_workspace(
        target.workspace.as_deref(),
        namespace.as_deref(),
        &workspaces,
    )?;

    // 7. Forward
    context.route_to = access.api_url().host_str().map(str::to_string);
    context.decided_at = Some(Instant::now());
    forward(
        state.upstream.as_ref(),
        &access,
        request,
        &target.path,
        target.plugin.is_some(),
    )
    .await
}

pub(crate) async fn check_not_banned(state: &AppState, identity: &Identity) -> Result<()> {
    let Some(email) = identity.email.as_deref().filter(|e| !e.is_empty()) else {
        return Ok(());
    };

    match state.banned.is_banned(email).await {
        Ok(false) => Ok(()),
        Ok(true) => {
            warn!(user = %identity.username, "Banned user rejected");
            Err(Error::Forbidden("user access is forbidden".into()))
        }
        Err(e) => {
            error!(user = %identity.username, error = %e, "Banned user lookup failed");
            Err(Error::Internal("user access could not be verified".into()))
        }
    }
}

/// Workspaces the caller may access, and the identity that grants them
///
/// A named workspace the caller cannot reach is retried as the public viewer
/// when that feature is on.
async fn accessible_workspaces(
    state: &AppState,
    identity: Identity,
    workspace: Option<&str>,
) -> Result<(Identity, Vec<Workspace>)> {
    let list = |identity: Identity| async move {
        state
            .workspaces
            .list_workspaces(&identity, workspace)
            .await
            .map(|workspaces| (identity, workspaces))
            .map_err(|e| Error::Internal(format!("unable to retrieve user workspaces: {}", e)))
    };

    let (identity, workspaces) = list(identity).await?;

    let reachable = |workspaces: &[Workspace]| {
        workspace.is_none_or(|name| workspaces.iter().any(|ws| ws.name == name))
    };
    if reachable(&workspaces) || !state.public_viewer_enabled || identity.is_public_viewer() {
        return Ok((identity, workspaces));
    }

    let (viewer, shared) = list(Identity::public_viewer()).await?;
    if reachable(&shared) {
        debug!(user = %identity.username, workspace = ?workspace, "Accessing workspace as public viewer");
        return Ok((viewer, shared));
    }

    Ok((identity, workspaces))
}
