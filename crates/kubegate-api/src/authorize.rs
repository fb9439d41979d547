//! Workspace and namespace authorization
//!
//! Independent of access resolution: the resolver decides where a request
//! goes, this decides whether the caller may send it there.

use kubegate_common::metrics::{record_authz_decision, AuthDecision};
use tracing::debug;

use crate::directory::{Workspace, WorkspaceType};
use crate::error::Error;

/// Answer for a named workspace the caller cannot reach, whether or not it exists
pub const SPACE_NOT_AVAILABLE: &str = "the requested space is not available";

/// Check the requested workspace and namespace against the accessible set
///
/// With no workspace requested, the caller must have exactly one home
/// workspace. A named workspace outside the accessible set is reported as
/// [`SPACE_NOT_AVAILABLE`]. A requested namespace must belong to the matched
/// workspace.
pub fn authorize_workspace<'a>(
    workspace: Option<&str>,
    namespace: Option<&str>,
    accessible: &'a [Workspace],
) -> Result<&'a Workspace, Error> {
    let result = match_workspace(workspace, namespace, accessible);
    record_authz_decision(if result.is_ok() {
        AuthDecision::Allow
    } else {
        AuthDecision::Deny
    });
    result
}

fn match_workspace<'a>(
    workspace: Option<&str>,
    namespace: Option<&str>,
    accessible: &'a [Workspace],
) -> Result<&'a Workspace, Error> {
    let matched = match workspace {
        None => {
            let mut homes = accessible.iter().filter(|ws| ws.type_ == WorkspaceType::Home);
            match (homes.next(), homes.next()) {
                (Some(home), None) => home,
                _ => {
                    return Err(Error::Forbidden(
                        "unable to determine the home workspace".into(),
                    ))
                }
            }
        }
        Some(name) => accessible
            .iter()
            .find(|ws| ws.name == name)
            .ok_or_else(|| {
                debug!(workspace = %name, "Workspace not in the accessible set");
                Error::Forbidden(SPACE_NOT_AVAILABLE.into())
            })?,
    };

    if let Some(namespace) = namespace {
        if !matched.namespaces.iter().any(|ns| ns == namespace) {
            return Err(Error::Forbidden(format!(
                "access to namespace '{}' in workspace '{}' is forbidden",
                namespace, matched.name
            )));
        }
    }

    debug!(workspace = %matched.name, namespace = ?namespace, "Workspace access granted");
    Ok(matched)
}
