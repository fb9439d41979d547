//! Request path parsing for workspace and plugin routing
//!
//! Inbound paths may be prefixed with `/plugins/<name>` and/or
//! `/workspaces/<name>`. Both prefixes are removed before the request is
//! forwarded; the remainder is the path on the member cluster or plugin route.

use crate::error::Error;

const PLUGINS_PREFIX: &str = "/plugins/";
const WORKSPACES_PREFIX: &str = "/workspaces/";

/// Routing information carried by the request path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceContext {
    /// Plugin whose route should receive the request
    pub plugin: Option<String>,
    /// Workspace named in the path; `None` means the caller's home workspace
    pub workspace: Option<String>,
    /// Path with the plugin and workspace prefixes removed
    pub path: String,
}

/// Split an inbound path into plugin, workspace and forwarded path.
///
/// # Examples
///
/// ```
/// use kubegate_api::routing::workspace_context;
///
/// let ctx = workspace_context("/workspaces/mycoolworkspace/api/pods").unwrap();
/// assert_eq!(ctx.workspace.as_deref(), Some("mycoolworkspace"));
/// assert_eq!(ctx.path, "/api/pods");
///
/// let ctx = workspace_context("/plugins/tekton-results/foo").unwrap();
/// assert_eq!(ctx.plugin.as_deref(), Some("tekton-results"));
/// assert_eq!(ctx.path, "/foo");
/// ```
pub fn workspace_context(path: &str) -> Result<WorkspaceContext, Error> {
    let mut remaining = path;
    let mut plugin = None;

    if remaining.starts_with(PLUGINS_PREFIX) {
        let name = remaining.split('/').nth(2).unwrap_or_default();
        if name.trim().is_empty() {
            return Err(Error::BadRequest(format!(
                "path {:?} not a proxied route request",
                path
            )));
        }
        plugin = Some(name.to_string());
        remaining = &remaining[PLUGINS_PREFIX.len() + name.len()..];
    }

    let mut workspace = None;
    if remaining.starts_with(WORKSPACES_PREFIX) {
        let segments: Vec<&str> = remaining.split('/').collect();
        // ["", "workspaces", "<name>", "api", ...] without a plugin,
        // ["", "workspaces", "<name>", ...] with one
        let (min_segments, expected_format) = if plugin.is_some() {
            (3, "/workspaces/<workspace_name>/<optional path>")
        } else {
            (4, "/workspaces/<workspace_name>/api/...")
        };
        let name = segments.get(2).copied().unwrap_or_default();
        if segments.len() < min_segments || name.is_empty() {
            return Err(Error::BadRequest(format!(
                "workspace request path has too few segments '{}'; expected path format: {}",
                remaining, expected_format
            )));
        }
        workspace = Some(name.to_string());
        remaining = &remaining[WORKSPACES_PREFIX.len() + name.len()..];
    }

    Ok(WorkspaceContext {
        plugin,
        workspace,
        path: remaining.to_string(),
    })
}

/// Extract the namespace from a `/namespaces/<name>/...` segment.
///
/// # Examples
///
/// ```
/// use kubegate_api::routing::namespace_from_path;
///
/// assert_eq!(namespace_from_path("/api/v1/namespaces/dev/pods"), Some("dev"));
/// assert_eq!(namespace_from_path("/api/v1/pods"), None);
/// ```
pub fn namespace_from_path(path: &str) -> Option<&str> {
    let mut segments = path.split('/');
    segments.find(|s| *s == "namespaces")?;
    segments.next().filter(|s| !s.is_empty())
}

/// Join a base path and a request path with exactly one slash between them.
///
/// # Examples
///
/// ```
/// use kubegate_api::routing::single_joining_slash;
///
/// assert_eq!(single_joining_slash("a/", "/b"), "a/b");
/// assert_eq!(single_joining_slash("a", "b"), "a/b");
/// ```
pub fn single_joining_slash(a: &str, b: &str) -> String {
    match (a.ends_with('/'), b.starts_with('/')) {
        (true, true) => format!("{}{}", a, &b[1..]),
        (false, false) => format!("{}/{}", a, b),
        _ => format!("{}{}", a, b),
    }
}
