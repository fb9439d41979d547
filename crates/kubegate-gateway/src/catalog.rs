//! File-backed read model
//!
//! The catalog is a YAML document describing member clusters, signups,
//! spaces, space bindings, proxy plugins and banned users. It is loaded at
//! startup and reloaded on an interval; lookups read the current snapshot and
//! never touch the file. A reload that fails keeps the previous snapshot.
//!
//! ```yaml
//! memberClusters:
//!   - name: member-1
//!     apiEndpoint: https://api.member-1:6443
//!     tokenFile: /var/run/secrets/member-1/token
//!     watchRoutes: true
//! signups:
//!   - name: smith
//!     userId: 2a7f...
//!     compliantUsername: smith
//!     clusterName: member-1
//! spaces:
//!   - name: smith
//!     targetCluster: member-1
//!     owner: smith
//!     namespaces: [smith-dev, smith-stage]
//! spaceBindings:
//!   - space: smith
//!     user: smith
//!     role: admin
//! proxyPlugins:
//!   - name: tekton-results
//!     namespace: toolchain-host-operator
//!     routeNamespace: tekton-results
//!     routeName: tekton-results
//! bannedEmails:
//!   - spammer@example.com
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{debug, info, warn};

use kubegate_api::auth::PUBLIC_VIEWER_USERNAME;
use kubegate_api::{
    BannedUsers, DirectoryError, DirectoryResult, Identity, MemberCluster, MemberClusterRegistry,
    PluginConfigs, ProxyPlugin, RouteLookup, RouteRef, Signup, SignupService, Workspace,
    WorkspaceDirectory, WorkspaceType,
};

/// Parent chains longer than this are treated as cycles
const MAX_SPACE_DEPTH: usize = 16;

/// Errors loading the catalog
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The catalog file could not be read
    #[error("failed to read catalog {path}: {source}")]
    Read {
        /// Catalog path
        path: PathBuf,
        /// I/O error
        #[source]
        source: std::io::Error,
    },

    /// The catalog is not valid YAML for the expected shape
    #[error("failed to parse catalog {path}: {source}")]
    Parse {
        /// Catalog path
        path: PathBuf,
        /// Parse error
        #[source]
        source: serde_yaml::Error,
    },

    /// A member cluster token file could not be read
    #[error("failed to read token file {path} for member {cluster}: {source}")]
    TokenFile {
        /// Member cluster name
        cluster: String,
        /// Token file path
        path: PathBuf,
        /// I/O error
        #[source]
        source: std::io::Error,
    },

    /// The document is well-formed but inconsistent
    #[error("invalid catalog: {0}")]
    Invalid(String),

    /// The blocking reload task panicked or was cancelled
    #[error("catalog reload task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

// ============================================================================
// Document
// ============================================================================

/// Catalog file contents
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogDocument {
    /// Registered member clusters
    #[serde(default)]
    pub member_clusters: Vec<MemberClusterEntry>,
    /// Provisioned users
    #[serde(default)]
    pub signups: Vec<SignupEntry>,
    /// Spaces, each backing one workspace
    #[serde(default)]
    pub spaces: Vec<SpaceEntry>,
    /// Grants of space access to users
    #[serde(default)]
    pub space_bindings: Vec<SpaceBindingEntry>,
    /// Proxy plugin configs
    #[serde(default)]
    pub proxy_plugins: Vec<ProxyPluginEntry>,
    /// Banned email addresses
    #[serde(default)]
    pub banned_emails: Vec<String>,
}

/// A member cluster entry
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberClusterEntry {
    /// Cluster name
    pub name: String,
    /// API server endpoint
    pub api_endpoint: String,
    /// Namespace of the member operator
    #[serde(default)]
    pub operator_namespace: String,
    /// Inline service account token
    #[serde(default)]
    pub token: Option<String>,
    /// File holding the service account token
    #[serde(default)]
    pub token_file: Option<PathBuf>,
    /// Watch plugin routes on this cluster
    #[serde(default)]
    pub watch_routes: bool,
}

/// A signup entry
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupEntry {
    /// Username
    pub name: String,
    /// Subject claim of the user's token
    #[serde(default)]
    pub user_id: String,
    /// Provisioned name; empty while not provisioned
    #[serde(default)]
    pub compliant_username: String,
    /// Member cluster hosting the home space
    #[serde(default)]
    pub cluster_name: String,
    /// API endpoint of that cluster; defaults to the member's endpoint
    #[serde(default)]
    pub api_endpoint: Option<String>,
}

/// A space entry
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceEntry {
    /// Space name
    pub name: String,
    /// Member cluster the space is provisioned on
    pub target_cluster: String,
    /// Parent space whose bindings are inherited
    #[serde(default)]
    pub parent_space: Option<String>,
    /// Provisioned namespaces
    #[serde(default)]
    pub namespaces: Vec<String>,
    /// Username of the creator
    #[serde(default)]
    pub owner: String,
}

/// A space binding entry
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceBindingEntry {
    /// Bound space
    pub space: String,
    /// Compliant username granted access
    pub user: String,
    /// Space role
    #[serde(default)]
    pub role: String,
}

/// A proxy plugin entry
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyPluginEntry {
    /// Plugin name
    pub name: String,
    /// Namespace the config lives in
    pub namespace: String,
    /// Route namespace on the member cluster
    #[serde(default)]
    pub route_namespace: Option<String>,
    /// Route name on the member cluster
    #[serde(default)]
    pub route_name: Option<String>,
}

// ============================================================================
// Snapshot
// ============================================================================

/// One consistent view of the catalog
#[derive(Debug, Default)]
struct Snapshot {
    document: CatalogDocument,
    /// Member cluster tokens, resolved from inline values or token files
    tokens: HashMap<String, String>,
}

impl Snapshot {
    fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let document: CatalogDocument =
            serde_yaml::from_str(&raw).map_err(|source| CatalogError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_document(document)
    }

    fn from_document(document: CatalogDocument) -> Result<Self, CatalogError> {
        let mut tokens = HashMap::new();
        for member in &document.member_clusters {
            if tokens.contains_key(&member.name) {
                return Err(CatalogError::Invalid(format!(
                    "duplicate member cluster {}",
                    member.name
                )));
            }
            let token = match (&member.token, &member.token_file) {
                (Some(token), _) => token.clone(),
                (None, Some(path)) => std::fs::read_to_string(path)
                    .map(|t| t.trim().to_string())
                    .map_err(|source| CatalogError::TokenFile {
                        cluster: member.name.clone(),
                        path: path.clone(),
                        source,
                    })?,
                (None, None) => {
                    return Err(CatalogError::Invalid(format!(
                        "member cluster {} has neither token nor tokenFile",
                        member.name
                    )))
                }
            };
            tokens.insert(member.name.clone(), token);
        }

        Ok(Self { document, tokens })
    }

    fn signup(&self, user_id: &str, username: &str) -> Option<&SignupEntry> {
        let signups = &self.document.signups;
        signups
            .iter()
            .find(|s| !user_id.is_empty() && s.user_id == user_id)
            .or_else(|| {
                signups
                    .iter()
                    .find(|s| !username.is_empty() && s.name == username)
            })
    }

    /// Signup name and compliant username of a provisioned caller
    fn signup_name_and_user(&self, identity: &Identity) -> Option<(String, String)> {
        if identity.is_public_viewer() {
            return Some((
                PUBLIC_VIEWER_USERNAME.to_string(),
                PUBLIC_VIEWER_USERNAME.to_string(),
            ));
        }
        self
            .signup(&identity.user_id, &identity.username)
            .filter(|s| !s.compliant_username.is_empty())
            .map(|s| (s.name.clone(), s.compliant_username.clone()))
    }

    fn space(&self, name: &str) -> Option<&SpaceEntry> {
        self.document.spaces.iter().find(|s| s.name == name)
    }

    fn member(&self, name: &str) -> Option<&MemberClusterEntry> {
        self.document.member_clusters.iter().find(|m| m.name == name)
    }

    fn binding(&self, user: &str, space: &str) -> Option<&SpaceBindingEntry> {
        self.document
            .space_bindings
            .iter()
            .find(|b| b.user == user && b.space == space)
    }

    /// Binding granting `user` access to `space`, directly or through an ancestor
    fn binding_recursive(&self, user: &str, space: &SpaceEntry) -> Option<&SpaceBindingEntry> {
        let mut visited = HashSet::new();
        let mut current = Some(space);
        while let Some(space) = current {
            if !visited.insert(space.name.as_str()) || visited.len() > MAX_SPACE_DEPTH {
                warn!(space = %space.name, "Space parent chain too deep or cyclic");
                return None;
            }
            if let Some(binding) = self.binding(user, &space.name) {
                return Some(binding);
            }
            current = space.parent_space.as_deref().and_then(|p| self.space(p));
        }
        None
    }
}

fn workspace(space: &SpaceEntry, signup_name: Option<&str>, role: &str) -> Workspace {
    let type_ = match signup_name {
        Some(name) if name == space.owner => WorkspaceType::Home,
        _ => WorkspaceType::Other,
    };
    Workspace {
        name: space.name.clone(),
        type_,
        namespaces: space.namespaces.clone(),
        owner: space.owner.clone(),
        role: role.to_string(),
        target_cluster: space.target_cluster.clone(),
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Hot-reloadable read model implementing every directory lookup
pub struct Catalog {
    path: PathBuf,
    namespace: String,
    snapshot: RwLock<Arc<Snapshot>>,
    routes: RwLock<HashMap<String, Arc<dyn RouteLookup>>>,
}

impl Catalog {
    /// Load the catalog at `path`
    ///
    /// Plugin configs are only visible when they live in `namespace`.
    pub fn load(path: impl Into<PathBuf>, namespace: impl Into<String>) -> Result<Self, CatalogError> {
        let path = path.into();
        let snapshot = Snapshot::load(&path)?;
        info!(
            path = %path.display(),
            members = snapshot.document.member_clusters.len(),
            spaces = snapshot.document.spaces.len(),
            "Catalog loaded"
        );

        Ok(Self {
            path,
            namespace: namespace.into(),
            snapshot: RwLock::new(Arc::new(snapshot)),
            routes: RwLock::new(HashMap::new()),
        })
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.read().clone()
    }

    /// Member cluster entries of the current snapshot
    pub fn member_entries(&self) -> Vec<MemberClusterEntry> {
        self.snapshot().document.member_clusters.clone()
    }

    /// Serve plugin route lookups for `cluster` from `routes`
    pub fn attach_routes(&self, cluster: &str, routes: Arc<dyn RouteLookup>) {
        self.routes.write().insert(cluster.to_string(), routes);
    }

    /// Re-read the catalog file, keeping the current snapshot on failure
    ///
    /// File reads run on the blocking pool.
    pub async fn reload(&self) -> Result<(), CatalogError> {
        let path = self.path.clone();
        let snapshot = tokio::task::spawn_blocking(move || Snapshot::load(&path)).await??;
        *self.snapshot.write() = Arc::new(snapshot);
        debug!(path = %self.path.display(), "Catalog reloaded");
        Ok(())
    }

    /// Spawn a background task reloading the catalog every `interval`
    pub fn spawn_refresh(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let catalog = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = catalog.reload().await {
                    warn!(error = %e, "Catalog reload failed, keeping previous snapshot");
                }
            }
        })
    }
}

#[async_trait]
impl SignupService for Catalog {
    async fn get_signup(&self, user_id: &str, username: &str) -> DirectoryResult<Option<Signup>> {
        let snapshot = self.snapshot();
        Ok(snapshot.signup(user_id, username).map(|entry| {
            let api_endpoint = entry.api_endpoint.clone().unwrap_or_else(|| {
                snapshot
                    .member(&entry.cluster_name)
                    .map(|m| m.api_endpoint.clone())
                    .unwrap_or_default()
            });
            Signup {
                name: entry.name.clone(),
                compliant_username: entry.compliant_username.clone(),
                cluster_name: entry.cluster_name.clone(),
                api_endpoint,
            }
        }))
    }
}

#[async_trait]
impl WorkspaceDirectory for Catalog {
    async fn list_workspaces(
        &self,
        identity: &Identity,
        name: Option<&str>,
    ) -> DirectoryResult<Vec<Workspace>> {
        let snapshot = self.snapshot();
        let Some((signup_name, user)) = snapshot.signup_name_and_user(identity) else {
            debug!(username = %identity.username, "No provisioned signup, no workspaces");
            return Ok(Vec::new());
        };

        if let Some(name) = name {
            let workspaces = snapshot
                .space(name)
                .and_then(|space| {
                    snapshot
                        .binding_recursive(&user, space)
                        .map(|binding| workspace(space, Some(signup_name.as_str()), &binding.role))
                })
                .into_iter()
                .collect();
            return Ok(workspaces);
        }

        let mut seen = HashSet::new();
        let mut workspaces = Vec::new();
        for binding in snapshot
            .document
            .space_bindings
            .iter()
            .filter(|b| b.user == user)
        {
            if !seen.insert(binding.space.as_str()) {
                continue;
            }
            match snapshot.space(&binding.space) {
                Some(space) => {
                    workspaces.push(workspace(space, Some(signup_name.as_str()), &binding.role))
                }
                None => warn!(space = %binding.space, user = %user, "Space binding refers to unknown space"),
            }
        }
        Ok(workspaces)
    }

    async fn get_workspace(&self, name: &str) -> DirectoryResult<Workspace> {
        self.snapshot()
            .space(name)
            .map(|space| workspace(space, None, ""))
            .ok_or_else(|| DirectoryError::not_found("space", name))
    }
}

impl MemberClusterRegistry for Catalog {
    fn member_clusters(&self) -> Vec<MemberCluster> {
        let snapshot = self.snapshot();
        let routes = self.routes.read();
        snapshot
            .document
            .member_clusters
            .iter()
            .map(|entry| MemberCluster {
                name: entry.name.clone(),
                api_endpoint: entry.api_endpoint.clone(),
                operator_namespace: entry.operator_namespace.clone(),
                bearer_token: snapshot.tokens.get(&entry.name).cloned().unwrap_or_default(),
                routes: routes.get(&entry.name).cloned(),
            })
            .collect()
    }
}

#[async_trait]
impl PluginConfigs for Catalog {
    async fn get_plugin(&self, name: &str) -> DirectoryResult<ProxyPlugin> {
        let snapshot = self.snapshot();
        let entry = snapshot
            .document
            .proxy_plugins
            .iter()
            .find(|p| p.name == name && p.namespace == self.namespace)
            .ok_or_else(|| DirectoryError::not_found("proxyplugin", name))?;

        let route = match (&entry.route_namespace, &entry.route_name) {
            (Some(namespace), Some(name)) if !namespace.is_empty() && !name.is_empty() => {
                Some(RouteRef {
                    namespace: namespace.clone(),
                    name: name.clone(),
                })
            }
            _ => None,
        };

        Ok(ProxyPlugin {
            name: entry.name.clone(),
            route,
        })
    }
}

#[async_trait]
impl BannedUsers for Catalog {
    async fn is_banned(&self, email: &str) -> DirectoryResult<bool> {
        Ok(self
            .snapshot()
            .document
            .banned_emails
            .iter()
            .any(|banned| banned.eq_ignore_ascii_case(email)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, Write};

    const CATALOG: &str = r#"
memberClusters:
  - name: member-1
    apiEndpoint: https://api.member-1:6443
    operatorNamespace: toolchain-member-operator
    token: token-1
  - name: member-2
    apiEndpoint: https://api.member-2:6443
    token: token-2
signups:
  - name: smith
    userId: user-1
    compliantUsername: smith2
    clusterName: member-2
  - name: pending
    userId: user-2
spaces:
  - name: smith2
    targetCluster: member-2
    owner: smith
    namespaces: [smith2-dev, smith2-stage]
  - name: teamspace
    targetCluster: member-1
    owner: alice
    namespaces: [team-dev]
  - name: team-child
    targetCluster: member-1
    parentSpace: teamspace
    owner: alice
    namespaces: [child-dev]
  - name: community
    targetCluster: member-1
    owner: bob
spaceBindings:
  - space: smith2
    user: smith2
    role: admin
  - space: teamspace
    user: smith2
    role: contributor
  - space: community
    user: kubesaw-authenticated
    role: viewer
  - space: deleted-space
    user: smith2
proxyPlugins:
  - name: tekton-results
    namespace: toolchain-host-operator
    routeNamespace: tekton-results
    routeName: tekton-results
  - name: no-route
    namespace: toolchain-host-operator
  - name: elsewhere
    namespace: other-namespace
    routeNamespace: x
    routeName: y
bannedEmails:
  - Spammer@example.com
"#;

    fn write_catalog(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn catalog() -> (Catalog, tempfile::NamedTempFile) {
        let file = write_catalog(CATALOG);
        let catalog = Catalog::load(file.path(), "toolchain-host-operator").unwrap();
        (catalog, file)
    }

    fn smith() -> Identity {
        Identity {
            user_id: "user-1".into(),
            username: "smith".into(),
            email: None,
        }
    }

    #[tokio::test]
    async fn test_signup_lookup_prefers_user_id() {
        let (catalog, _file) = catalog();

        let signup = catalog.get_signup("user-1", "someone-else").await.unwrap().unwrap();
        assert_eq!(signup.compliant_username, "smith2");
        assert_eq!(signup.api_endpoint, "https://api.member-2:6443");

        let by_name = catalog.get_signup("", "smith").await.unwrap().unwrap();
        assert_eq!(by_name.name, "smith");

        assert!(catalog.get_signup("nobody", "nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_workspaces() {
        let (catalog, _file) = catalog();

        let workspaces = catalog.list_workspaces(&smith(), None).await.unwrap();
        let names: Vec<_> = workspaces.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["smith2", "teamspace"]);
        assert_eq!(workspaces[0].type_, WorkspaceType::Home);
        assert_eq!(workspaces[0].namespaces, vec!["smith2-dev", "smith2-stage"]);
        assert_eq!(workspaces[0].role, "admin");
        assert_eq!(workspaces[1].type_, WorkspaceType::Other);
        assert_eq!(workspaces[1].role, "contributor");
    }

    #[tokio::test]
    async fn test_named_workspace_inherits_parent_bindings() {
        let (catalog, _file) = catalog();

        let child = catalog
            .list_workspaces(&smith(), Some("team-child"))
            .await
            .unwrap();
        assert_eq!(child.len(), 1);
        assert_eq!(child[0].namespaces, vec!["child-dev"]);
        assert_eq!(child[0].role, "contributor");

        let community = catalog
            .list_workspaces(&smith(), Some("community"))
            .await
            .unwrap();
        assert!(community.is_empty());

        let missing = catalog.list_workspaces(&smith(), Some("ghost")).await.unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_public_viewer_listing() {
        let (catalog, _file) = catalog();

        let shared = catalog
            .list_workspaces(&Identity::public_viewer(), Some("community"))
            .await
            .unwrap();
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].type_, WorkspaceType::Other);
    }

    #[tokio::test]
    async fn test_unprovisioned_user_has_no_workspaces() {
        let (catalog, _file) = catalog();
        let pending = Identity {
            user_id: "user-2".into(),
            username: "pending".into(),
            email: None,
        };
        assert!(catalog.list_workspaces(&pending, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_workspace() {
        let (catalog, _file) = catalog();

        let ws = catalog.get_workspace("teamspace").await.unwrap();
        assert_eq!(ws.target_cluster, "member-1");
        assert_eq!(ws.owner, "alice");

        let err = catalog.get_workspace("ghost").await.unwrap_err();
        assert_eq!(err, DirectoryError::not_found("space", "ghost"));
    }

    #[test]
    fn test_member_clusters_carry_tokens_and_routes() {
        let (catalog, _file) = catalog();

        let members = catalog.member_clusters();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].bearer_token, "token-1");
        assert!(members[0].routes.is_none());

        struct NoRoutes;
        #[async_trait]
        impl RouteLookup for NoRoutes {
            async fn get_route(&self, namespace: &str, name: &str) -> DirectoryResult<kubegate_api::Route> {
                Err(DirectoryError::not_found("route", format!("{}/{}", namespace, name)))
            }
        }

        catalog.attach_routes("member-1", Arc::new(NoRoutes));
        let members = catalog.member_clusters();
        assert!(members[0].routes.is_some());
        assert!(members[1].routes.is_none());
    }

    #[tokio::test]
    async fn test_plugins_scoped_to_namespace() {
        let (catalog, _file) = catalog();

        let plugin = catalog.get_plugin("tekton-results").await.unwrap();
        assert_eq!(
            plugin.route,
            Some(RouteRef {
                namespace: "tekton-results".into(),
                name: "tekton-results".into(),
            })
        );

        assert!(catalog.get_plugin("no-route").await.unwrap().route.is_none());
        assert!(catalog.get_plugin("elsewhere").await.is_err());
    }

    #[tokio::test]
    async fn test_banned_emails_case_insensitive() {
        let (catalog, _file) = catalog();
        assert!(catalog.is_banned("spammer@example.com").await.unwrap());
        assert!(!catalog.is_banned("smith@example.com").await.unwrap());
    }

    #[test]
    fn test_token_file() {
        let token = write_catalog("file-token\n");
        let file = write_catalog(&format!(
            "memberClusters:\n  - name: m\n    apiEndpoint: https://m\n    tokenFile: {}\n",
            token.path().display()
        ));

        let catalog = Catalog::load(file.path(), "ns").unwrap();
        assert_eq!(catalog.member_clusters()[0].bearer_token, "file-token");
    }

    #[test]
    fn test_member_without_token_rejected() {
        let file = write_catalog("memberClusters:\n  - name: m\n    apiEndpoint: https://m\n");
        assert!(matches!(
            Catalog::load(file.path(), "ns"),
            Err(CatalogError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_reload_picks_up_changes() {
        let (catalog, mut file) = catalog();

        file.as_file_mut().set_len(0).unwrap();
        file.rewind().unwrap();
        file.write_all(
            b"memberClusters:\n  - name: member-3\n    apiEndpoint: https://api.member-3:6443\n    token: token-3\n",
        )
        .unwrap();

        catalog.reload().await.unwrap();
        let members = catalog.member_clusters();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].name, "member-3");
        assert!(catalog.get_workspace("teamspace").await.is_err());
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_snapshot() {
        let (catalog, mut file) = catalog();

        file.as_file_mut().set_len(0).unwrap();
        file.rewind().unwrap();
        file.write_all(b"memberClusters: [not, a, member]").unwrap();

        assert!(matches!(catalog.reload().await, Err(CatalogError::Parse { .. })));
        assert_eq!(catalog.member_clusters().len(), 2);
    }
}
