//! Read-only collaborator lookups
//!
//! The gateway never talks to the host cluster on the request path. Signups,
//! workspaces, member clusters, plugin configs and routes are read from
//! locally cached read models that a background process keeps in sync. This
//! module defines the typed seams the pipeline consumes; the gateway binary
//! provides the implementations.

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::auth::Identity;

/// Errors returned by directory lookups
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    /// The requested object is not in the read model
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Object kind
        kind: &'static str,
        /// Object name
        name: String,
    },

    /// The read model could not answer
    #[error("{0}")]
    Unavailable(String),
}

impl DirectoryError {
    /// Shorthand for [`DirectoryError::NotFound`]
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }
}

/// Result of a directory lookup
pub type DirectoryResult<T> = Result<T, DirectoryError>;

// ============================================================================
// Read Model Types
// ============================================================================

/// Provisioning record of a signed-up user
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Signup {
    /// Record name
    pub name: String,
    /// Cluster-safe username; empty until provisioned or once deactivated
    pub compliant_username: String,
    /// Member cluster hosting the user's home workspace
    pub cluster_name: String,
    /// API endpoint of that member cluster
    pub api_endpoint: String,
}

/// Workspace classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceType {
    /// The caller's own default workspace
    Home,
    /// A workspace shared with the caller
    Other,
}

/// A workspace as visible to a given caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    /// Workspace name
    pub name: String,
    /// Home or shared
    pub type_: WorkspaceType,
    /// Namespaces provisioned for the workspace
    pub namespaces: Vec<String>,
    /// Owning user
    pub owner: String,
    /// Caller's role, from the binding that grants access
    pub role: String,
    /// Member cluster the workspace lives on
    pub target_cluster: String,
}

/// A registered member cluster
#[derive(Clone)]
pub struct MemberCluster {
    /// Cluster name, unique among active clusters
    pub name: String,
    /// API server endpoint
    pub api_endpoint: String,
    /// Namespace of the member operator
    pub operator_namespace: String,
    /// Service account token the gateway presents to the cluster
    pub bearer_token: String,
    /// Route lookups on this cluster; `None` means plugins cannot be served
    pub routes: Option<Arc<dyn RouteLookup>>,
}

impl std::fmt::Debug for MemberCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemberCluster")
            .field("name", &self.name)
            .field("api_endpoint", &self.api_endpoint)
            .field("operator_namespace", &self.operator_namespace)
            .field("routes", &self.routes.is_some())
            .finish()
    }
}

/// Reference to the Route fronting a plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRef {
    /// Route namespace on the member cluster
    pub namespace: String,
    /// Route name
    pub name: String,
}

/// Proxy plugin configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyPlugin {
    /// Plugin name
    pub name: String,
    /// Target route, if configured
    pub route: Option<RouteRef>,
}

/// The parts of a Route the gateway routes on
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Route {
    /// `spec.port.targetPort`, when set
    pub target_port: Option<String>,
    /// `status.ingress[*].host`, in order
    pub ingress_hosts: Vec<String>,
}

impl Route {
    /// URL the route serves, if its ingress has been admitted
    ///
    /// The scheme follows the target port name: `http` gives `http://`,
    /// anything else `https://`.
    pub fn url(&self) -> Option<Result<Url, url::ParseError>> {
        let host = self.ingress_hosts.first()?;
        let scheme = match self.target_port.as_deref() {
            Some("http") => "http",
            _ => "https",
        };
        Some(Url::parse(&format!("{}://{}", scheme, host)))
    }
}

// ============================================================================
// Lookup Traits
// ============================================================================

/// Signup records by user
#[async_trait]
pub trait SignupService: Send + Sync {
    /// Signup for `user_id`, falling back to `username`
    ///
    /// `Ok(None)` when the user never signed up.
    async fn get_signup(&self, user_id: &str, username: &str) -> DirectoryResult<Option<Signup>>;
}

/// Workspaces accessible to a caller
#[async_trait]
pub trait WorkspaceDirectory: Send + Sync {
    /// Workspaces `identity` may access
    ///
    /// With `name` set, only that workspace is considered (including access
    /// inherited from parent workspaces).
    async fn list_workspaces(
        &self,
        identity: &Identity,
        name: Option<&str>,
    ) -> DirectoryResult<Vec<Workspace>>;

    /// Workspace by name, regardless of caller
    async fn get_workspace(&self, name: &str) -> DirectoryResult<Workspace>;
}

/// Currently registered member clusters
pub trait MemberClusterRegistry: Send + Sync {
    /// Snapshot of all ready member clusters
    fn member_clusters(&self) -> Vec<MemberCluster>;
}

/// Proxy plugin configs in the gateway's own namespace
#[async_trait]
pub trait PluginConfigs: Send + Sync {
    /// Plugin config by name
    async fn get_plugin(&self, name: &str) -> DirectoryResult<ProxyPlugin>;
}

/// Routes on one member cluster
#[async_trait]
pub trait RouteLookup: Send + Sync {
    /// Route by namespace and name
    async fn get_route(&self, namespace: &str, name: &str) -> DirectoryResult<Route>;
}

/// Banned user list
#[async_trait]
pub trait BannedUsers: Send + Sync {
    /// Whether `email` is banned
    async fn is_banned(&self, email: &str) -> DirectoryResult<bool>;
}
