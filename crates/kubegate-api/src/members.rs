//! Access resolution: which member cluster, which URL, as whom
//!
//! Given the caller and the workspace/plugin named in the path, picks the
//! member cluster that hosts the workspace, the URL to forward to (cluster API
//! or plugin route) and the identity to impersonate.

use std::sync::Arc;

use tracing::{debug, error};
use url::Url;

use crate::access::ClusterAccess;
use crate::auth::PUBLIC_VIEWER_USERNAME;
use crate::authorize::SPACE_NOT_AVAILABLE;
use crate::directory::{
    MemberCluster, MemberClusterRegistry, PluginConfigs, Signup, SignupService, WorkspaceDirectory,
};

/// Why access could not be resolved
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// No signup, or a signup without a compliant username
    #[error("user is not provisioned (yet)")]
    NotProvisioned,

    /// The signup lookup itself failed
    #[error("unable to get signup: {0}")]
    SignupLookup(String),

    /// The member cluster registry is empty
    #[error("no member clusters found")]
    NoMemberClusters,

    /// No member cluster matches the caller's signup
    #[error("no member cluster found for the user")]
    NoMemberClusterForUser,

    /// No member cluster matches the workspace's target cluster
    #[error("no member cluster found for space '{0}'")]
    NoMemberClusterForSpace(String),

    /// The named workspace could not be fetched; cause is logged only
    #[error("{}", SPACE_NOT_AVAILABLE)]
    SpaceNotAvailable,

    /// The member cluster cannot look up plugin routes
    #[error("client for member {0} not set")]
    MemberClientNotSet(String),

    /// The plugin config could not be fetched
    #[error("unable to get proxy config {name}: {cause}")]
    PluginConfig {
        /// Plugin name
        name: String,
        /// Lookup error
        cause: String,
    },

    /// The plugin config has no route reference
    #[error("the proxy plugin config {0} does not define an openshift route endpoint")]
    PluginRouteNotDefined(String),

    /// The plugin route could not be fetched
    #[error("unable to get route {route}: {cause}")]
    RouteLookup {
        /// `namespace/name` of the route
        route: String,
        /// Lookup error
        cause: String,
    },

    /// The plugin route has no ingress host yet
    #[error("the route {0:?} has not initialized to the point where the status ingress is populated")]
    RouteNotAdmitted(String),

    /// The resolved endpoint is not a valid URL
    #[error("invalid target URL {url:?}: {cause}")]
    InvalidUrl {
        /// Offending URL
        url: String,
        /// Parse error
        cause: String,
    },
}

/// Resolves [`ClusterAccess`] for a caller
pub struct AccessResolver {
    signups: Arc<dyn SignupService>,
    workspaces: Arc<dyn WorkspaceDirectory>,
    members: Arc<dyn MemberClusterRegistry>,
    plugins: Arc<dyn PluginConfigs>,
}

impl AccessResolver {
    /// Create a resolver over the given read models
    pub fn new(
        signups: Arc<dyn SignupService>,
        workspaces: Arc<dyn WorkspaceDirectory>,
        members: Arc<dyn MemberClusterRegistry>,
        plugins: Arc<dyn PluginConfigs>,
    ) -> Self {
        Self {
            signups,
            workspaces,
            members,
            plugins,
        }
    }

    /// Resolve where a request goes and whom it impersonates
    ///
    /// `workspace == None` routes to the caller's home workspace; `plugin ==
    /// None` targets the member cluster API endpoint directly.
    pub async fn get_cluster_access(
        &self,
        user_id: &str,
        username: &str,
        workspace: Option<&str>,
        plugin: Option<&str>,
        public_viewer_enabled: bool,
    ) -> Result<ClusterAccess, AccessError> {
        match workspace {
            None => self.default_workspace_access(user_id, username, plugin).await,
            Some(name) => {
                self.space_access(user_id, username, name, plugin, public_viewer_enabled)
                    .await
            }
        }
    }

    async fn default_workspace_access(
        &self,
        user_id: &str,
        username: &str,
        plugin: Option<&str>,
    ) -> Result<ClusterAccess, AccessError> {
        let signup = self.provisioned_signup(user_id, username).await?;

        let members = self.registered_members()?;
        let member = members
            .iter()
            .find(|m| m.api_endpoint == signup.api_endpoint && m.name == signup.cluster_name)
            .ok_or(AccessError::NoMemberClusterForUser)?;

        self.access_for_member(member, &signup.compliant_username, plugin)
            .await
    }

    async fn space_access(
        &self,
        user_id: &str,
        username: &str,
        space_name: &str,
        plugin: Option<&str>,
        public_viewer_enabled: bool,
    ) -> Result<ClusterAccess, AccessError> {
        let impersonated = if public_viewer_enabled && username == PUBLIC_VIEWER_USERNAME {
            username.to_string()
        } else {
            self.provisioned_signup(user_id, username)
                .await?
                .compliant_username
        };

        let space = self.workspaces.get_workspace(space_name).await.map_err(|e| {
            error!(workspace = %space_name, error = %e, "Unable to get target cluster for workspace");
            AccessError::SpaceNotAvailable
        })?;

        let members = self.registered_members()?;
        let Some(member) = members.iter().find(|m| m.name == space.target_cluster) else {
            error!(
                workspace = %space.name,
                target_cluster = %space.target_cluster,
                "No matching target cluster for the space"
            );
            return Err(AccessError::NoMemberClusterForSpace(space.name));
        };

        self.access_for_member(member, &impersonated, plugin).await
    }

    /// Whether the caller's signup is ready
    ///
    /// Only a failed lookup is an error; a missing or unprovisioned signup
    /// answers `false`.
    pub async fn is_provisioned(&self, user_id: &str, username: &str) -> Result<bool, AccessError> {
        let signup = self
            .signups
            .get_signup(user_id, username)
            .await
            .map_err(|e| AccessError::SignupLookup(e.to_string()))?;

        Ok(signup.is_some_and(|s| !s.compliant_username.is_empty()))
    }

    async fn provisioned_signup(&self, user_id: &str, username: &str) -> Result<Signup, AccessError> {
        let signup = self
            .signups
            .get_signup(user_id, username)
            .await
            .map_err(|e| AccessError::SignupLookup(e.to_string()))?;

        match signup {
            Some(signup) if !signup.compliant_username.is_empty() => Ok(signup),
            other => {
                error!(user_id = %user_id, username = %username, signup = ?other, "User is not provisioned (yet)");
                Err(AccessError::NotProvisioned)
            }
        }
    }

    fn registered_members(&self) -> Result<Vec<MemberCluster>, AccessError> {
        let members = self.members.member_clusters();
        if members.is_empty() {
            return Err(AccessError::NoMemberClusters);
        }
        Ok(members)
    }

    async fn access_for_member(
        &self,
        member: &MemberCluster,
        username: &str,
        plugin: Option<&str>,
    ) -> Result<ClusterAccess, AccessError> {
        let api_url = self.member_url(member, plugin).await?;
        debug!(cluster = %member.name, url = %api_url, user = %username, "Resolved cluster access");
        Ok(ClusterAccess::new(
            api_url,
            member.bearer_token.clone(),
            username,
        ))
    }

    async fn member_url(
        &self,
        member: &MemberCluster,
        plugin: Option<&str>,
    ) -> Result<Url, AccessError> {
        let Some(plugin) = plugin else {
            return parse_url(&member.api_endpoint);
        };

        let routes = member
            .routes
            .as_ref()
            .ok_or_else(|| AccessError::MemberClientNotSet(member.name.clone()))?;

        let config = self
            .plugins
            .get_plugin(plugin)
            .await
            .map_err(|e| AccessError::PluginConfig {
                name: plugin.to_string(),
                cause: e.to_string(),
            })?;

        let route_ref = config
            .route
            .ok_or_else(|| AccessError::PluginRouteNotDefined(plugin.to_string()))?;
        let key = format!("{}/{}", route_ref.namespace, route_ref.name);

        let route = routes
            .get_route(&route_ref.namespace, &route_ref.name)
            .await
            .map_err(|e| AccessError::RouteLookup {
                route: key.clone(),
                cause: e.to_string(),
            })?;

        route
            .url()
            .ok_or(AccessError::RouteNotAdmitted(key))?
            .map_err(|e| AccessError::InvalidUrl {
                url: route.ingress_hosts.first().cloned().unwrap_or_default(),
                cause: e.to_string(),
            })
    }
}

fn parse_url(raw: &str) -> Result<Url, AccessError> {
    Url::parse(raw).map_err(|e| AccessError::InvalidUrl {
        url: raw.to_string(),
        cause: e.to_string(),
    })
}
