//! In-memory read models for tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::Identity;
use crate::directory::{
    BannedUsers, DirectoryError, DirectoryResult, MemberCluster, MemberClusterRegistry,
    PluginConfigs, ProxyPlugin, Route, RouteLookup, Signup, SignupService, Workspace,
    WorkspaceDirectory, WorkspaceType,
};
use crate::members::AccessResolver;

pub(crate) fn member(name: &str, api_endpoint: &str, token: &str) -> MemberCluster {
    MemberCluster {
        name: name.to_string(),
        api_endpoint: api_endpoint.to_string(),
        operator_namespace: "toolchain-member-operator".to_string(),
        bearer_token: token.to_string(),
        routes: None,
    }
}

pub(crate) fn workspace(
    name: &str,
    type_: WorkspaceType,
    target_cluster: &str,
    namespaces: &[&str],
) -> Workspace {
    let (owner, role) = match type_ {
        WorkspaceType::Home => (name.to_string(), "admin"),
        WorkspaceType::Other => (format!("{}-owner", name), "contributor"),
    };
    Workspace {
        name: name.to_string(),
        type_,
        namespaces: namespaces.iter().map(|s| s.to_string()).collect(),
        owner,
        role: role.to_string(),
        target_cluster: target_cluster.to_string(),
    }
}

/// Every directory seam backed by vectors
#[derive(Default)]
pub(crate) struct FakeDirectory {
    signups: Vec<(String, String, Signup)>,
    workspaces: Vec<Workspace>,
    bindings: Vec<(String, String)>,
    members: Vec<MemberCluster>,
    plugins: Vec<ProxyPlugin>,
    banned: Vec<String>,
    list_error: Option<String>,
    banned_error: Option<String>,
    signup_lookups: AtomicUsize,
}

impl FakeDirectory {
    pub(crate) fn with_signup(
        mut self,
        user_id: &str,
        username: &str,
        compliant_username: &str,
        cluster_name: &str,
        api_endpoint: &str,
    ) -> Self {
        self.signups.push((
            user_id.to_string(),
            username.to_string(),
            Signup {
                name: username.to_string(),
                compliant_username: compliant_username.to_string(),
                cluster_name: cluster_name.to_string(),
                api_endpoint: api_endpoint.to_string(),
            },
        ));
        self
    }

    pub(crate) fn with_workspace(mut self, workspace: Workspace) -> Self {
        self.workspaces.push(workspace);
        self
    }

    /// Grant `user` (a compliant username) access to `space`
    pub(crate) fn with_binding(mut self, user: &str, space: &str) -> Self {
        self.bindings.push((user.to_string(), space.to_string()));
        self
    }

    pub(crate) fn with_member(mut self, member: MemberCluster) -> Self {
        self.members.push(member);
        self
    }

    pub(crate) fn with_plugin(mut self, plugin: ProxyPlugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub(crate) fn with_banned(mut self, email: &str) -> Self {
        self.banned.push(email.to_string());
        self
    }

    pub(crate) fn with_list_error(mut self, message: &str) -> Self {
        self.list_error = Some(message.to_string());
        self
    }

    pub(crate) fn with_banned_error(mut self, message: &str) -> Self {
        self.banned_error = Some(message.to_string());
        self
    }

    pub(crate) fn signup_lookups(&self) -> usize {
        self.signup_lookups.load(Ordering::SeqCst)
    }

    pub(crate) fn resolver(self: &Arc<Self>) -> AccessResolver {
        AccessResolver::new(
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
        )
    }

    fn find_signup(&self, user_id: &str, username: &str) -> Option<Signup> {
        self.signups
            .iter()
            .find(|(id, _, _)| !user_id.is_empty() && id == user_id)
            .or_else(|| self.signups.iter().find(|(_, name, _)| name == username))
            .map(|(_, _, signup)| signup.clone())
    }
}

#[async_trait]
impl SignupService for FakeDirectory {
    async fn get_signup(&self, user_id: &str, username: &str) -> DirectoryResult<Option<Signup>> {
        self.signup_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.find_signup(user_id, username))
    }
}

#[async_trait]
impl WorkspaceDirectory for FakeDirectory {
    async fn list_workspaces(
        &self,
        identity: &Identity,
        name: Option<&str>,
    ) -> DirectoryResult<Vec<Workspace>> {
        if let Some(message) = &self.list_error {
            return Err(DirectoryError::Unavailable(message.clone()));
        }

        let user = if identity.is_public_viewer() {
            identity.username.clone()
        } else {
            match self.find_signup(&identity.user_id, &identity.username) {
                Some(signup) if !signup.compliant_username.is_empty() => {
                    signup.compliant_username
                }
                _ => return Ok(Vec::new()),
            }
        };

        Ok(self
            .workspaces
            .iter()
            .filter(|ws| name.is_none_or(|n| n == ws.name))
            .filter(|ws| {
                self.bindings
                    .iter()
                    .any(|(u, space)| *u == user && *space == ws.name)
            })
            .map(|ws| Workspace {
                type_: if ws.owner == user {
                    WorkspaceType::Home
                } else {
                    WorkspaceType::Other
                },
                ..ws.clone()
            })
            .collect())
    }

    async fn get_workspace(&self, name: &str) -> DirectoryResult<Workspace> {
        self.workspaces
            .iter()
            .find(|ws| ws.name == name)
            .cloned()
            .ok_or_else(|| DirectoryError::not_found("space", name))
    }
}

impl MemberClusterRegistry for FakeDirectory {
    fn member_clusters(&self) -> Vec<MemberCluster> {
        self.members.clone()
    }
}

#[async_trait]
impl PluginConfigs for FakeDirectory {
    async fn get_plugin(&self, name: &str) -> DirectoryResult<ProxyPlugin> {
        self.plugins
            .iter()
            .find(|p| p.name == name)
            .cloned()
            .ok_or_else(|| DirectoryError::not_found("proxyplugin", name))
    }
}

#[async_trait]
impl BannedUsers for FakeDirectory {
    async fn is_banned(&self, email: &str) -> DirectoryResult<bool> {
        if let Some(message) = &self.banned_error {
            return Err(DirectoryError::Unavailable(message.clone()));
        }
        Ok(self.banned.iter().any(|b| b == email))
    }
}

/// Routes of one member cluster
#[derive(Default)]
pub(crate) struct FakeRoutes {
    routes: HashMap<(String, String), Route>,
}

impl FakeRoutes {
    pub(crate) fn with_route(mut self, namespace: &str, name: &str, route: Route) -> Self {
        self.routes
            .insert((namespace.to_string(), name.to_string()), route);
        self
    }
}

#[async_trait]
impl RouteLookup for FakeRoutes {
    async fn get_route(&self, namespace: &str, name: &str) -> DirectoryResult<Route> {
        self.routes
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| DirectoryError::not_found("route", format!("{}/{}", namespace, name)))
    }
}
