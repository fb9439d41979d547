//! Kubegate Workspace Proxy
//!
//! A multi-tenant gateway in front of a fleet of member cluster API servers.
//! Authenticates callers, resolves which member cluster hosts the workspace
//! named in the path, authorizes the workspace and namespace, and forwards
//! the request with the member cluster's credential and `Impersonate-User`.
//!
//! # Architecture
//!
//! ```text
//! client ──► Gateway ──► Access Resolver ──► Member API Server
//!            (token)     (workspace/plugin)   (impersonation)
//! ```
//!
//! # Endpoints
//!
//! - `* /workspaces/{name}/...` - Proxy into a named workspace
//! - `* /plugins/{name}/...` - Proxy to a plugin route on the member cluster
//! - `* /...` - Proxy into the caller's home workspace
//! - `GET /apis/toolchain.dev.openshift.com/v1alpha1/workspaces[/{name}]` - Caller's workspaces
//! - `GET /proxyhealth` - Health check

#![deny(missing_docs)]

pub mod access;
pub mod auth;
pub mod authorize;
pub mod context;
pub mod cors;
pub mod directory;
pub mod error;
pub mod forwarder;
pub mod jwt;
pub mod members;
pub mod proxy;
pub mod routing;
pub mod server;
pub mod websocket;
pub mod workspaces;

#[cfg(test)]
mod test_support;

pub use access::ClusterAccess;
pub use auth::{Identity, TokenClaims, TokenError, TokenParser};
pub use directory::{
    BannedUsers, DirectoryError, DirectoryResult, MemberCluster, MemberClusterRegistry,
    PluginConfigs, ProxyPlugin, Route, RouteLookup, RouteRef, Signup, SignupService, Workspace,
    WorkspaceDirectory, WorkspaceType,
};
pub use error::{Error, Result};
pub use forwarder::{ReqwestUpstream, TransportPolicy, Transports, Upstream};
pub use jwt::{JwtTokenParser, KeyManager};
pub use members::{AccessError, AccessResolver};
pub use server::{start_server, AppState, ServerConfig, TlsPem};
pub use workspaces::{WorkspaceList, WorkspaceObject};
