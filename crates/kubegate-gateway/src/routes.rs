//! Plugin route lookups backed by a kube reflector
//!
//! Each member cluster that serves plugins gets its own client and a
//! reflector over OpenShift `Route` objects. Lookups read the local store and
//! never hit the member API server; an object missing from the store is a
//! failure, not a wait.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use kube::runtime::reflector::{self, ObjectRef, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client};
use secrecy::SecretString;
use tracing::{debug, info, warn};

use kubegate_api::{DirectoryError, DirectoryResult, Route, RouteLookup};

/// API group of OpenShift routes
pub const ROUTE_GROUP: &str = "route.openshift.io";

/// Errors creating a member cluster client
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// The member API endpoint is not a valid URI
    #[error("invalid API endpoint {endpoint:?} for member {cluster}: {message}")]
    InvalidEndpoint {
        /// Member cluster name
        cluster: String,
        /// Offending endpoint
        endpoint: String,
        /// Parse error
        message: String,
    },

    /// The kube client could not be built
    #[error("failed to create client for member {cluster}: {source}")]
    Client {
        /// Member cluster name
        cluster: String,
        /// Underlying kube error
        #[source]
        source: kube::Error,
    },
}

fn route_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk(ROUTE_GROUP, "v1", "Route"))
}

/// Build a client for a member cluster authenticating with its bearer token
pub fn member_client(
    cluster: &str,
    api_endpoint: &str,
    bearer_token: &str,
    insecure_skip_verify: bool,
) -> Result<Client, RouteError> {
    let uri = api_endpoint
        .parse::<hyper::Uri>()
        .map_err(|e| RouteError::InvalidEndpoint {
            cluster: cluster.to_string(),
            endpoint: api_endpoint.to_string(),
            message: e.to_string(),
        })?;

    let mut config = kube::Config::new(uri);
    config.accept_invalid_certs = insecure_skip_verify;
    config.auth_info.token = Some(SecretString::from(bearer_token.to_string()));

    Client::try_from(config).map_err(|source| RouteError::Client {
        cluster: cluster.to_string(),
        source,
    })
}

/// Route read model for one member cluster
pub struct RouteCache {
    cluster: String,
    resource: ApiResource,
    store: Store<DynamicObject>,
}

impl RouteCache {
    /// Start a reflector over all routes visible to `client`
    ///
    /// The watch runs in a background task for the life of the process and
    /// backs off on errors.
    pub fn spawn(cluster: &str, client: Client) -> Arc<Self> {
        let resource = route_resource();
        let api: Api<DynamicObject> = Api::all_with(client, &resource);

        let writer = reflector::store::Writer::<DynamicObject>::new(resource.clone());
        let store = writer.as_reader();

        let stream = reflector::reflector(
            writer,
            watcher(api, watcher::Config::default()).default_backoff(),
        )
        .applied_objects();

        let name = cluster.to_string();
        tokio::spawn(async move {
            info!(cluster = %name, "Starting route reflector");
            stream
                .for_each(|event| {
                    if let Err(e) = event {
                        warn!(cluster = %name, error = %e, "Route watch error");
                    }
                    futures::future::ready(())
                })
                .await;
            warn!(cluster = %name, "Route reflector stopped");
        });

        Arc::new(Self {
            cluster: cluster.to_string(),
            resource,
            store,
        })
    }
}

#[async_trait]
impl RouteLookup for RouteCache {
    async fn get_route(&self, namespace: &str, name: &str) -> DirectoryResult<Route> {
        let key = ObjectRef::<DynamicObject>::new_with(name, self.resource.clone()).within(namespace);
        let object = self
            .store
            .get(&key)
            .ok_or_else(|| DirectoryError::not_found("route", format!("{}/{}", namespace, name)))?;

        debug!(cluster = %self.cluster, namespace = %namespace, name = %name, "Route cache hit");
        Ok(route_from_object(&object))
    }
}

/// Extract the routing-relevant fields of a Route object
///
/// `spec.port.targetPort` may be a port name or number; numbers are
/// rendered as strings.
pub fn route_from_object(object: &DynamicObject) -> Route {
    let target_port = object
        .data
        .pointer("/spec/port/targetPort")
        .and_then(|v| match v {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

    let ingress_hosts = object
        .data
        .pointer("/status/ingress")
        .and_then(|v| v.as_array())
        .map(|ingress| {
            ingress
                .iter()
                .filter_map(|i| i.get("host").and_then(|h| h.as_str()))
                .filter(|h| !h.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Route {
        target_port,
        ingress_hosts,
    }
}
