//! Resolved routing target for a single request

use url::Url;
use zeroize::Zeroizing;

/// Where a request is routed and as whom
///
/// Built by the access resolver once per request and never mutated. The
/// impersonation token is always the member cluster's own credential; the
/// caller's identity travels only in the impersonated username.
#[derive(Clone)]
pub struct ClusterAccess {
    api_url: Url,
    impersonation_token: Zeroizing<String>,
    impersonated_username: String,
}

impl ClusterAccess {
    /// Create a new access descriptor
    pub fn new(
        api_url: Url,
        impersonation_token: impl Into<String>,
        impersonated_username: impl Into<String>,
    ) -> Self {
        Self {
            api_url,
            impersonation_token: Zeroizing::new(impersonation_token.into()),
            impersonated_username: impersonated_username.into(),
        }
    }

    /// Target API endpoint or plugin route
    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    /// Bearer token presented to the member cluster
    pub fn impersonation_token(&self) -> &str {
        &self.impersonation_token
    }

    /// Identity the member cluster is asked to act as
    pub fn impersonated_username(&self) -> &str {
        &self.impersonated_username
    }
}

impl std::fmt::Debug for ClusterAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterAccess")
            .field("api_url", &self.api_url.as_str())
            .field("impersonation_token", &"<redacted>")
            .field("impersonated_username", &self.impersonated_username)
            .finish()
    }
}
