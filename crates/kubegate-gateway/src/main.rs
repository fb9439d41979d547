//! Kubegate - multi-tenant workspace gateway

use std::collections::HashSet;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use kubegate_api::{
    start_server, AccessResolver, AppState, JwtTokenParser, KeyManager, MemberClusterRegistry,
    ReqwestUpstream, TransportPolicy, Transports,
};
use kubegate_common::{init_telemetry, TelemetryConfig};
use kubegate_gateway::{member_client, Catalog, Cli, RouteCache};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install crypto provider - aws-lc-rs
    // Both the TLS listener and the member cluster clients depend on it.
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!(
            "CRITICAL: Failed to install crypto provider: {:?}. \
             The gateway cannot terminate or originate TLS without it.",
            e
        );
        std::process::exit(1);
    }

    let cli = Cli::parse();

    let telemetry = init_telemetry(TelemetryConfig::default())
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    info!(
        listen_addr = %cli.listen_addr,
        environment = %cli.environment,
        namespace = %cli.namespace,
        public_viewer_enabled = cli.public_viewer_enabled,
        "Starting kubegate"
    );

    let keys = KeyManager::load(cli.jwks_url.clone())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load JWKS from {}: {}", cli.jwks_url, e))?;
    keys.spawn_refresh(cli.jwks_refresh());

    let catalog = Arc::new(
        Catalog::load(&cli.catalog, cli.namespace.clone())
            .map_err(|e| anyhow::anyhow!("Failed to load catalog: {}", e))?,
    );

    let members = catalog.member_entries();
    if members.is_empty() {
        anyhow::bail!("Catalog {:?} registers no member clusters", cli.catalog);
    }

    let policy = TransportPolicy::for_environment(&cli.environment);
    if policy.insecure_skip_verify {
        warn!(environment = %cli.environment, "TLS verification toward member clusters is disabled");
    }

    let watched: HashSet<&str> = members
        .iter()
        .filter(|m| m.watch_routes)
        .map(|m| m.name.as_str())
        .collect();
    for member in catalog
        .member_clusters()
        .into_iter()
        .filter(|m| watched.contains(m.name.as_str()))
    {
        let client = member_client(
            &member.name,
            &member.api_endpoint,
            &member.bearer_token,
            policy.insecure_skip_verify,
        )?;
        catalog.attach_routes(&member.name, RouteCache::spawn(&member.name, client));
    }

    catalog.spawn_refresh(cli.catalog_refresh());

    let transports = Transports::new(policy)
        .map_err(|e| anyhow::anyhow!("Failed to build member transports: {}", e))?;

    let resolver = AccessResolver::new(
        catalog.clone(),
        catalog.clone(),
        catalog.clone(),
        catalog.clone(),
    );

    let state = AppState {
        token_parser: Arc::new(JwtTokenParser::new(keys)),
        workspaces: catalog.clone(),
        banned: catalog.clone(),
        resolver: Arc::new(resolver),
        upstream: Arc::new(ReqwestUpstream::new(transports)),
        public_viewer_enabled: cli.public_viewer_enabled,
    };

    let config = cli.server_config().await?;

    start_server(config, state, telemetry)
        .await
        .map_err(|e| anyhow::anyhow!("Server failed: {}", e))
}
