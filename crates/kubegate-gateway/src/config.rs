//! Command line configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use kubegate_api::{ServerConfig, TlsPem};

/// Kubegate - workspace gateway for a fleet of member clusters
#[derive(Parser, Debug, Clone)]
#[command(name = "kubegate", version, about, long_about = None)]
pub struct Cli {
    /// Address to bind the proxy listener
    #[arg(long, env = "KUBEGATE_LISTEN_ADDR", default_value = "0.0.0.0:8081")]
    pub listen_addr: SocketAddr,

    /// Address to bind the Prometheus metrics listener
    #[arg(long, env = "KUBEGATE_METRICS_ADDR", default_value = "0.0.0.0:8082")]
    pub metrics_addr: SocketAddr,

    /// Deployment environment
    ///
    /// Anything other than `prod` disables TLS verification toward member
    /// clusters.
    #[arg(long, env = "KUBEGATE_ENVIRONMENT", default_value = "prod")]
    pub environment: String,

    /// Namespace holding proxy plugin configs
    #[arg(long, env = "WATCH_NAMESPACE")]
    pub namespace: String,

    /// Path to the catalog YAML file
    #[arg(long, env = "KUBEGATE_CATALOG")]
    pub catalog: PathBuf,

    /// Seconds between catalog reloads
    #[arg(long, default_value = "5")]
    pub catalog_refresh_secs: u64,

    /// Let any authenticated user access workspaces shared with the public viewer
    #[arg(long, env = "KUBEGATE_PUBLIC_VIEWER_ENABLED")]
    pub public_viewer_enabled: bool,

    /// URL of the identity provider's JWKS document
    #[arg(long, env = "KUBEGATE_JWKS_URL")]
    pub jwks_url: String,

    /// Seconds between JWKS refreshes
    #[arg(long, default_value = "3600")]
    pub jwks_refresh_secs: u64,

    /// TLS certificate chain PEM for the proxy listener
    #[arg(long, requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,

    /// TLS private key PEM for the proxy listener
    #[arg(long, requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,

    /// Seconds allowed for reading inbound request headers
    #[arg(long, default_value = "2")]
    pub header_read_timeout_secs: u64,
}

impl Cli {
    /// Interval between catalog reloads
    pub fn catalog_refresh(&self) -> Duration {
        Duration::from_secs(self.catalog_refresh_secs.max(1))
    }

    /// Interval between JWKS refreshes
    pub fn jwks_refresh(&self) -> Duration {
        Duration::from_secs(self.jwks_refresh_secs.max(1))
    }

    /// Listener configuration, reading TLS material if configured
    pub async fn server_config(&self) -> anyhow::Result<ServerConfig> {
        let tls = match (&self.tls_cert, &self.tls_key) {
            (Some(cert), Some(key)) => {
                let cert_pem = tokio::fs::read_to_string(cert).await.map_err(|e| {
                    anyhow::anyhow!("Failed to read TLS certificate {:?}: {}", cert, e)
                })?;
                let key_pem = tokio::fs::read_to_string(key)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to read TLS key {:?}: {}", key, e))?;
                Some(TlsPem { cert_pem, key_pem })
            }
            _ => None,
        };

        Ok(ServerConfig {
            addr: self.listen_addr,
            metrics_addr: self.metrics_addr,
            tls,
            header_read_timeout: Duration::from_secs(self.header_read_timeout_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [&str; 7] = [
        "kubegate",
        "--namespace",
        "toolchain-host-operator",
        "--catalog",
        "/etc/kubegate/catalog.yaml",
        "--jwks-url",
        "https://sso.example.com/certs",
    ];

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(REQUIRED).unwrap();

        assert_eq!(cli.listen_addr, "0.0.0.0:8081".parse().unwrap());
        assert_eq!(cli.metrics_addr, "0.0.0.0:8082".parse().unwrap());
        assert_eq!(cli.environment, "prod");
        assert!(!cli.public_viewer_enabled);
        assert_eq!(cli.catalog_refresh(), Duration::from_secs(5));
        assert_eq!(cli.jwks_refresh(), Duration::from_secs(3600));
        assert!(cli.tls_cert.is_none());
    }

    #[test]
    fn test_tls_flags_come_in_pairs() {
        let mut args = REQUIRED.to_vec();
        args.extend(["--tls-cert", "/tls/tls.crt"]);
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_missing_catalog_rejected() {
        assert!(Cli::try_parse_from(["kubegate", "--namespace", "ns", "--jwks-url", "u"]).is_err());
    }

    #[tokio::test]
    async fn test_server_config_plain() {
        let mut args = REQUIRED.to_vec();
        args.extend(["--header-read-timeout-secs", "7"]);
        let config = Cli::try_parse_from(args).unwrap().server_config().await.unwrap();

        assert!(config.tls.is_none());
        assert_eq!(config.header_read_timeout, Duration::from_secs(7));
    }

    #[tokio::test]
    async fn test_server_config_missing_tls_file() {
        let mut args = REQUIRED.to_vec();
        args.extend(["--tls-cert", "/nonexistent/tls.crt", "--tls-key", "/nonexistent/tls.key"]);
        let cli = Cli::try_parse_from(args).unwrap();

        assert!(cli.server_config().await.is_err());
    }
}
