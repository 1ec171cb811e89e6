use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use crate::clients::GrpcClientConfig;
use crate::resolver::BatchLimits;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "storefront-gateway", version, about)]
pub struct Cli {
    /// YAML file with gateway settings; flags and env vars override it.
    #[arg(long, env = "GATEWAY_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "ACCOUNT_SERVICE_URL")]
    pub account_url: Option<String>,

    #[arg(long, env = "CATALOG_SERVICE_URL")]
    pub catalog_url: Option<String>,

    #[arg(long, env = "ORDER_SERVICE_URL")]
    pub order_url: Option<String>,

    #[arg(long, env = "GATEWAY_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("no URL configured for the {0} service")]
    MissingService(&'static str),

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub account: ServiceConfig,
    pub catalog: ServiceConfig,
    pub order: ServiceConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub listen: SocketAddr,
    pub services: ServicesConfig,
    pub request_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub rpc_timeout_ms: u64,
    pub catalog_batch_limit: Option<usize>,
    pub account_batch_limit: Option<usize>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080)),
            services: ServicesConfig::default(),
            request_timeout_ms: 30_000,
            connect_timeout_ms: 5_000,
            rpc_timeout_ms: 10_000,
            catalog_batch_limit: None,
            account_batch_limit: None,
        }
    }
}

impl GatewayConfig {
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => GatewayConfig::default(),
        };

        if let Some(url) = &cli.account_url {
            config.services.account.url = url.clone();
        }
        if let Some(url) = &cli.catalog_url {
            config.services.catalog.url = url.clone();
        }
        if let Some(url) = &cli.order_url {
            config.services.order.url = url.clone();
        }
        if let Some(listen) = cli.listen {
            config.listen = listen;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let services = [
            ("account", &self.services.account),
            ("catalog", &self.services.catalog),
            ("order", &self.services.order),
        ];
        for (name, service) in services {
            if service.url.trim().is_empty() {
                return Err(ConfigError::MissingService(name));
            }
        }

        let timeouts = [
            ("request_timeout_ms", self.request_timeout_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("rpc_timeout_ms", self.rpc_timeout_ms),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(ConfigError::ZeroTimeout(name));
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn grpc_client(&self) -> GrpcClientConfig {
        GrpcClientConfig {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            rpc_timeout: Duration::from_millis(self.rpc_timeout_ms),
        }
    }

    pub fn batch_limits(&self) -> BatchLimits {
        BatchLimits {
            accounts: self.account_batch_limit,
            catalog: self.catalog_batch_limit,
        }
    }
}
