use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "PEERAGE_CONFIG_PATH";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub cluster: ClusterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// Which discovery backend the node uses to find its peers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Consul,
    Dns,
}

/// Cluster membership configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub backend: BackendKind,
    pub node: NodeConfig,
    pub consul: ConsulConfig,
    pub dns: DnsConfig,
}

/// How this node and its peers are named
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Name part placed before `@` in every node identifier
    pub prefix: String,
    /// Explicit identifier of the local node; derived from the hostname when unset
    pub name: Option<String>,
    /// Keep fully-qualified hosts in node identifiers instead of the first label
    pub use_longname: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            prefix: "peerage".to_string(),
            name: None,
            use_longname: false,
        }
    }
}

/// Consul agent and service registration settings
///
/// Every `Option` is unset by default; flags default to `false`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsulConfig {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// ACL token appended to every request as `token=<acl>`
    pub acl_token: Option<String>,
    /// Used both as the discovery tag filter and the registration tag
    pub cluster_name: Option<String>,
    pub service: String,
    pub service_port: u16,
    /// Static address used when auto-addressing is off and no NIC is set
    pub service_address: Option<String>,
    pub service_address_auto: bool,
    /// Network interface whose first IPv4 address is registered
    pub service_address_nic: Option<String>,
    /// Derive the auto address from the local node name (requires `service_address_auto`)
    pub service_address_nodename: bool,
    /// TTL check interval in seconds; no liveness loop runs without it
    pub service_ttl: Option<u64>,
    /// Seconds a critical check may last before the agent drops the service
    pub deregister_after: Option<u64>,
    /// Accept peers whose checks are `warning` as well as `passing`
    pub include_nodes_with_warnings: bool,
    /// Consul DNS domain used for long node names
    pub domain: String,
    pub request_timeout_secs: u64,
    pub recovery_attempts: u32,
    pub recovery_interval_secs: u64,
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            host: "localhost".to_string(),
            port: 8500,
            acl_token: None,
            cluster_name: None,
            service: "peerage".to_string(),
            service_port: 7400,
            service_address: None,
            service_address_auto: false,
            service_address_nic: None,
            service_address_nodename: false,
            service_ttl: None,
            deregister_after: None,
            include_nodes_with_warnings: false,
            domain: "consul".to_string(),
            request_timeout_secs: 10,
            recovery_attempts: 60,
            recovery_interval_secs: 1,
        }
    }
}

impl ConsulConfig {
    /// Base URL of the Consul agent HTTP API
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// DNS backend settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    /// Hostname whose address records list the cluster peers
    pub hostname: String,
}

impl Config {
    /// Load configuration from file and environment variables
    ///
    /// Environment variables override file values, e.g.
    /// `PEERAGE_CLUSTER__CONSUL__SERVICE_TTL=30`.
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("PEERAGE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Check for misconfiguration that must stop startup
    ///
    /// Conflicting but recoverable registration options are not reported here;
    /// they are warned about when the registration payload is built.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let cluster = &self.cluster;

        if cluster.node.prefix.is_empty() {
            errors.push("cluster.node.prefix must not be empty".to_string());
        }

        match cluster.backend {
            BackendKind::Consul => {
                let consul = &cluster.consul;
                if consul.scheme != "http" && consul.scheme != "https" {
                    errors.push(format!(
                        "cluster.consul.scheme must be http or https, got '{}'",
                        consul.scheme
                    ));
                }
                if consul.host.is_empty() {
                    errors.push("cluster.consul.host must not be empty".to_string());
                }
                if consul.service.is_empty() {
                    errors.push("cluster.consul.service must not be empty".to_string());
                }
                if consul.service_port == 0 {
                    errors.push("cluster.consul.service_port must be non-zero".to_string());
                }
                if consul.service_ttl == Some(0) {
                    errors.push("cluster.consul.service_ttl must be at least 1 second".to_string());
                }
                if consul.request_timeout_secs == 0 {
                    errors.push("cluster.consul.request_timeout_secs must be non-zero".to_string());
                }
                if consul.recovery_attempts == 0 {
                    errors.push("cluster.consul.recovery_attempts must be non-zero".to_string());
                }
                if consul.cluster_name.as_deref() == Some("") {
                    errors.push("cluster.consul.cluster_name must not be empty when set".to_string());
                }
                if consul.acl_token.as_deref() == Some("") {
                    errors.push("cluster.consul.acl_token must not be empty when set".to_string());
                }
            }
            BackendKind::Dns => {
                if cluster.dns.hostname.is_empty() {
                    errors.push("cluster.dns.hostname is required for the dns backend".to_string());
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Load configuration from a config file or environment variables
///
/// Config file search order:
/// 1. The explicit path, if given
/// 2. `PEERAGE_CONFIG_PATH` environment variable
/// 3. ./config.yaml (current working directory)
/// 4. Fall back to environment variables only
pub fn load_config(explicit_path: Option<&str>) -> Result<Config, ConfigError> {
    let config_path = explicit_path
        .map(str::to_string)
        .or_else(|| {
            std::env::var(CONFIG_PATH_ENV)
                .ok()
                .filter(|p| Path::new(p).exists())
        })
        .or_else(|| {
            let cwd = "config.yaml";
            Path::new(cwd).exists().then(|| cwd.to_string())
        });

    match config_path {
        Some(path) => {
            if !Path::new(&path).exists() {
                return Err(ConfigError::Message(format!("config file not found: {path}")));
            }
            Config::from_file(&path)
        }
        None => Config::from_env(),
    }
}
