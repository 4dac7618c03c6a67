pub mod config;
pub mod logging;

pub use config::{
    load_config, BackendKind, ClusterConfig, Config, ConsulConfig, DnsConfig, LoggingConfig,
    NodeConfig,
};
