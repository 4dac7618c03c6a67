//! Cluster peer discovery, registration and liveness

pub mod backend;
pub mod consul;
pub mod dns;
pub mod health_monitor;
pub mod node_name;

pub use backend::DiscoveryBackend;
pub use consul::ConsulBackend;
pub use dns::DnsBackend;
pub use health_monitor::{HealthCheckLoop, LoopState, RecoveryOutcome, RecoveryPolicy, TickOutcome};
pub use node_name::{ClusterNodeId, NodeNaming};
