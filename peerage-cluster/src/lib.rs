pub mod discovery;
pub mod error;
pub mod membership;

pub use discovery::{
    ClusterNodeId, ConsulBackend, DiscoveryBackend, DnsBackend, HealthCheckLoop, LoopState,
    NodeNaming, RecoveryOutcome, RecoveryPolicy, TickOutcome,
};
pub use error::{Error, Result};
pub use membership::Membership;
