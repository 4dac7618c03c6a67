//! Discovery backend capability shared by every peer source

use async_trait::async_trait;

use super::node_name::ClusterNodeId;
use crate::error::Result;

/// A source of cluster peers that this node can also announce itself to
///
/// Implementations are selected by configuration. `discover` returns a
/// sorted, duplicate-free list of peer identifiers. None of the methods
/// retry internally.
#[async_trait]
pub trait DiscoveryBackend: Send + Sync {
    /// Short backend name used in logs
    fn name(&self) -> &'static str;

    /// Fetch the current peer set
    async fn discover(&self) -> Result<Vec<ClusterNodeId>>;

    /// Announce this node to the backend
    async fn register(&self) -> Result<()>;

    /// Withdraw this node from the backend
    async fn deregister(&self) -> Result<()>;
}
