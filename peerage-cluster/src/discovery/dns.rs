//! DNS-based peer discovery
//!
//! Peers are the address records of one hostname, e.g. a Kubernetes headless
//! service (`{service}.{namespace}.svc.cluster.local`) or a round-robin record.
//! The zone is managed outside this process, so registration is a no-op.

use async_trait::async_trait;
use std::collections::BTreeSet;

use super::backend::DiscoveryBackend;
use super::node_name::{ClusterNodeId, NodeNaming};
use crate::error::{Error, Result};

/// Discovery backend backed by a DNS name
pub struct DnsBackend {
    hostname: String,
    naming: NodeNaming,
}

impl DnsBackend {
    #[must_use]
    pub fn new(hostname: String, naming: NodeNaming) -> Self {
        Self { hostname, naming }
    }

    /// Resolve the hostname to peer identifiers, one per distinct IP
    pub async fn resolve_once(&self) -> Result<BTreeSet<ClusterNodeId>> {
        let addrs = tokio::net::lookup_host((self.hostname.as_str(), 0))
            .await
            .map_err(|e| Error::Transport(format!("DNS lookup failed for '{}': {e}", self.hostname)))?;

        let nodes: BTreeSet<ClusterNodeId> = addrs
            .map(|addr| self.naming.node_id(&addr.ip().to_string()))
            .collect();

        tracing::debug!(
            hostname = %self.hostname,
            peer_count = nodes.len(),
            "DNS discovery resolved"
        );
        Ok(nodes)
    }
}

#[async_trait]
impl DiscoveryBackend for DnsBackend {
    fn name(&self) -> &'static str {
        "dns"
    }

    async fn discover(&self) -> Result<Vec<ClusterNodeId>> {
        Ok(self.resolve_once().await?.into_iter().collect())
    }

    async fn register(&self) -> Result<()> {
        tracing::debug!(hostname = %self.hostname, "DNS backend does not register nodes");
        Ok(())
    }

    async fn deregister(&self) -> Result<()> {
        tracing::debug!(hostname = %self.hostname, "DNS backend does not deregister nodes");
        Ok(())
    }
}
