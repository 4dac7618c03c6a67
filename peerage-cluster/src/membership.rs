//! Membership entry point for the host application
//!
//! Builds the configured discovery backend and owns the liveness loop.

use std::sync::Arc;

use peerage_core::{BackendKind, ClusterConfig};

use crate::discovery::{
    ClusterNodeId, ConsulBackend, DiscoveryBackend, DnsBackend, HealthCheckLoop, NodeNaming,
};
use crate::error::Result;

/// Cluster membership for this node
pub struct Membership {
    backend: Arc<dyn DiscoveryBackend>,
    local_node: ClusterNodeId,
    liveness: Option<Arc<HealthCheckLoop>>,
}

impl Membership {
    /// Build the backend selected by `config.backend`
    pub fn from_config(config: &ClusterConfig) -> Result<Self> {
        let naming = NodeNaming::from_config(&config.node);
        let local_node = naming.local_node_id(config.node.name.as_deref())?;

        match config.backend {
            BackendKind::Consul => {
                let backend = Arc::new(ConsulBackend::new(
                    config.consul.clone(),
                    naming,
                    local_node.clone(),
                )?);
                Ok(Self::from_consul(backend))
            }
            BackendKind::Dns => {
                let backend = Arc::new(DnsBackend::new(config.dns.hostname.clone(), naming));
                Ok(Self {
                    backend,
                    local_node,
                    liveness: None,
                })
            }
        }
    }

    /// Wrap an existing Consul backend; a liveness loop is prepared when it has a TTL
    #[must_use]
    pub fn from_consul(backend: Arc<ConsulBackend>) -> Self {
        let liveness = HealthCheckLoop::for_backend(backend.clone()).map(Arc::new);
        Self {
            local_node: backend.local_node().clone(),
            backend,
            liveness,
        }
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn DiscoveryBackend> {
        &self.backend
    }

    #[must_use]
    pub const fn local_node(&self) -> &ClusterNodeId {
        &self.local_node
    }

    #[must_use]
    pub fn liveness(&self) -> Option<&Arc<HealthCheckLoop>> {
        self.liveness.as_ref()
    }

    pub async fn discover(&self) -> Result<Vec<ClusterNodeId>> {
        self.backend.discover().await
    }

    pub async fn register(&self) -> Result<()> {
        self.backend.register().await
    }

    pub async fn deregister(&self) -> Result<()> {
        self.backend.deregister().await
    }

    /// Boot hook: start the liveness timer when the backend needs one
    ///
    /// Safe to call more than once; only the first call starts the timer.
    pub fn boot(&self) -> Option<tokio::task::JoinHandle<()>> {
        match &self.liveness {
            Some(liveness) => liveness.start(),
            None => {
                tracing::debug!(
                    backend = self.backend.name(),
                    "No TTL configured, liveness loop not started"
                );
                None
            }
        }
    }

    /// Stop the liveness timer
    pub fn shutdown(&self) {
        if let Some(liveness) = &self.liveness {
            liveness.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerage_core::{ConsulConfig, DnsConfig, NodeConfig};

    fn consul_config(ttl: Option<u64>) -> ClusterConfig {
        ClusterConfig {
            backend: BackendKind::Consul,
            node: NodeConfig {
                name: Some("peerage@node-a".to_string()),
                ..Default::default()
            },
            consul: ConsulConfig {
                service_ttl: ttl,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_consul_without_ttl_has_no_liveness_loop() {
        let membership = Membership::from_config(&consul_config(None)).unwrap();

        assert_eq!(membership.backend().name(), "consul");
        assert_eq!(membership.local_node().as_str(), "peerage@node-a");
        assert!(membership.liveness().is_none());
        assert!(membership.boot().is_none());
    }

    #[tokio::test]
    async fn test_boot_starts_liveness_once() {
        let membership = Membership::from_config(&consul_config(Some(20))).unwrap();
        let liveness = membership.liveness().unwrap();
        assert_eq!(liveness.check_interval(), std::time::Duration::from_secs(10));

        let handle = membership.boot().unwrap();
        assert!(membership.boot().is_none());

        membership.shutdown();
        handle.await.unwrap();
    }

    #[test]
    fn test_dns_backend_never_runs_liveness() {
        let config = ClusterConfig {
            backend: BackendKind::Dns,
            node: NodeConfig {
                name: Some("peerage@node-a".to_string()),
                ..Default::default()
            },
            consul: ConsulConfig {
                service_ttl: Some(30),
                ..Default::default()
            },
            dns: DnsConfig {
                hostname: "peers.example.internal".to_string(),
            },
        };
        let membership = Membership::from_config(&config).unwrap();

        assert_eq!(membership.backend().name(), "dns");
        assert!(membership.liveness().is_none());
        assert!(membership.boot().is_none());
    }
}
