//! Consul discovery backend
//!
//! Registers the local node as a Consul service, lists healthy peers through
//! the health endpoint and keeps the service's TTL check passing.

pub mod client;
pub mod nodes;
pub mod registration;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use peerage_core::ConsulConfig;

use super::backend::DiscoveryBackend;
use super::node_name::{local_hostname, ClusterNodeId, NodeNaming};
use crate::error::Result;

pub use client::{HttpRegistryClient, QueryArgs, RegistryClient, RegistryMethod, RegistryRequest};
pub use nodes::{CheckStatus, NodeEntry, NodeListResolver};
pub use registration::{ConfigWarning, RegistrationBuilder, RegistrationPayload, TtlCheck};

/// Consul-backed cluster membership
pub struct ConsulBackend {
    client: Arc<dyn RegistryClient>,
    config: Arc<ConsulConfig>,
    registration: RegistrationBuilder,
    resolver: NodeListResolver,
    local_node: ClusterNodeId,
}

impl ConsulBackend {
    /// Create a backend talking HTTP to the configured agent
    pub fn new(config: ConsulConfig, naming: NodeNaming, local_node: ClusterNodeId) -> Result<Self> {
        let client = Arc::new(HttpRegistryClient::new(&config)?);
        Ok(Self::with_client(client, config, naming, local_node, local_hostname()?))
    }

    /// Create a backend over an arbitrary registry transport
    #[must_use]
    pub fn with_client(
        client: Arc<dyn RegistryClient>,
        config: ConsulConfig,
        naming: NodeNaming,
        local_node: ClusterNodeId,
        hostname: String,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            registration: RegistrationBuilder::new(config.clone(), local_node.clone(), hostname),
            resolver: NodeListResolver::new(client.clone(), config.clone(), naming),
            client,
            config,
            local_node,
        }
    }

    #[must_use]
    pub const fn local_node(&self) -> &ClusterNodeId {
        &self.local_node
    }

    #[must_use]
    pub fn config(&self) -> &ConsulConfig {
        &self.config
    }

    /// Service ID used for registration, deregistration and the TTL check
    pub fn service_id(&self) -> Result<String> {
        self.registration.service_id()
    }

    /// Configured TTL of the service check
    #[must_use]
    pub fn service_ttl(&self) -> Option<Duration> {
        self.config.service_ttl.map(Duration::from_secs)
    }

    fn token_args(&self) -> QueryArgs {
        QueryArgs::new().with_token(self.config.acl_token.as_deref())
    }

    /// Mark the service's TTL check as passing
    pub async fn send_health_check_pass(&self) -> Result<()> {
        let check_id = format!("service:{}", self.service_id()?);
        let request = RegistryRequest::get(["v1", "agent", "check", "pass", check_id.as_str()])
            .with_query(self.token_args());

        self.client.send(request).await?;
        tracing::trace!(check_id = %check_id, "TTL check marked passing");
        Ok(())
    }
}

#[async_trait]
impl DiscoveryBackend for ConsulBackend {
    fn name(&self) -> &'static str {
        "consul"
    }

    async fn discover(&self) -> Result<Vec<ClusterNodeId>> {
        Ok(self.resolver.discover().await?.into_iter().collect())
    }

    async fn register(&self) -> Result<()> {
        let payload = self.registration.build()?;
        let body = serde_json::to_string(&payload).map_err(|e| {
            tracing::error!(service_id = %payload.id, error = %e, "Failed to serialize Consul registration");
            e
        })?;

        let request = RegistryRequest::post(["v1", "agent", "service", "register"], body)
            .with_query(self.token_args());
        self.client.send(request).await?;

        tracing::info!(
            service_id = %payload.id,
            address = ?payload.address,
            ttl = ?payload.check.as_ref().map(|check| check.ttl.as_str()),
            "Registered with Consul"
        );
        Ok(())
    }

    async fn deregister(&self) -> Result<()> {
        let service_id = self.service_id()?;
        let request = RegistryRequest::get(["v1", "agent", "service", "deregister", service_id.as_str()])
            .with_query(self.token_args());
        self.client.send(request).await?;

        tracing::info!(service_id = %service_id, "Deregistered from Consul");
        Ok(())
    }
}
