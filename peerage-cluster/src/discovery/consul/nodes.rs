//! Healthy peer list from `/v1/health/service/<service>`

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

use peerage_core::ConsulConfig;

use super::client::{QueryArgs, RegistryClient, RegistryRequest};
use crate::discovery::node_name::{ClusterNodeId, NodeNaming};
use crate::error::Result;

/// Status of one health check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Passing,
    Warning,
    Critical,
    Maintenance,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthCheck {
    #[serde(rename = "CheckID", default)]
    pub check_id: String,
    #[serde(rename = "Status")]
    pub status: CheckStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceRecord {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeRecord {
    /// Raw Consul node name
    #[serde(default)]
    pub node: String,
    #[serde(default)]
    pub address: String,
}

/// One element of the service health response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeEntry {
    #[serde(default)]
    pub checks: Vec<HealthCheck>,
    #[serde(default)]
    pub service: ServiceRecord,
    #[serde(default)]
    pub node: NodeRecord,
}

impl NodeEntry {
    /// Every check is `passing` or `warning`
    #[must_use]
    pub fn is_passing_or_warning(&self) -> bool {
        self.checks
            .iter()
            .all(|check| matches!(check.status, CheckStatus::Passing | CheckStatus::Warning))
    }
}

/// Fetches and filters the peer list for the configured service
pub struct NodeListResolver {
    client: Arc<dyn RegistryClient>,
    config: Arc<ConsulConfig>,
    naming: NodeNaming,
}

impl NodeListResolver {
    #[must_use]
    pub fn new(client: Arc<dyn RegistryClient>, config: Arc<ConsulConfig>, naming: NodeNaming) -> Self {
        Self {
            client,
            config,
            naming,
        }
    }

    /// `passing` unless warnings are tolerated, then `tag`, then `token`
    #[must_use]
    pub fn query_args(&self) -> QueryArgs {
        let mut args = QueryArgs::new();
        if !self.config.include_nodes_with_warnings {
            args = args.flag("passing");
        }
        if let Some(cluster_name) = &self.config.cluster_name {
            args = args.pair("tag", cluster_name.clone());
        }
        args.with_token(self.config.acl_token.as_deref())
    }

    /// Raw health entries for the service
    pub async fn fetch(&self) -> Result<Vec<NodeEntry>> {
        let request = RegistryRequest::get(["v1", "health", "service", self.config.service.as_str()])
            .with_query(self.query_args());

        match self.client.send(request).await? {
            Value::Null => Ok(Vec::new()),
            value => Ok(serde_json::from_value(value)?),
        }
    }

    /// Sorted, duplicate-free identifiers of the healthy peers
    pub async fn discover(&self) -> Result<BTreeSet<ClusterNodeId>> {
        let entries = self.fetch().await?;
        let total = entries.len();
        let nodes: BTreeSet<ClusterNodeId> = filter_entries(entries, self.config.include_nodes_with_warnings)
            .iter()
            .map(|entry| self.node_id(entry))
            .collect();

        tracing::debug!(
            service = %self.config.service,
            entries = total,
            nodes = nodes.len(),
            "Discovered peers from Consul"
        );
        Ok(nodes)
    }

    /// Identifier for a health entry
    ///
    /// A non-empty service address wins; otherwise the Consul node name is
    /// used, qualified with `.node.<domain>` in long-name mode.
    #[must_use]
    pub fn node_id(&self, entry: &NodeEntry) -> ClusterNodeId {
        if !entry.service.address.is_empty() {
            return self.naming.node_id(&entry.service.address);
        }
        if self.naming.use_longname() {
            self.naming
                .node_id(&format!("{}.node.{}", entry.node.node, self.config.domain))
        } else {
            self.naming.node_id(&entry.node.node)
        }
    }
}

/// Drop entries with failing checks when warnings are tolerated
///
/// Without warning tolerance the server-side `passing` filter has already
/// done the work, so entries are kept as-is.
#[must_use]
pub fn filter_entries(entries: Vec<NodeEntry>, include_warnings: bool) -> Vec<NodeEntry> {
    if include_warnings {
        entries
            .into_iter()
            .filter(NodeEntry::is_passing_or_warning)
            .collect()
    } else {
        entries
    }
}
