//! Node identifier conventions
//!
//! A cluster node is identified as `<prefix>@<host>`. In short-name mode a
//! host name is cut down to its first label; IP literals are always kept whole.

use std::fmt;
use std::net::IpAddr;

use peerage_core::NodeConfig;

use crate::error::{Error, Result};

/// Canonical peer identifier, e.g. `peerage@10.0.0.5`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClusterNodeId(String);

impl ClusterNodeId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part after `@`, or the whole identifier if there is none
    #[must_use]
    pub fn host(&self) -> &str {
        self.0.split_once('@').map_or(self.0.as_str(), |(_, host)| host)
    }
}

impl fmt::Display for ClusterNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClusterNodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Formats node identifiers for one cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeNaming {
    prefix: String,
    use_longname: bool,
}

impl NodeNaming {
    #[must_use]
    pub fn new(prefix: impl Into<String>, use_longname: bool) -> Self {
        Self {
            prefix: prefix.into(),
            use_longname,
        }
    }

    #[must_use]
    pub fn from_config(config: &NodeConfig) -> Self {
        Self::new(config.prefix.clone(), config.use_longname)
    }

    #[must_use]
    pub const fn use_longname(&self) -> bool {
        self.use_longname
    }

    /// Build the identifier of the node running on `host`
    #[must_use]
    pub fn node_id(&self, host: &str) -> ClusterNodeId {
        ClusterNodeId(format!("{}@{}", self.prefix, self.host_part(host)))
    }

    fn host_part<'a>(&self, host: &'a str) -> &'a str {
        if self.use_longname || host.parse::<IpAddr>().is_ok() {
            host
        } else {
            host.split('.').next().unwrap_or(host)
        }
    }

    /// Identifier of the local node
    ///
    /// An explicitly configured name wins; otherwise the OS hostname is used.
    pub fn local_node_id(&self, configured: Option<&str>) -> Result<ClusterNodeId> {
        match configured {
            Some(name) => Ok(ClusterNodeId::new(name)),
            None => Ok(self.node_id(&local_hostname()?)),
        }
    }
}

/// Hostname of the machine this process runs on
pub fn local_hostname() -> Result<String> {
    hostname::get()?
        .into_string()
        .map_err(|raw| Error::Configuration(format!("hostname is not valid UTF-8: {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_names_keep_first_label() {
        let naming = NodeNaming::new("peerage", false);
        assert_eq!(naming.node_id("db1.dc1.example.com").as_str(), "peerage@db1");
        assert_eq!(naming.node_id("db1").as_str(), "peerage@db1");
    }

    #[test]
    fn test_ip_literals_are_never_truncated() {
        let naming = NodeNaming::new("peerage", false);
        assert_eq!(naming.node_id("10.0.0.5").as_str(), "peerage@10.0.0.5");
        assert_eq!(naming.node_id("fe80::1").as_str(), "peerage@fe80::1");
    }

    #[test]
    fn test_long_names_keep_full_host() {
        let naming = NodeNaming::new("rabbit", true);
        assert_eq!(
            naming.node_id("db1.node.consul").as_str(),
            "rabbit@db1.node.consul"
        );
    }

    #[test]
    fn test_host_part() {
        assert_eq!(ClusterNodeId::new("peerage@node-a").host(), "node-a");
        assert_eq!(ClusterNodeId::new("node-a").host(), "node-a");
    }

    #[test]
    fn test_configured_local_name_wins() {
        let naming = NodeNaming::new("peerage", false);
        let local = naming.local_node_id(Some("custom@box")).unwrap();
        assert_eq!(local.as_str(), "custom@box");
    }

    #[test]
    fn test_node_ids_sort_lexically() {
        let mut ids = vec![
            ClusterNodeId::new("peerage@c"),
            ClusterNodeId::new("peerage@a"),
            ClusterNodeId::new("peerage@b"),
        ];
        ids.sort();
        assert_eq!(ids[0].as_str(), "peerage@a");
        assert_eq!(ids[2].as_str(), "peerage@c");
    }
}
