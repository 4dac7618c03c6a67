//! Service registration payload
//!
//! The payload is rebuilt from configuration on every registration. Optional
//! parts are only added when their setting is present, and settings that
//! conflict are reported as [`ConfigWarning`]s instead of failing.

use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use peerage_core::ConsulConfig;

use crate::discovery::node_name::ClusterNodeId;
use crate::error::{Error, Result};

const CHECK_NOTES: &str = "Peerage cluster membership TTL check";

/// Body of `PUT/POST /v1/agent/service/register`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RegistrationPayload {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check: Option<TtlCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// TTL health check attached to the registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TtlCheck {
    #[serde(rename = "Notes")]
    pub notes: String,
    #[serde(rename = "TTL")]
    pub ttl: String,
    #[serde(
        rename = "DeregisterCriticalServiceAfter",
        skip_serializing_if = "Option::is_none"
    )]
    pub deregister_after: Option<String>,
}

/// Recoverable configuration conflicts found while building a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigWarning {
    /// `deregister_after` is set but there is no TTL check to attach it to
    DeregisterWithoutTtl { deregister_after: u64 },
    /// `service_address_nodename` is set while `service_address_auto` is off
    NodenameAddressWithoutAuto,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeregisterWithoutTtl { deregister_after } => write!(
                f,
                "deregister_after={deregister_after}s is ignored because service_ttl is not set"
            ),
            Self::NodenameAddressWithoutAuto => f.write_str(
                "service_address_nodename is ignored because service_address_auto is disabled",
            ),
        }
    }
}

/// Builds [`RegistrationPayload`]s and the service ID from configuration
#[derive(Debug, Clone)]
pub struct RegistrationBuilder {
    config: Arc<ConsulConfig>,
    local_node: ClusterNodeId,
    hostname: String,
}

impl RegistrationBuilder {
    /// `hostname` is the value registered in auto-address mode
    #[must_use]
    pub fn new(config: Arc<ConsulConfig>, local_node: ClusterNodeId, hostname: String) -> Self {
        Self {
            config,
            local_node,
            hostname,
        }
    }

    /// Configuration conflicts, in the order they are reported
    #[must_use]
    pub fn warnings(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        if self.config.service_address_nodename && !self.config.service_address_auto {
            warnings.push(ConfigWarning::NodenameAddressWithoutAuto);
        }
        if let (None, Some(deregister_after)) = (self.config.service_ttl, self.config.deregister_after) {
            warnings.push(ConfigWarning::DeregisterWithoutTtl { deregister_after });
        }
        warnings
    }

    /// Address to register, or `None` when none is configured
    ///
    /// First match wins:
    /// 1. auto-address without a NIC: the local hostname (or the node name's host)
    /// 2. no auto-address and no NIC: the static `service_address`
    /// 3. a NIC: its first IPv4 address, failing hard if there is none
    pub fn resolve_address(&self) -> Result<Option<String>> {
        let config = &self.config;
        match (&config.service_address_nic, config.service_address_auto) {
            (None, true) if config.service_address_nodename => {
                Ok(Some(self.local_node.host().to_string()))
            }
            (None, true) => Ok(Some(self.hostname.clone())),
            (None, false) => Ok(config.service_address.clone()),
            (Some(nic), _) => interface_ipv4(nic).map(|ip| Some(ip.to_string())),
        }
    }

    /// `<service>` or `<service>:<address>`
    pub fn service_id(&self) -> Result<String> {
        Ok(service_id(&self.config.service, self.resolve_address()?.as_deref()))
    }

    /// Assemble the registration payload, logging any configuration conflicts
    pub fn build(&self) -> Result<RegistrationPayload> {
        for warning in self.warnings() {
            tracing::warn!(service = %self.config.service, "{}", warning);
        }

        let address = self.resolve_address()?;
        let mut payload = RegistrationPayload {
            id: service_id(&self.config.service, address.as_deref()),
            name: self.config.service.clone(),
            address: None,
            port: self.config.service_port,
            check: None,
            tags: None,
        };

        if let Some(address) = address {
            payload.address = Some(address);
        }

        if let Some(ttl) = self.config.service_ttl {
            payload.check = Some(TtlCheck {
                notes: CHECK_NOTES.to_string(),
                ttl: format!("{ttl}s"),
                deregister_after: self.config.deregister_after.map(|secs| format!("{secs}s")),
            });
        }

        if let Some(cluster_name) = &self.config.cluster_name {
            payload.tags = Some(vec![cluster_name.clone()]);
        }

        Ok(payload)
    }
}

/// Service ID for `service` registered at `address`
#[must_use]
pub fn service_id(service: &str, address: Option<&str>) -> String {
    match address {
        Some(address) => format!("{service}:{address}"),
        None => service.to_string(),
    }
}

/// First IPv4 address bound to the network interface `nic`
pub fn interface_ipv4(nic: &str) -> Result<IpAddr> {
    let interfaces = if_addrs::get_if_addrs()
        .map_err(|e| Error::AddressResolution(format!("Failed to list network interfaces: {e}")))?;

    first_ipv4(
        interfaces.iter().map(|iface| (iface.name.as_str(), iface.ip())),
        nic,
    )
    .ok_or_else(|| {
        Error::AddressResolution(format!("No IPv4 address bound to network interface '{nic}'"))
    })
}

/// First IPv4 address among `(interface name, address)` pairs bound to `nic`
fn first_ipv4<'a>(addrs: impl IntoIterator<Item = (&'a str, IpAddr)>, nic: &str) -> Option<IpAddr> {
    addrs
        .into_iter()
        .filter(|(name, _)| *name == nic)
        .map(|(_, ip)| ip)
        .find(IpAddr::is_ipv4)
}
