use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Identity of the node that owns a discovery target.
pub type NodeId = i32;

/// A node/address pair subject to periodic discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiscoveryTarget {
    pub node_id: NodeId,
    pub address: IpAddr,
}

impl DiscoveryTarget {
    pub fn new(node_id: NodeId, address: IpAddr) -> Self {
        Self { node_id, address }
    }

    /// Parse the address from its textual form.
    pub fn parse(node_id: NodeId, address: &str) -> Result<Self, CoreError> {
        let address = IpAddr::from_str(address.trim())
            .map_err(|_| CoreError::InvalidAddress(address.to_string()))?;
        Ok(Self { node_id, address })
    }
}

impl fmt::Display for DiscoveryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {} ({})", self.node_id, self.address)
    }
}

/// SNMP protocol version used by the collection agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnmpVersion {
    V1,
    #[default]
    V2c,
    V3,
}

impl fmt::Display for SnmpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnmpVersion::V1 => write!(f, "v1"),
            SnmpVersion::V2c => write!(f, "v2c"),
            SnmpVersion::V3 => write!(f, "v3"),
        }
    }
}

/// Credentials and transport parameters a collection strategy probes with.
///
/// Replaced wholesale when a suspended task wakes up, so it is a plain value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub address: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_read_community")]
    pub read_community: String,
    #[serde(default)]
    pub version: SnmpVersion,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
}

pub(crate) fn default_port() -> u16 {
    161
}

pub(crate) fn default_read_community() -> String {
    "public".into()
}

pub(crate) fn default_timeout_ms() -> u64 {
    3000
}

pub(crate) fn default_retries() -> u32 {
    1
}

impl CollectionConfig {
    /// Config for `address` with every other field at its default.
    pub fn for_address(address: IpAddr) -> Self {
        Self {
            address,
            port: default_port(),
            read_community: default_read_community(),
            version: SnmpVersion::default(),
            timeout_ms: default_timeout_ms(),
            retries: default_retries(),
        }
    }

    /// The address probes are actually sent to.
    pub fn effective_address(&self) -> IpAddr {
        self.address
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Deduplication identity of a discovery task: (package, target address).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupKey {
    pub package: String,
    pub address: IpAddr,
}

impl DedupKey {
    pub fn new(package: impl Into<String>, address: IpAddr) -> Self {
        Self {
            package: package.into(),
            address,
        }
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.package, self.address)
    }
}
