//! Discovery lifecycle event payloads.
//!
//! One event is emitted per lifecycle transition of a discovery task. Each
//! carries the owning node id and the target address so consumers can
//! correlate runs without knowing about the task itself.

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use linkd_core::{DiscoveryTarget, NodeId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::topics;

/// Which lifecycle transition an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryEventKind {
    Started,
    Completed,
    Suspended,
}

impl DiscoveryEventKind {
    pub fn topic(&self) -> &'static str {
        match self {
            DiscoveryEventKind::Started => topics::DISCOVERY_STARTED,
            DiscoveryEventKind::Completed => topics::DISCOVERY_COMPLETED,
            DiscoveryEventKind::Suspended => topics::DISCOVERY_SUSPENDED,
        }
    }
}

impl fmt::Display for DiscoveryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryEventKind::Started => write!(f, "started"),
            DiscoveryEventKind::Completed => write!(f, "completed"),
            DiscoveryEventKind::Suspended => write!(f, "suspended"),
        }
    }
}

/// A lifecycle notification for one discovery target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryEvent {
    /// Unique identifier of this event.
    pub id: Uuid,
    pub kind: DiscoveryEventKind,
    pub node_id: NodeId,
    pub address: IpAddr,
    /// Component that emitted the event.
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

impl DiscoveryEvent {
    pub fn new(kind: DiscoveryEventKind, target: &DiscoveryTarget) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            node_id: target.node_id,
            address: target.address,
            source: topics::SOURCE.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn started(target: &DiscoveryTarget) -> Self {
        Self::new(DiscoveryEventKind::Started, target)
    }

    pub fn completed(target: &DiscoveryTarget) -> Self {
        Self::new(DiscoveryEventKind::Completed, target)
    }

    pub fn suspended(target: &DiscoveryTarget) -> Self {
        Self::new(DiscoveryEventKind::Suspended, target)
    }

    /// Routing topic for this event.
    pub fn topic(&self) -> &'static str {
        self.kind.topic()
    }

    pub fn target(&self) -> DiscoveryTarget {
        DiscoveryTarget::new(self.node_id, self.address)
    }

    /// Serialize to JSON for forwarding to external consumers.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
