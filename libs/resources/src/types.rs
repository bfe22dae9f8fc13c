//! Resource identifiers and typed spec payloads.
//!
//! Payloads are organized by namespace:
//! - Network facts (`network.*`): addresses, routes, probes, hostname,
//!   and the aggregated readiness summary
//! - File facts (`files.*`): rendered /etc file statuses
//! - Runtime facts (`runtime.*`): system service health
//! - Control-plane component specs (`control-plane.*`): consensus
//!   store and node agent

use serde::{Deserialize, Serialize};

/// Well-known namespaces.
pub mod namespace {
    /// Network facts and the readiness summary.
    pub const NETWORK: &str = "network";

    /// Rendered /etc file statuses.
    pub const FILES: &str = "files";

    /// System service health.
    pub const RUNTIME: &str = "runtime";

    /// Control-plane component specs.
    pub const CONTROL_PLANE: &str = "control-plane";
}

/// Resource kind names.
pub mod kind {
    pub const NODE_ADDRESS: &str = "NodeAddress";
    pub const ROUTE_STATUS: &str = "RouteStatus";
    pub const PROBE_STATUS: &str = "ProbeStatus";
    pub const HOSTNAME_STATUS: &str = "HostnameStatus";
    pub const ETC_FILE_STATUS: &str = "EtcFileStatus";
    pub const NETWORK_STATUS: &str = "NetworkStatus";
    pub const SERVICE_STATUS: &str = "ServiceStatus";
    pub const CONSENSUS_SPEC: &str = "ConsensusSpec";
    pub const AGENT_SPEC: &str = "AgentSpec";
}

/// Well-known singleton resource ids.
pub mod id {
    /// Current node addresses.
    pub const NODE_ADDRESS_CURRENT: &str = "current";

    /// Hostname status singleton.
    pub const HOSTNAME: &str = "hostname";

    /// Network readiness summary singleton.
    pub const NETWORK_STATUS: &str = "status";

    /// Container runtime service.
    pub const CRI_SERVICE: &str = "cri";

    /// Distributed consensus store spec singleton.
    pub const CONSENSUS: &str = "consensus";

    /// Node agent spec singleton.
    pub const AGENT: &str = "agent";
}

/// Current addresses assigned to the node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddressSpec {
    pub addresses: Vec<String>,
}

/// A single route known to the node.
///
/// An absent destination denotes the default route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStatusSpec {
    pub destination: Option<String>,
}

impl RouteStatusSpec {
    /// An absent or empty destination denotes the default route.
    pub fn is_default(&self) -> bool {
        self.destination.as_deref().map_or(true, str::is_empty)
    }
}

/// Result of a configured connectivity probe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeStatusSpec {
    pub success: bool,
}

/// Hostname applied to the node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostnameStatusSpec {
    pub hostname: String,
}

/// A rendered /etc file; the resource id is the file name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EtcFileStatusSpec {
    pub path: String,
}

/// Aggregated network readiness summary.
///
/// Independent boolean facts, each recomputed from scratch every
/// cycle. Stale facts never survive the disappearance of their source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStatusSpec {
    pub address_ready: bool,
    pub connectivity_ready: bool,
    pub hostname_ready: bool,
    pub etc_files_ready: bool,
}

/// Health of a system service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatusSpec {
    pub running: bool,
    pub healthy: bool,
}

/// Spec of the distributed consensus store component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusSpec {
    /// Container image reference.
    pub image: String,
}

/// Spec of the node agent component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSpec {
    /// Container image reference.
    pub image: String,
}

/// Typed spec payload of a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Payload {
    NodeAddress(NodeAddressSpec),
    RouteStatus(RouteStatusSpec),
    ProbeStatus(ProbeStatusSpec),
    HostnameStatus(HostnameStatusSpec),
    EtcFileStatus(EtcFileStatusSpec),
    NetworkStatus(NetworkStatusSpec),
    ServiceStatus(ServiceStatusSpec),
    ConsensusSpec(ConsensusSpec),
    AgentSpec(AgentSpec),
}

impl Payload {
    /// Kind name for this payload.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NodeAddress(_) => kind::NODE_ADDRESS,
            Self::RouteStatus(_) => kind::ROUTE_STATUS,
            Self::ProbeStatus(_) => kind::PROBE_STATUS,
            Self::HostnameStatus(_) => kind::HOSTNAME_STATUS,
            Self::EtcFileStatus(_) => kind::ETC_FILE_STATUS,
            Self::NetworkStatus(_) => kind::NETWORK_STATUS,
            Self::ServiceStatus(_) => kind::SERVICE_STATUS,
            Self::ConsensusSpec(_) => kind::CONSENSUS_SPEC,
            Self::AgentSpec(_) => kind::AGENT_SPEC,
        }
    }

    pub fn as_node_address(&self) -> Option<&NodeAddressSpec> {
        match self {
            Self::NodeAddress(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn as_route_status(&self) -> Option<&RouteStatusSpec> {
        match self {
            Self::RouteStatus(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn as_probe_status(&self) -> Option<&ProbeStatusSpec> {
        match self {
            Self::ProbeStatus(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn as_network_status(&self) -> Option<&NetworkStatusSpec> {
        match self {
            Self::NetworkStatus(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn as_service_status(&self) -> Option<&ServiceStatusSpec> {
        match self {
            Self::ServiceStatus(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn as_consensus_spec(&self) -> Option<&ConsensusSpec> {
        match self {
            Self::ConsensusSpec(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn as_agent_spec(&self) -> Option<&AgentSpec> {
        match self {
            Self::AgentSpec(spec) => Some(spec),
            _ => None,
        }
    }
}

/// A versioned resource as read from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub namespace: String,
    pub kind: String,
    pub id: String,

    /// Monotonically increasing per-id version.
    pub version: u64,

    pub payload: Payload,
}

/// Selects resources for change notification.
///
/// Matches on namespace + kind, optionally narrowed to a single id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub namespace: String,
    pub kind: String,
    pub id: Option<String>,
}

impl Selector {
    /// Select all resources of a kind in a namespace.
    pub fn kind(namespace: &str, kind: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            kind: kind.to_string(),
            id: None,
        }
    }

    /// Select a single resource.
    pub fn id(namespace: &str, kind: &str, id: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            kind: kind.to_string(),
            id: Some(id.to_string()),
        }
    }

    /// Whether a commit to the given resource matches this selector.
    pub fn matches(&self, namespace: &str, kind: &str, id: &str) -> bool {
        self.namespace == namespace
            && self.kind == kind
            && self.id.as_deref().map(|want| want == id).unwrap_or(true)
    }
}
