//! Owned request and result records for the built-in subsystems.
//!
//! These are the documents carried inside an
//! [`EnginePayload`](crate::engine::EnginePayload). They are plain data: no
//! handles, no borrowed buffers. Field names are the wire names.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{FabricName, NodeName, PropertyName, Timestamp};

// ---------------------------------------------------------------------------
// Naming
// ---------------------------------------------------------------------------

/// Addresses one name in the naming store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRequest {
    pub name: FabricName,
}

/// Lists the sub-names of `name`, one page at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumerateSubNamesRequest {
    pub name: FabricName,
    /// Include grandchildren and below, not just direct children.
    #[serde(default)]
    pub recursive: bool,
    /// Token returned by the previous page; `None` for the first page.
    #[serde(default)]
    pub continuation: Option<String>,
    /// Page size limit. `None` lets the engine choose.
    #[serde(default)]
    pub max_results: Option<u32>,
}

/// One page of sub-names.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NameEnumeration {
    pub names: Vec<FabricName>,
    /// Present when more pages follow.
    pub continuation: Option<String>,
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

/// A typed property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Binary(Vec<u8>),
    Int64(i64),
    Double(f64),
    String(String),
    Guid(Uuid),
}

impl PropertyValue {
    /// Wire name of the value's type.
    pub fn type_id(&self) -> &'static str {
        match self {
            Self::Binary(_) => "binary",
            Self::Int64(_) => "int64",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Guid(_) => "guid",
        }
    }

    /// Size of the value in bytes as stored by the engine.
    pub fn size(&self) -> usize {
        match self {
            Self::Binary(bytes) => bytes.len(),
            Self::Int64(_) | Self::Double(_) => 8,
            Self::String(s) => s.len(),
            Self::Guid(_) => 16,
        }
    }
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Binary(bytes) => write!(f, "<{} bytes>", bytes.len()),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v}"),
            Self::Guid(v) => write!(f, "{v}"),
        }
    }
}

/// Writes one property under a name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutPropertyRequest {
    pub name: FabricName,
    pub property: PropertyName,
    pub value: PropertyValue,
    /// Caller-defined type tag. Only accepted by `PutCustomProperty`.
    #[serde(default)]
    pub custom_type_id: Option<String>,
}

/// Addresses one property under a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyRequest {
    pub name: FabricName,
    pub property: PropertyName,
}

/// Metadata of a stored property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyMetadata {
    pub name: FabricName,
    pub property: PropertyName,
    pub type_id: String,
    pub value_size: usize,
    /// Store-wide write sequence of the last write to this property.
    pub sequence_number: u64,
    pub last_modified: Timestamp,
    pub custom_type_id: Option<String>,
}

/// A property value with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedProperty {
    pub metadata: PropertyMetadata,
    pub value: PropertyValue,
}

/// Lists the properties of one name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumeratePropertiesRequest {
    pub name: FabricName,
    /// Return values as well as metadata.
    #[serde(default)]
    pub include_values: bool,
    #[serde(default)]
    pub continuation: Option<String>,
}

/// One page of properties. `value` is `None` when values were not requested.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PropertyEnumeration {
    pub properties: Vec<EnumeratedProperty>,
    pub continuation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumeratedProperty {
    pub metadata: PropertyMetadata,
    pub value: Option<PropertyValue>,
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// Health of one entity. Ordered from best to worst so the aggregate of a set
/// is its maximum.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    #[default]
    Unknown,
    Ok,
    Warning,
    Error,
}

impl HealthState {
    /// Aggregates a set of states: the worst one wins, `Ok` when empty.
    pub fn aggregate(states: impl IntoIterator<Item = HealthState>) -> HealthState {
        states
            .into_iter()
            .filter(|s| *s != HealthState::Unknown)
            .max()
            .unwrap_or(HealthState::Ok)
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            Self::Ok => write!(f, "Ok"),
            Self::Warning => write!(f, "Warning"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// Entity a health report is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HealthEntity {
    Cluster,
    Node { node_name: NodeName },
}

/// One health report from a watchdog or system component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub entity: HealthEntity,
    /// Reporter identity, e.g. `"Watchdog.Disk"`.
    pub source_id: String,
    /// Health property the report is about, e.g. `"Capacity"`.
    pub property: String,
    pub state: HealthState,
    #[serde(default)]
    pub description: String,
    /// Reports with a sequence number not newer than the stored one for the
    /// same `(entity, source_id, property)` are stale and rejected.
    pub sequence_number: u64,
}

/// A stored report as returned by health queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthEvent {
    pub source_id: String,
    pub property: String,
    pub state: HealthState,
    pub description: String,
    pub sequence_number: u64,
    pub source_timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClusterHealthRequest {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeHealthState {
    pub node_name: NodeName,
    pub aggregated_state: HealthState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterHealth {
    pub aggregated_state: HealthState,
    pub node_states: Vec<NodeHealthState>,
    /// Reports made against the cluster entity itself.
    pub events: Vec<HealthEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeHealthRequest {
    pub node_name: NodeName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeHealth {
    pub node_name: NodeName,
    pub aggregated_state: HealthState,
    pub events: Vec<HealthEvent>,
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeQueryRequest {
    /// Restricts the result to one node.
    #[serde(default)]
    pub node_name_filter: Option<NodeName>,
    #[serde(default)]
    pub continuation: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Up,
    Down,
    Enabling,
    Disabling,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: NodeName,
    pub ip_address_or_fqdn: String,
    pub node_type: String,
    pub status: NodeStatus,
    pub is_seed: bool,
    pub instance_id: u64,
    pub health_state: HealthState,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeList {
    pub nodes: Vec<NodeInfo>,
    pub continuation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApplicationQueryRequest {
    #[serde(default)]
    pub application_name_filter: Option<FabricName>,
    #[serde(default)]
    pub continuation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationInfo {
    pub name: FabricName,
    pub type_name: String,
    pub type_version: String,
    pub health_state: HealthState,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApplicationList {
    pub applications: Vec<ApplicationInfo>,
    pub continuation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceQueryRequest {
    pub application_name: FabricName,
    #[serde(default)]
    pub service_name_filter: Option<FabricName>,
    #[serde(default)]
    pub continuation: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Stateless,
    Stateful,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: FabricName,
    pub type_name: String,
    pub kind: ServiceKind,
    pub health_state: HealthState,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceList {
    pub services: Vec<ServiceInfo>,
    pub continuation: Option<String>,
}

// ---------------------------------------------------------------------------
// Service management
// ---------------------------------------------------------------------------

/// Selects which service endpoint changes a session is notified about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceNotificationFilter {
    pub name: FabricName,
    /// Also match every service below `name`, not just `name` itself.
    #[serde(default)]
    pub match_name_prefix: bool,
}

impl ServiceNotificationFilter {
    /// Returns `true` if changes to `service_name` pass this filter.
    pub fn matches(&self, service_name: &FabricName) -> bool {
        *service_name == self.name
            || (self.match_name_prefix && service_name.is_descendant_of(&self.name))
    }
}

/// Engine-assigned identity of a registered notification filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationFilterId(pub u64);

impl std::fmt::Display for NotificationFilterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnregisterFilterRequest {
    pub filter_id: NotificationFilterId,
}

/// Where one partition of a service currently listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedServicePartition {
    pub service_name: FabricName,
    pub partition_key: Option<String>,
    pub endpoints: Vec<String>,
    /// Monotonic version of the endpoint set.
    pub version: u64,
}

/// Resolves the endpoints of one service partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvePartitionRequest {
    pub service_name: FabricName,
    #[serde(default)]
    pub partition_key: Option<String>,
    /// A result the caller believes is stale. The engine answers with a
    /// newer version when it has one, otherwise with the same version.
    #[serde(default)]
    pub previous: Option<ResolvedServicePartition>,
}
