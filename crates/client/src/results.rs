//! Read-only result objects returned from `End` calls.
//!
//! Each wraps the decoded payload and exposes accessors only. The caller owns
//! the object once returned; nothing issued later mutates it.

use protocol::payloads::{
    ApplicationInfo, ApplicationList, ClusterHealth, EnumeratedProperty, HealthEvent, HealthState,
    NameEnumeration, NamedProperty, NodeHealth, NodeHealthState, NodeInfo, NodeList,
    PropertyEnumeration, PropertyMetadata, PropertyValue, ResolvedServicePartition, ServiceInfo,
    ServiceList,
};
use protocol::{FabricName, NodeName, PropertyName};

/// One page of a paged listing.
pub trait PagedResult {
    /// Token to pass to the next request; `None` on the last page.
    fn continuation(&self) -> Option<&str>;

    /// Returns `true` when more pages follow.
    fn has_more(&self) -> bool {
        self.continuation().is_some()
    }
}

// ---------------------------------------------------------------------------
// Naming
// ---------------------------------------------------------------------------

/// One page of sub-names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameEnumerationResult {
    inner: NameEnumeration,
}

impl NameEnumerationResult {
    pub(crate) fn new(inner: NameEnumeration) -> Self {
        Self { inner }
    }

    /// Sub-names on this page, in name order.
    pub fn names(&self) -> &[FabricName] {
        &self.inner.names
    }

    /// Number of entries on this page.
    pub fn len(&self) -> usize {
        self.inner.names.len()
    }

    /// Returns `true` if this page has no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.names.is_empty()
    }
}

impl PagedResult for NameEnumerationResult {
    fn continuation(&self) -> Option<&str> {
        self.inner.continuation.as_deref()
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

/// A property value with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyResult {
    inner: NamedProperty,
}

impl PropertyResult {
    pub(crate) fn new(inner: NamedProperty) -> Self {
        Self { inner }
    }

    /// The name the property is stored under.
    pub fn name(&self) -> &FabricName {
        &self.inner.metadata.name
    }

    /// The property's own name.
    pub fn property_name(&self) -> &PropertyName {
        &self.inner.metadata.property
    }

    /// Type, size and write sequence of the value.
    pub fn metadata(&self) -> &PropertyMetadata {
        &self.inner.metadata
    }

    /// The stored value.
    pub fn value(&self) -> &PropertyValue {
        &self.inner.value
    }

    /// The value if it is an `Int64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self.inner.value {
            PropertyValue::Int64(v) => Some(v),
            _ => None,
        }
    }

    /// The value if it is a `Double`.
    pub fn as_f64(&self) -> Option<f64> {
        match self.inner.value {
            PropertyValue::Double(v) => Some(v),
            _ => None,
        }
    }

    /// The value if it is a `String`.
    pub fn as_str(&self) -> Option<&str> {
        match &self.inner.value {
            PropertyValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// The value if it is `Binary`.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.inner.value {
            PropertyValue::Binary(v) => Some(v),
            _ => None,
        }
    }
}

/// One page of properties.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyEnumerationResult {
    inner: PropertyEnumeration,
}

impl PropertyEnumerationResult {
    pub(crate) fn new(inner: PropertyEnumeration) -> Self {
        Self { inner }
    }

    /// Properties on this page, in property order.
    pub fn properties(&self) -> &[EnumeratedProperty] {
        &self.inner.properties
    }

    /// Looks a property up by name within this page.
    pub fn get(&self, property: &str) -> Option<&EnumeratedProperty> {
        self.inner
            .properties
            .iter()
            .find(|p| p.metadata.property.as_str() == property)
    }

    /// Number of entries on this page.
    pub fn len(&self) -> usize {
        self.inner.properties.len()
    }

    /// Returns `true` if this page has no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.properties.is_empty()
    }
}

impl PagedResult for PropertyEnumerationResult {
    fn continuation(&self) -> Option<&str> {
        self.inner.continuation.as_deref()
    }
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// Health of the whole cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterHealthResult {
    inner: ClusterHealth,
}

impl ClusterHealthResult {
    pub(crate) fn new(inner: ClusterHealth) -> Self {
        Self { inner }
    }

    /// The worst state across every report.
    pub fn aggregated_state(&self) -> HealthState {
        self.inner.aggregated_state
    }

    /// Aggregated state of every node.
    pub fn node_states(&self) -> &[NodeHealthState] {
        &self.inner.node_states
    }

    /// Every health event reported at this level.
    pub fn events(&self) -> &[HealthEvent] {
        &self.inner.events
    }

    /// Nodes whose aggregated state is `Warning` or worse.
    pub fn unhealthy_nodes(&self) -> impl Iterator<Item = &NodeHealthState> {
        self.inner
            .node_states
            .iter()
            .filter(|n| n.aggregated_state >= HealthState::Warning)
    }
}

/// Health of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeHealthResult {
    inner: NodeHealth,
}

impl NodeHealthResult {
    pub(crate) fn new(inner: NodeHealth) -> Self {
        Self { inner }
    }

    /// The node this health belongs to.
    pub fn node_name(&self) -> &NodeName {
        &self.inner.node_name
    }

    /// The worst state across every report.
    pub fn aggregated_state(&self) -> HealthState {
        self.inner.aggregated_state
    }

    /// Every health event reported at this level.
    pub fn events(&self) -> &[HealthEvent] {
        &self.inner.events
    }
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// One page of nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeListResult {
    inner: NodeList,
}

impl NodeListResult {
    pub(crate) fn new(inner: NodeList) -> Self {
        Self { inner }
    }

    /// Nodes on this page.
    pub fn nodes(&self) -> &[NodeInfo] {
        &self.inner.nodes
    }

    /// The node named `name`, if on this page.
    pub fn get(&self, name: &str) -> Option<&NodeInfo> {
        self.inner.nodes.iter().find(|n| n.name.as_str() == name)
    }

    /// Number of entries on this page.
    pub fn len(&self) -> usize {
        self.inner.nodes.len()
    }

    /// Returns `true` if this page has no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.nodes.is_empty()
    }
}

impl PagedResult for NodeListResult {
    fn continuation(&self) -> Option<&str> {
        self.inner.continuation.as_deref()
    }
}

/// One page of applications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationListResult {
    inner: ApplicationList,
}

impl ApplicationListResult {
    pub(crate) fn new(inner: ApplicationList) -> Self {
        Self { inner }
    }

    /// Applications on this page.
    pub fn applications(&self) -> &[ApplicationInfo] {
        &self.inner.applications
    }

    /// Number of entries on this page.
    pub fn len(&self) -> usize {
        self.inner.applications.len()
    }

    /// Returns `true` if this page has no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.applications.is_empty()
    }
}

impl PagedResult for ApplicationListResult {
    fn continuation(&self) -> Option<&str> {
        self.inner.continuation.as_deref()
    }
}

/// One page of services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceListResult {
    inner: ServiceList,
}

impl ServiceListResult {
    pub(crate) fn new(inner: ServiceList) -> Self {
        Self { inner }
    }

    /// Services on this page.
    pub fn services(&self) -> &[ServiceInfo] {
        &self.inner.services
    }

    /// Number of entries on this page.
    pub fn len(&self) -> usize {
        self.inner.services.len()
    }

    /// Returns `true` if this page has no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.services.is_empty()
    }
}

impl PagedResult for ServiceListResult {
    fn continuation(&self) -> Option<&str> {
        self.inner.continuation.as_deref()
    }
}

// ---------------------------------------------------------------------------
// Service management
// ---------------------------------------------------------------------------

/// The endpoints one service partition listens on.
///
/// Pass it back to `resolve_service_partition` as the previous result to ask
/// for a newer endpoint set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPartitionResult {
    inner: ResolvedServicePartition,
}

impl ResolvedPartitionResult {
    pub(crate) fn new(inner: ResolvedServicePartition) -> Self {
        Self { inner }
    }

    /// The resolved service.
    pub fn service_name(&self) -> &FabricName {
        &self.inner.service_name
    }

    /// The resolved partition, for partitioned services.
    pub fn partition_key(&self) -> Option<&str> {
        self.inner.partition_key.as_deref()
    }

    /// Addresses the partition listens on.
    pub fn endpoints(&self) -> &[String] {
        &self.inner.endpoints
    }

    /// Version of the endpoint set; grows with every change.
    pub fn version(&self) -> u64 {
        self.inner.version
    }

    /// Returns `true` if `self` describes a later endpoint set than `other`.
    pub fn is_newer_than(&self, other: &ResolvedPartitionResult) -> bool {
        self.inner.version > other.inner.version
    }

    pub(crate) fn as_payload(&self) -> &ResolvedServicePartition {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::payloads::NodeStatus;

    fn node(name: &str, state: HealthState) -> NodeInfo {
        NodeInfo {
            name: NodeName::new(name).unwrap(),
            ip_address_or_fqdn: "localhost".into(),
            node_type: "NodeType0".into(),
            status: NodeStatus::Up,
            is_seed: false,
            instance_id: 1,
            health_state: state,
        }
    }

    #[test]
    fn test_node_list_lookup_and_paging() {
        let result = NodeListResult::new(NodeList {
            nodes: vec![node("a", HealthState::Ok), node("b", HealthState::Error)],
            continuation: Some("b".into()),
        });
        assert_eq!(result.len(), 2);
        assert_eq!(result.get("b").map(|n| n.health_state), Some(HealthState::Error));
        assert!(result.has_more());
    }

    #[test]
    fn test_cluster_health_unhealthy_nodes() {
        let result = ClusterHealthResult::new(ClusterHealth {
            aggregated_state: HealthState::Warning,
            node_states: vec![
                NodeHealthState {
                    node_name: NodeName::new("a").unwrap(),
                    aggregated_state: HealthState::Ok,
                },
                NodeHealthState {
                    node_name: NodeName::new("b").unwrap(),
                    aggregated_state: HealthState::Warning,
                },
            ],
            events: Vec::new(),
        });
        let names: Vec<_> = result.unhealthy_nodes().map(|n| n.node_name.as_str()).collect();
        assert_eq!(names, vec!["b"]);
    }
}
