//! In-memory cluster model: nodes, applications, services and health.

use std::collections::BTreeMap;

use protocol::payloads::{
    ApplicationInfo, ApplicationList, ApplicationQueryRequest, ClusterHealth, HealthEntity,
    HealthEvent, HealthReport, HealthState, NodeHealth, NodeHealthState, NodeInfo, NodeList,
    NodeQueryRequest, NodeStatus, ServiceInfo, ServiceList, ServiceQueryRequest,
};
use protocol::{ClientRole, FabricName, NodeName, RemoteErrorCode, Timestamp};

use crate::store::DEFAULT_PAGE_SIZE;
use crate::OperationFailure;

type ReportKey = (HealthEntity, String, String);

#[derive(Debug)]
struct Application {
    info: ApplicationInfo,
    services: BTreeMap<FabricName, ServiceInfo>,
}

/// Nodes, applications and health reports of the simulated cluster.
#[derive(Debug, Default)]
pub struct ClusterModel {
    nodes: BTreeMap<NodeName, NodeInfo>,
    applications: BTreeMap<FabricName, Application>,
    reports: BTreeMap<ReportKey, HealthEvent>,
}

impl ClusterModel {
    /// A cluster of `node_count` healthy nodes named `_Node_0`, `_Node_1`, ...
    pub fn with_nodes(node_count: usize) -> Self {
        let mut model = Self::default();
        for index in 0..node_count {
            if let Some(name) = NodeName::new(format!("_Node_{index}")) {
                model.add_node(NodeInfo {
                    name,
                    ip_address_or_fqdn: "localhost".to_string(),
                    node_type: format!("NodeType{}", index % 2),
                    status: NodeStatus::Up,
                    is_seed: index < 3,
                    instance_id: 1,
                    health_state: HealthState::Ok,
                });
            }
        }
        model
    }

    /// Adds a node, replacing one of the same name.
    pub fn add_node(&mut self, node: NodeInfo) {
        self.nodes.insert(node.name.clone(), node);
    }

    /// The node with the lowest name; local sessions use it as gateway.
    pub fn first_node(&self) -> Option<&NodeInfo> {
        self.nodes.values().next()
    }

    /// Adds an application, replacing one of the same name and its services.
    pub fn add_application(&mut self, info: ApplicationInfo) {
        self.applications.insert(
            info.name.clone(),
            Application {
                info,
                services: BTreeMap::new(),
            },
        );
    }

    /// Adds a service under an existing application.
    pub fn add_service(
        &mut self,
        application: &FabricName,
        service: ServiceInfo,
    ) -> Result<(), OperationFailure> {
        let app = self.applications.get_mut(application).ok_or_else(|| {
            OperationFailure::new(
                RemoteErrorCode::NameNotFound,
                format!("application {application} does not exist"),
            )
        })?;
        app.services.insert(service.name.clone(), service);
        Ok(())
    }

    // -- Query --------------------------------------------------------------

    /// Lists nodes matching the request's filters.
    pub fn node_list(&self, request: &NodeQueryRequest) -> NodeList {
        let mut matching = self
            .nodes
            .values()
            .filter(|n| {
                request
                    .node_name_filter
                    .as_ref()
                    .map_or(true, |filter| &n.name == filter)
            })
            .filter(|n| after(request.continuation.as_deref(), n.name.as_str()))
            .map(|n| NodeInfo {
                health_state: self.node_state(&n.name),
                ..n.clone()
            });
        let nodes: Vec<NodeInfo> = matching.by_ref().take(DEFAULT_PAGE_SIZE).collect();
        let continuation = next_token(matching.next().is_some(), nodes.last().map(|n| n.name.as_str()));
        NodeList {
            nodes,
            continuation,
        }
    }

    /// Lists applications matching the request's filters.
    pub fn application_list(&self, request: &ApplicationQueryRequest) -> ApplicationList {
        let mut matching = self
            .applications
            .values()
            .map(|a| &a.info)
            .filter(|a| {
                request
                    .application_name_filter
                    .as_ref()
                    .map_or(true, |filter| &a.name == filter)
            })
            .filter(|a| after(request.continuation.as_deref(), a.name.as_str()));
        let applications: Vec<ApplicationInfo> =
            matching.by_ref().take(DEFAULT_PAGE_SIZE).cloned().collect();
        let continuation = next_token(
            matching.next().is_some(),
            applications.last().map(|a| a.name.as_str()),
        );
        ApplicationList {
            applications,
            continuation,
        }
    }

    /// Lists the services of one application.
    pub fn service_list(&self, request: &ServiceQueryRequest) -> Result<ServiceList, OperationFailure> {
        let app = self.applications.get(&request.application_name).ok_or_else(|| {
            OperationFailure::new(
                RemoteErrorCode::NameNotFound,
                format!("application {} does not exist", request.application_name),
            )
        })?;
        let mut matching = app
            .services
            .values()
            .filter(|s| {
                request
                    .service_name_filter
                    .as_ref()
                    .map_or(true, |filter| &s.name == filter)
            })
            .filter(|s| after(request.continuation.as_deref(), s.name.as_str()));
        let services: Vec<ServiceInfo> = matching.by_ref().take(DEFAULT_PAGE_SIZE).cloned().collect();
        let continuation = next_token(
            matching.next().is_some(),
            services.last().map(|s| s.name.as_str()),
        );
        Ok(ServiceList {
            services,
            continuation,
        })
    }

    // -- Health -------------------------------------------------------------

    /// Stores `report`. Cluster-level reports require the admin role; a
    /// report not newer than the stored one for the same key is stale.
    pub fn report_health(
        &mut self,
        report: &HealthReport,
        role: ClientRole,
    ) -> Result<(), OperationFailure> {
        match &report.entity {
            HealthEntity::Cluster if role != ClientRole::Admin => {
                return Err(OperationFailure::new(
                    RemoteErrorCode::AccessDenied,
                    "cluster health reports require the admin role",
                ));
            }
            HealthEntity::Node { node_name } if !self.nodes.contains_key(node_name) => {
                return Err(node_not_found(node_name));
            }
            _ => {}
        }
        let key = (
            report.entity.clone(),
            report.source_id.clone(),
            report.property.clone(),
        );
        if let Some(existing) = self.reports.get(&key) {
            if report.sequence_number <= existing.sequence_number {
                return Err(OperationFailure::new(
                    RemoteErrorCode::InvalidArgument,
                    format!(
                        "stale report: sequence {} is not newer than {}",
                        report.sequence_number, existing.sequence_number
                    ),
                ));
            }
        }
        self.reports.insert(
            key,
            HealthEvent {
                source_id: report.source_id.clone(),
                property: report.property.clone(),
                state: report.state,
                description: report.description.clone(),
                sequence_number: report.sequence_number,
                source_timestamp: Timestamp::now(),
            },
        );
        Ok(())
    }

    /// Aggregates every report into the cluster and per-node states.
    pub fn cluster_health(&self) -> ClusterHealth {
        let node_states: Vec<NodeHealthState> = self
            .nodes
            .keys()
            .map(|name| NodeHealthState {
                node_name: name.clone(),
                aggregated_state: self.node_state(name),
            })
            .collect();
        let events = self.events_for(&HealthEntity::Cluster);
        let aggregated_state = HealthState::aggregate(
            node_states
                .iter()
                .map(|n| n.aggregated_state)
                .chain(events.iter().map(|e| e.state)),
        );
        ClusterHealth {
            aggregated_state,
            node_states,
            events,
        }
    }

    /// Returns one node's aggregated state and the events reported on it.
    pub fn node_health(&self, node_name: &NodeName) -> Result<NodeHealth, OperationFailure> {
        if !self.nodes.contains_key(node_name) {
            return Err(node_not_found(node_name));
        }
        Ok(NodeHealth {
            node_name: node_name.clone(),
            aggregated_state: self.node_state(node_name),
            events: self.events_for(&HealthEntity::Node {
                node_name: node_name.clone(),
            }),
        })
    }

    fn node_state(&self, node_name: &NodeName) -> HealthState {
        let entity = HealthEntity::Node {
            node_name: node_name.clone(),
        };
        HealthState::aggregate(self.events_for(&entity).iter().map(|e| e.state))
    }

    fn events_for(&self, entity: &HealthEntity) -> Vec<HealthEvent> {
        self.reports
            .iter()
            .filter(|((e, _, _), _)| e == entity)
            .map(|(_, event)| event.clone())
            .collect()
    }
}

fn after(continuation: Option<&str>, key: &str) -> bool {
    continuation.map_or(true, |token| key > token)
}

fn next_token(more: bool, last: Option<&str>) -> Option<String> {
    if more {
        last.map(str::to_string)
    } else {
        None
    }
}

fn node_not_found(node_name: &NodeName) -> OperationFailure {
    OperationFailure::new(
        RemoteErrorCode::NodeNotFound,
        format!("node {node_name} does not exist"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str) -> NodeName {
        NodeName::new(name).unwrap()
    }

    fn report(entity: HealthEntity, state: HealthState, sequence_number: u64) -> HealthReport {
        HealthReport {
            entity,
            source_id: "Watchdog".into(),
            property: "Disk".into(),
            state,
            description: String::new(),
            sequence_number,
        }
    }

    #[test]
    fn test_node_report_drives_aggregated_state() {
        let mut model = ClusterModel::with_nodes(3);
        let entity = HealthEntity::Node {
            node_name: node("_Node_1"),
        };
        model
            .report_health(&report(entity, HealthState::Warning, 1), ClientRole::User)
            .unwrap();

        let health = model.cluster_health();
        assert_eq!(health.aggregated_state, HealthState::Warning);
        let list = model.node_list(&NodeQueryRequest::default());
        assert_eq!(list.nodes[1].health_state, HealthState::Warning);
        assert_eq!(list.nodes[0].health_state, HealthState::Ok);
    }

    #[test]
    fn test_stale_report_is_rejected() {
        let mut model = ClusterModel::with_nodes(1);
        let entity = HealthEntity::Node {
            node_name: node("_Node_0"),
        };
        model
            .report_health(&report(entity.clone(), HealthState::Ok, 5), ClientRole::User)
            .unwrap();
        let err = model
            .report_health(&report(entity, HealthState::Error, 5), ClientRole::User)
            .unwrap_err();
        assert_eq!(err.code, RemoteErrorCode::InvalidArgument);
    }

    #[test]
    fn test_cluster_report_requires_admin() {
        let mut model = ClusterModel::with_nodes(1);
        let err = model
            .report_health(
                &report(HealthEntity::Cluster, HealthState::Error, 1),
                ClientRole::User,
            )
            .unwrap_err();
        assert_eq!(err.code, RemoteErrorCode::AccessDenied);
        model
            .report_health(
                &report(HealthEntity::Cluster, HealthState::Error, 1),
                ClientRole::Admin,
            )
            .unwrap();
        assert_eq!(model.cluster_health().aggregated_state, HealthState::Error);
    }

    #[test]
    fn test_unknown_node_is_reported() {
        let model = ClusterModel::with_nodes(1);
        assert_eq!(
            model.node_health(&node("nope")).unwrap_err().code,
            RemoteErrorCode::NodeNotFound
        );
    }
}
