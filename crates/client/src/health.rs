//! Health reporting and health queries.

use std::sync::Arc;

use protocol::interfaces::ops;
use protocol::payloads::{
    ClusterHealth, ClusterHealthRequest, HealthReport, NodeHealth, NodeHealthRequest,
};
use protocol::{CompletionCallback, FabricError, NodeName, OperationContext, Timeout};

use crate::capability::InterfaceHandle;
use crate::results::{ClusterHealthResult, NodeHealthResult};

type Callback = Option<Arc<dyn CompletionCallback>>;

/// Handle to the health subsystem at one version.
#[derive(Debug, Clone)]
pub struct HealthClient {
    handle: InterfaceHandle,
}

impl HealthClient {
    pub(crate) fn new(handle: InterfaceHandle) -> Self {
        Self { handle }
    }

    /// The negotiated interface handle.
    pub fn handle(&self) -> &InterfaceHandle {
        &self.handle
    }

    /// Version within the subsystem's ladder.
    pub fn version(&self) -> u32 {
        self.handle.version()
    }

    /// The same subsystem at an older (or equal) version.
    pub fn upcast(&self, version: u32) -> Result<Self, FabricError> {
        self.handle.upcast(version).map(Self::new)
    }

    /// Issues `ReportHealth`.
    pub fn begin_report_health(
        &self,
        report: &HealthReport,
        timeout: Timeout,
        callback: Callback,
    ) -> Result<OperationContext, FabricError> {
        self.handle
            .begin(ops::REPORT_HEALTH, report, timeout, callback)
    }

    /// Completes `ReportHealth`.
    pub async fn end_report_health(&self, context: &OperationContext) -> Result<(), FabricError> {
        self.handle.end(context, ops::REPORT_HEALTH).await
    }

    /// Sends `report` with the settings' health operation timeout.
    #[tracing::instrument(skip(self, report), fields(source = %report.source_id, state = %report.state))]
    pub async fn report_health(&self, report: &HealthReport) -> Result<(), FabricError> {
        let settings = self.handle.client().settings();
        let timeout = Timeout::from_millis(
            u32::try_from(settings.health_operation_timeout_ms).unwrap_or(u32::MAX - 1),
        );
        let context = self.begin_report_health(report, timeout, None)?;
        self.end_report_health(&context).await
    }

    /// Issues `GetClusterHealth`.
    pub fn begin_get_cluster_health(
        &self,
        timeout: Timeout,
        callback: Callback,
    ) -> Result<OperationContext, FabricError> {
        self.handle.begin(
            ops::GET_CLUSTER_HEALTH,
            &ClusterHealthRequest::default(),
            timeout,
            callback,
        )
    }

    /// Returns the aggregated cluster health.
    pub async fn end_get_cluster_health(
        &self,
        context: &OperationContext,
    ) -> Result<ClusterHealthResult, FabricError> {
        self.handle
            .end::<ClusterHealth>(context, ops::GET_CLUSTER_HEALTH)
            .await
            .map(ClusterHealthResult::new)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_cluster_health(
        &self,
        timeout: Timeout,
    ) -> Result<ClusterHealthResult, FabricError> {
        let context = self.begin_get_cluster_health(timeout, None)?;
        self.end_get_cluster_health(&context).await
    }

    /// Version 2.
    pub fn begin_get_node_health(
        &self,
        node_name: &NodeName,
        timeout: Timeout,
        callback: Callback,
    ) -> Result<OperationContext, FabricError> {
        let request = NodeHealthRequest {
            node_name: node_name.clone(),
        };
        self.handle
            .begin(ops::GET_NODE_HEALTH, &request, timeout, callback)
    }

    /// Returns one node's health and its events.
    pub async fn end_get_node_health(
        &self,
        context: &OperationContext,
    ) -> Result<NodeHealthResult, FabricError> {
        self.handle
            .end::<NodeHealth>(context, ops::GET_NODE_HEALTH)
            .await
            .map(NodeHealthResult::new)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_node_health(
        &self,
        node_name: &NodeName,
        timeout: Timeout,
    ) -> Result<NodeHealthResult, FabricError> {
        let context = self.begin_get_node_health(node_name, timeout, None)?;
        self.end_get_node_health(&context).await
    }
}
