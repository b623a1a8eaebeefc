//! Cluster queries: nodes (v1), applications (v2), services (v3).

use std::sync::Arc;

use protocol::interfaces::ops;
use protocol::payloads::{
    ApplicationList, ApplicationQueryRequest, NodeList, NodeQueryRequest, ServiceList,
    ServiceQueryRequest,
};
use protocol::{CompletionCallback, FabricError, OperationContext, Timeout};

use crate::capability::InterfaceHandle;
use crate::results::{ApplicationListResult, NodeListResult, ServiceListResult};

type Callback = Option<Arc<dyn CompletionCallback>>;

/// Handle to the query subsystem at one version.
#[derive(Debug, Clone)]
pub struct QueryClient {
    handle: InterfaceHandle,
}

impl QueryClient {
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

    /// Issues `GetNodeList`.
    pub fn begin_get_node_list(
        &self,
        request: &NodeQueryRequest,
        timeout: Timeout,
        callback: Callback,
    ) -> Result<OperationContext, FabricError> {
        self.handle
            .begin(ops::GET_NODE_LIST, request, timeout, callback)
    }

    /// Returns one page of nodes.
    pub async fn end_get_node_list(
        &self,
        context: &OperationContext,
    ) -> Result<NodeListResult, FabricError> {
        self.handle
            .end::<NodeList>(context, ops::GET_NODE_LIST)
            .await
            .map(NodeListResult::new)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_node_list(
        &self,
        request: &NodeQueryRequest,
        timeout: Timeout,
    ) -> Result<NodeListResult, FabricError> {
        let context = self.begin_get_node_list(request, timeout, None)?;
        self.end_get_node_list(&context).await
    }

    /// Issues `GetApplicationList`. Requires version 2.
    pub fn begin_get_application_list(
        &self,
        request: &ApplicationQueryRequest,
        timeout: Timeout,
        callback: Callback,
    ) -> Result<OperationContext, FabricError> {
        self.handle
            .begin(ops::GET_APPLICATION_LIST, request, timeout, callback)
    }

    /// Returns one page of applications.
    pub async fn end_get_application_list(
        &self,
        context: &OperationContext,
    ) -> Result<ApplicationListResult, FabricError> {
        self.handle
            .end::<ApplicationList>(context, ops::GET_APPLICATION_LIST)
            .await
            .map(ApplicationListResult::new)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_application_list(
        &self,
        request: &ApplicationQueryRequest,
        timeout: Timeout,
    ) -> Result<ApplicationListResult, FabricError> {
        let context = self.begin_get_application_list(request, timeout, None)?;
        self.end_get_application_list(&context).await
    }

    /// Issues `GetServiceList`. Requires version 3.
    pub fn begin_get_service_list(
        &self,
        request: &ServiceQueryRequest,
        timeout: Timeout,
        callback: Callback,
    ) -> Result<OperationContext, FabricError> {
        self.handle
            .begin(ops::GET_SERVICE_LIST, request, timeout, callback)
    }

    /// Returns one page of services.
    pub async fn end_get_service_list(
        &self,
        context: &OperationContext,
    ) -> Result<ServiceListResult, FabricError> {
        self.handle
            .end::<ServiceList>(context, ops::GET_SERVICE_LIST)
            .await
            .map(ServiceListResult::new)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_service_list(
        &self,
        request: &ServiceQueryRequest,
        timeout: Timeout,
    ) -> Result<ServiceListResult, FabricError> {
        let context = self.begin_get_service_list(request, timeout, None)?;
        self.end_get_service_list(&context).await
    }
}
