//! Service management: partition resolution (v1) and service notification
//! filters (v2).
//!
//! Registered filters decide which endpoint changes the engine pushes to the
//! client's [`ServiceNotificationHandler`](crate::ServiceNotificationHandler).
//! A client with no filters receives no service notifications.

use std::sync::Arc;

use protocol::interfaces::ops;
use protocol::payloads::{
    NotificationFilterId, ResolvePartitionRequest, ResolvedServicePartition,
    ServiceNotificationFilter, UnregisterFilterRequest,
};
use protocol::{CompletionCallback, FabricError, FabricName, OperationContext, Timeout};

use crate::capability::InterfaceHandle;
use crate::results::ResolvedPartitionResult;

type Callback = Option<Arc<dyn CompletionCallback>>;

/// Handle to the service management subsystem at one version.
#[derive(Debug, Clone)]
pub struct ServiceManagementClient {
    handle: InterfaceHandle,
}

impl ServiceManagementClient {
    pub(crate) fn new(handle: InterfaceHandle) -> Self {
        Self { handle }
    }

    /// The negotiated interface handle.
    pub fn handle(&self) -> &InterfaceHandle {
        &self.handle
    }

    /// Version within the service management ladder.
    pub fn version(&self) -> u32 {
        self.handle.version()
    }

    /// The same subsystem at an older (or equal) version.
    pub fn upcast(&self, version: u32) -> Result<Self, FabricError> {
        self.handle.upcast(version).map(Self::new)
    }

    /// Starts resolving the endpoints of one partition of `service_name`.
    ///
    /// With `previous`, the engine answers with a newer endpoint set when it
    /// has one and with the same version otherwise.
    pub fn begin_resolve_service_partition(
        &self,
        service_name: &FabricName,
        partition_key: Option<&str>,
        previous: Option<&ResolvedPartitionResult>,
        timeout: Timeout,
        callback: Callback,
    ) -> Result<OperationContext, FabricError> {
        let request = ResolvePartitionRequest {
            service_name: service_name.clone(),
            partition_key: partition_key.map(str::to_string),
            previous: previous.map(|p| p.as_payload().clone()),
        };
        self.handle
            .begin(ops::RESOLVE_SERVICE_PARTITION, &request, timeout, callback)
    }

    /// Retrieves the resolved partition.
    pub async fn end_resolve_service_partition(
        &self,
        context: &OperationContext,
    ) -> Result<ResolvedPartitionResult, FabricError> {
        self.handle
            .end::<ResolvedServicePartition>(context, ops::RESOLVE_SERVICE_PARTITION)
            .await
            .map(ResolvedPartitionResult::new)
    }

    /// Resolves a partition and waits for the result.
    #[tracing::instrument(skip(self, previous))]
    pub async fn resolve_service_partition(
        &self,
        service_name: &FabricName,
        partition_key: Option<&str>,
        previous: Option<&ResolvedPartitionResult>,
        timeout: Timeout,
    ) -> Result<ResolvedPartitionResult, FabricError> {
        let context = self.begin_resolve_service_partition(
            service_name,
            partition_key,
            previous,
            timeout,
            None,
        )?;
        self.end_resolve_service_partition(&context).await
    }

    /// Starts registering `filter`. Requires version 2.
    pub fn begin_register_service_notification_filter(
        &self,
        filter: &ServiceNotificationFilter,
        timeout: Timeout,
        callback: Callback,
    ) -> Result<OperationContext, FabricError> {
        self.handle.begin(
            ops::REGISTER_SERVICE_NOTIFICATION_FILTER,
            filter,
            timeout,
            callback,
        )
    }

    /// Retrieves the id the engine assigned to the registered filter.
    pub async fn end_register_service_notification_filter(
        &self,
        context: &OperationContext,
    ) -> Result<NotificationFilterId, FabricError> {
        self.handle
            .end::<NotificationFilterId>(context, ops::REGISTER_SERVICE_NOTIFICATION_FILTER)
            .await
    }

    /// Registers `filter` and waits for its id.
    #[tracing::instrument(skip(self))]
    pub async fn register_service_notification_filter(
        &self,
        filter: &ServiceNotificationFilter,
        timeout: Timeout,
    ) -> Result<NotificationFilterId, FabricError> {
        let context = self.begin_register_service_notification_filter(filter, timeout, None)?;
        self.end_register_service_notification_filter(&context).await
    }

    /// Starts removing a filter registered by this client. Requires version 2.
    pub fn begin_unregister_service_notification_filter(
        &self,
        filter_id: NotificationFilterId,
        timeout: Timeout,
        callback: Callback,
    ) -> Result<OperationContext, FabricError> {
        self.handle.begin(
            ops::UNREGISTER_SERVICE_NOTIFICATION_FILTER,
            &UnregisterFilterRequest { filter_id },
            timeout,
            callback,
        )
    }

    /// Completes the removal. An id this client never registered fails with
    /// `ServiceNotFound`.
    pub async fn end_unregister_service_notification_filter(
        &self,
        context: &OperationContext,
    ) -> Result<(), FabricError> {
        self.handle
            .end::<()>(context, ops::UNREGISTER_SERVICE_NOTIFICATION_FILTER)
            .await
    }

    /// Removes a filter and waits for completion.
    #[tracing::instrument(skip(self))]
    pub async fn unregister_service_notification_filter(
        &self,
        filter_id: NotificationFilterId,
        timeout: Timeout,
    ) -> Result<(), FabricError> {
        let context = self.begin_unregister_service_notification_filter(filter_id, timeout, None)?;
        self.end_unregister_service_notification_filter(&context).await
    }
}
