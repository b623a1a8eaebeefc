//! Negotiated interface handles.
//!
//! An [`InterfaceHandle`] pairs a client with one negotiated interface
//! version and is the only place operations are issued from. It enforces
//! that an operation is declared by the handle's version, translates the
//! request into an owned payload, and routes `End` calls back through the
//! issuing client.
//!
//! [`Capability`] is what identity-token lookups return: one variant per
//! built-in subsystem, plus [`Capability::Other`] for identities from a
//! caller-supplied catalog.

use std::sync::Arc;

use protocol::interfaces::subsystem;
use protocol::{
    begin, CompletionCallback, EnginePayload, EngineRequest, FabricError, InterfaceDescriptor,
    InterfaceId, MisuseKind, OperationContext, OperationName, OperationTarget, Timeout,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::client::{ClientInner, FabricClient};
use crate::health::HealthClient;
use crate::property::PropertyManagementClient;
use crate::query::QueryClient;
use crate::service::ServiceManagementClient;

/// A client bound to one negotiated interface version.
#[derive(Clone)]
pub struct InterfaceHandle {
    client: Arc<ClientInner>,
    descriptor: InterfaceDescriptor,
}

impl std::fmt::Debug for InterfaceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterfaceHandle")
            .field("interface", &self.descriptor.display_name())
            .field("id", &self.descriptor.id)
            .finish()
    }
}

impl InterfaceHandle {
    pub(crate) fn new(client: Arc<ClientInner>, descriptor: InterfaceDescriptor) -> Self {
        Self { client, descriptor }
    }

    /// The negotiated descriptor.
    pub fn descriptor(&self) -> &InterfaceDescriptor {
        &self.descriptor
    }

    /// Version within the subsystem's ladder.
    pub fn version(&self) -> u32 {
        self.descriptor.version
    }

    /// Identity token of the negotiated version.
    pub fn interface_id(&self) -> InterfaceId {
        self.descriptor.id
    }

    /// The client this handle issues through.
    pub fn client(&self) -> FabricClient {
        FabricClient {
            inner: Arc::clone(&self.client),
        }
    }

    /// Returns a handle to an older (or the same) version of this subsystem.
    ///
    /// Always succeeds for `version <= self.version()`; richer versions must
    /// be requested through [`FabricClient::query_interface`].
    pub fn upcast(&self, version: u32) -> Result<InterfaceHandle, FabricError> {
        let ladder = self
            .client
            .catalog
            .ladder(self.descriptor.subsystem.as_str());
        match ladder {
            Some(ladder) if ladder.is_upcast_compatible(self.descriptor.version, version) => {
                let descriptor = ladder.get(version).cloned().ok_or_else(|| {
                    self.not_declared_error(version)
                })?;
                Ok(Self::new(Arc::clone(&self.client), descriptor))
            }
            _ => Err(self.not_declared_error(version)),
        }
    }

    fn not_declared_error(&self, version: u32) -> FabricError {
        let requested = self
            .client
            .catalog
            .ladder(self.descriptor.subsystem.as_str())
            .and_then(|ladder| ladder.get(version))
            .map(|d| d.id)
            .unwrap_or(InterfaceId::from_u128(0));
        FabricError::CapabilityMismatch {
            requested,
            subsystem: Some(self.descriptor.subsystem.clone()),
            requested_version: Some(version),
            highest_supported: Some(self.descriptor.version),
        }
    }

    /// Issues `operation` with `request`.
    ///
    /// Fails synchronously (no context exists) when the handle's version does
    /// not declare `operation`, the client is closed, the request cannot be
    /// encoded, or the engine rejects it.
    pub fn begin<R: Serialize>(
        &self,
        operation: &str,
        request: &R,
        timeout: Timeout,
        callback: Option<Arc<dyn CompletionCallback>>,
    ) -> Result<OperationContext, FabricError> {
        let qualified = format!("{}.{}", self.descriptor.subsystem, operation);
        if self.client.closed.load(std::sync::atomic::Ordering::Acquire) {
            return Err(FabricError::Scheduling {
                target: qualified,
                reason: "client is closed".to_string(),
                transient: false,
            });
        }
        if !self.descriptor.declares(operation) {
            let introduced = self
                .client
                .catalog
                .ladder(self.descriptor.subsystem.as_str())
                .and_then(|ladder| ladder.introduced_in(operation));
            tracing::warn!(
                operation = %qualified,
                interface = %self.descriptor.display_name(),
                introduced_in = ?introduced,
                "operation is not declared by this interface version"
            );
            return Err(match introduced {
                Some(version) => self.not_declared_error(version),
                None => FabricError::Scheduling {
                    target: qualified,
                    reason: format!(
                        "{} declares no operation named '{operation}'",
                        self.descriptor.display_name()
                    ),
                    transient: false,
                },
            });
        }
        let operation = OperationName::new(operation).ok_or_else(|| FabricError::Scheduling {
            target: qualified.clone(),
            reason: "operation name is empty".to_string(),
            transient: false,
        })?;
        let payload = EnginePayload::encode(&operation, request)?;

        let target = OperationTarget {
            subsystem: self.descriptor.subsystem.clone(),
            operation: operation.clone(),
            interface: self.descriptor.id,
            timeout,
            issuer: self.client.tag,
        };
        let session = Arc::clone(&self.client.session);
        let subsystem = self.descriptor.subsystem.clone();
        let interface = self.descriptor.id;
        begin(target, callback, move |completer| {
            let request = EngineRequest {
                context_id: completer.context_id(),
                subsystem,
                interface,
                operation,
                timeout,
                payload,
            };
            session.schedule(request, completer)
        })
    }

    /// Completes `operation` for `context` and decodes the result.
    pub async fn end<T: DeserializeOwned>(
        &self,
        context: &OperationContext,
        operation: &str,
    ) -> Result<T, FabricError> {
        if context.issuer() != self.client.tag {
            tracing::warn!(
                context_id = %context.id(),
                client = %self.client.name,
                "End called with a context issued by another client"
            );
            return Err(MisuseKind::UnknownContext {
                context: context.id(),
            }
            .into());
        }
        let payload = context
            .end(self.descriptor.subsystem.as_str(), operation)
            .await?;
        payload.decode(context.operation())
    }
}

// ---------------------------------------------------------------------------
// Capability
// ---------------------------------------------------------------------------

/// The capability object an identity-token lookup yields.
#[derive(Debug, Clone)]
pub enum Capability {
    PropertyManagement(PropertyManagementClient),
    Health(HealthClient),
    Query(QueryClient),
    ServiceManagement(ServiceManagementClient),
    /// An interface from a caller-supplied catalog; operations are issued
    /// through the raw handle.
    Other(InterfaceHandle),
}

impl Capability {
    pub(crate) fn from_handle(handle: InterfaceHandle) -> Self {
        match handle.descriptor.subsystem.as_str() {
            subsystem::PROPERTY_MANAGEMENT => {
                Self::PropertyManagement(PropertyManagementClient::new(handle))
            }
            subsystem::HEALTH => Self::Health(HealthClient::new(handle)),
            subsystem::QUERY => Self::Query(QueryClient::new(handle)),
            subsystem::SERVICE_MANAGEMENT => {
                Self::ServiceManagement(ServiceManagementClient::new(handle))
            }
            _ => Self::Other(handle),
        }
    }

    /// The underlying handle.
    pub fn handle(&self) -> &InterfaceHandle {
        match self {
            Self::PropertyManagement(c) => c.handle(),
            Self::Health(c) => c.handle(),
            Self::Query(c) => c.handle(),
            Self::ServiceManagement(c) => c.handle(),
            Self::Other(h) => h,
        }
    }

    /// Negotiated descriptor.
    pub fn descriptor(&self) -> &InterfaceDescriptor {
        self.handle().descriptor()
    }

    /// The client the capability issues through.
    pub fn client(&self) -> FabricClient {
        self.handle().client()
    }

    /// Returns the same capability at an older (or equal) version.
    pub fn upcast(&self, version: u32) -> Result<Capability, FabricError> {
        self.handle().upcast(version).map(Self::from_handle)
    }

    /// The property management handle, if that is what this capability is.
    pub fn into_property_management(self) -> Option<PropertyManagementClient> {
        match self {
            Self::PropertyManagement(c) => Some(c),
            _ => None,
        }
    }

    /// The health handle, if that is what this capability is.
    pub fn into_health(self) -> Option<HealthClient> {
        match self {
            Self::Health(c) => Some(c),
            _ => None,
        }
    }

    /// The query handle, if that is what this capability is.
    pub fn into_query(self) -> Option<QueryClient> {
        match self {
            Self::Query(c) => Some(c),
            _ => None,
        }
    }

    /// The service management handle, if that is what this capability is.
    pub fn into_service_management(self) -> Option<ServiceManagementClient> {
        match self {
            Self::ServiceManagement(c) => Some(c),
            _ => None,
        }
    }
}
