//! The engine port.
//!
//! The engine is the opaque component that actually performs operations. The
//! client only ever talks to it through the traits in this module:
//!
//! - [`FabricEngine`] reports capabilities and opens sessions.
//! - [`EngineSession`] accepts scheduled operations for one client.
//! - [`ConnectionSink`] is how the engine reports connectivity and service
//!   notifications back to the client.
//!
//! Requests and results cross the port as [`EnginePayload`]s: owned,
//! versioned JSON documents. Nothing borrowed or pointer-shaped crosses it.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::catalog::EngineCapabilities;
use crate::operation::OperationCompleter;
use crate::{
    ClientRole, ContextId, Endpoint, FabricError, FabricName, GatewayInformation, InterfaceId,
    OperationName, SubsystemName, Timeout,
};

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// An owned, versioned request or result document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnginePayload {
    /// Layout version of `body`. Readers reject versions newer than
    /// [`EnginePayload::CURRENT_SCHEMA`].
    pub schema_version: u32,
    /// The document itself.
    pub body: serde_json::Value,
}

impl EnginePayload {
    /// The newest payload layout this build reads and writes.
    pub const CURRENT_SCHEMA: u32 = 1;

    /// A payload carrying no data (operations whose `End` returns nothing).
    pub fn empty() -> Self {
        Self {
            schema_version: Self::CURRENT_SCHEMA,
            body: serde_json::Value::Null,
        }
    }

    /// Serialises `value` into a payload.
    pub fn encode<T: Serialize>(operation: &OperationName, value: &T) -> Result<Self, FabricError> {
        let body = serde_json::to_value(value).map_err(|e| FabricError::Payload {
            operation: operation.clone(),
            message: format!("could not encode payload: {e}"),
        })?;
        Ok(Self {
            schema_version: Self::CURRENT_SCHEMA,
            body,
        })
    }

    /// Deserialises the payload into `T`.
    pub fn decode<T: DeserializeOwned>(&self, operation: &OperationName) -> Result<T, FabricError> {
        if self.schema_version > Self::CURRENT_SCHEMA {
            return Err(FabricError::Payload {
                operation: operation.clone(),
                message: format!(
                    "payload schema v{} is newer than supported v{}",
                    self.schema_version,
                    Self::CURRENT_SCHEMA
                ),
            });
        }
        serde_json::from_value(self.body.clone()).map_err(|e| FabricError::Payload {
            operation: operation.clone(),
            message: format!("could not decode payload: {e}"),
        })
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// One operation handed to an engine session.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineRequest {
    /// Context the result will be delivered to.
    pub context_id: ContextId,
    /// Subsystem the operation belongs to.
    pub subsystem: SubsystemName,
    /// Interface version the caller issued the operation through.
    pub interface: InterfaceId,
    /// Operation slot being invoked.
    pub operation: OperationName,
    /// Caller-specified timeout. Advisory for the engine; the context enforces
    /// it locally regardless.
    pub timeout: Timeout,
    /// Request document.
    pub payload: EnginePayload,
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// A change to the endpoints of a service the client is interested in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceNotification {
    /// Service whose endpoints changed.
    pub service_name: FabricName,
    /// Partition the change applies to, when the service is partitioned.
    pub partition_key: Option<String>,
    /// Current endpoint addresses.
    pub endpoints: Vec<String>,
    /// Monotonic version of the endpoint set.
    pub version: u64,
}

/// Engine-facing sink for connectivity and service notifications.
///
/// The engine may call these methods from any thread, and may repeat a report
/// (e.g. two `on_disconnected` calls for one outage); the receiver is
/// responsible for de-duplication.
pub trait ConnectionSink: Send + Sync {
    /// The session reached a gateway.
    fn on_connected(&self, gateway: GatewayInformation);

    /// The session lost its gateway.
    fn on_disconnected(&self, gateway: GatewayInformation);

    /// A service the client watches changed.
    fn on_service_notification(&self, notification: ServiceNotification);
}

// ---------------------------------------------------------------------------
// Engine traits
// ---------------------------------------------------------------------------

/// Options for opening a session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectOptions {
    /// Gateway endpoints. Empty means "in-process / local".
    pub endpoints: Vec<Endpoint>,
    /// Permission indicator for the session.
    pub role: ClientRole,
    /// Label the engine may attach to its own diagnostics.
    pub client_name: String,
}

impl ConnectOptions {
    /// Returns `true` if these options describe a local session.
    pub fn is_local(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// The engine: reports which interface versions it implements and opens
/// sessions.
pub trait FabricEngine: Send + Sync + std::fmt::Debug {
    /// Highest implemented version of each subsystem.
    fn capabilities(&self) -> EngineCapabilities;

    /// Opens a session. Synchronous from the caller's point of view; the
    /// engine reports reachability later through `sink`.
    fn connect(
        &self,
        options: ConnectOptions,
        sink: Arc<dyn ConnectionSink>,
    ) -> Result<Arc<dyn EngineSession>, FabricError>;
}

/// One client's session with the engine.
pub trait EngineSession: Send + Sync + std::fmt::Debug {
    /// Accepts `request` for execution and takes ownership of `completer`.
    ///
    /// Must not block on the operation itself. An `Err` means the request was
    /// never accepted; the completer is then dropped unused.
    fn schedule(&self, request: EngineRequest, completer: OperationCompleter)
        -> Result<(), FabricError>;

    /// Closes the session. Operations in flight are completed or released.
    fn close(&self);
}
