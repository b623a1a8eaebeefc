//! Core protocol domain for the fabric client.
//!
//! This crate contains every protocol concept shared by the client surface and
//! the engines behind it: identifiers, value types, the error taxonomy,
//! versioned capability interfaces, the Begin/End operation context, and the
//! engine port. Engines implement the traits defined here; they never add
//! protocol rules.
//!
//! ## Architectural Layer
//!
//! **Protocol logic + port definitions.** This crate performs no I/O. It
//! defines *what* an engine must provide; engine crates define *how*.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`InterfaceId`, `ContextId`, `FabricName`, etc.) |
//! | [`types`] | Shared value types (`Timeout`, `ClientRole`, `GatewayInformation`, `Timestamp`) |
//! | [`errors`] | Top-level error and retry-policy types |
//! | [`ladder`] | Append-only interface version ladders |
//! | [`catalog`] | Capability negotiation against an engine |
//! | [`interfaces`] | The built-in ladders and their identity tokens |
//! | [`operation`] | Operation context, completion callback, completer, `begin` |
//! | [`engine`] | The engine port traits and owned payload envelope |
//! | [`payloads`] | Request/result records of the built-in subsystems |

pub mod catalog;
pub mod engine;
pub mod errors;
pub mod identifiers;
pub mod interfaces;
pub mod ladder;
pub mod operation;
pub mod payloads;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use catalog::{CapabilityCatalog, EngineCapabilities};
pub use engine::{
    ConnectOptions, ConnectionSink, EnginePayload, EngineRequest, EngineSession, FabricEngine,
    ServiceNotification,
};
pub use errors::{ErrorCategory, FabricError, MisuseKind, RemoteErrorCode, RetryPolicy};
pub use identifiers::{
    ContextId, Endpoint, FabricName, InterfaceId, NodeName, OperationName, PropertyName,
    SubsystemName,
};
pub use ladder::{InterfaceDescriptor, InterfaceLadder, LadderError};
pub use operation::{
    begin, CompletionCallback, ContextState, OperationCompleter, OperationContext, OperationTarget,
    OutcomeKind,
};
pub use types::{ClientRole, GatewayInformation, Timeout, Timestamp};
