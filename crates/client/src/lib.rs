//! Fabric client surface.
//!
//! Produces the root capability object bound to an engine and exposes every
//! remote operation through the Begin/End protocol of [`protocol::operation`].
//!
//! ## Architectural Layer
//!
//! **Client surface.** Negotiation, request translation, and connection event
//! brokering live here. The engine is reached only through the
//! [`protocol::FabricEngine`] port, so the same client runs against a remote
//! gateway engine or the in-process `local-engine`.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`client`] | `FabricClient` and its builder |
//! | [`capability`] | Negotiated interface handles and the `Capability` enum |
//! | [`property`], [`health`], [`query`], [`service`] | Typed subsystem handles |
//! | [`results`] | Read-only result objects |
//! | [`connection`] | Connection lifecycle events and the de-duplicating broker |
//! | [`settings`] | Client settings and their validation |

pub mod capability;
pub mod client;
pub mod connection;
pub mod health;
pub mod property;
pub mod query;
pub mod results;
pub mod service;
pub mod settings;

pub use capability::{Capability, InterfaceHandle};
pub use client::{FabricClient, FabricClientBuilder};
pub use connection::{
    ClientHandlers, ConnectionBroker, ConnectionEvent, ConnectionEventHandler,
    ServiceNotificationHandler,
};
pub use health::HealthClient;
pub use property::PropertyManagementClient;
pub use query::QueryClient;
pub use results::{
    ApplicationListResult, ClusterHealthResult, NameEnumerationResult, NodeHealthResult,
    NodeListResult, PagedResult, PropertyEnumerationResult, PropertyResult,
    ResolvedPartitionResult, ServiceListResult,
};
pub use service::ServiceManagementClient;
pub use settings::ClientSettings;
