//! The client construction surface.
//!
//! A [`FabricClient`] is bound to one engine session. Construction negotiates
//! the requested interface identity against the engine's capabilities
//! *before* a session is opened, so an unsupported identity fails without any
//! connection or operation context being created.
//!
//! The client is cheap to clone and safe to share between threads; it holds
//! no per-call state. Typed subsystem handles are obtained through
//! [`FabricClient::query_interface`] or the per-subsystem accessors.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use protocol::interfaces::{self, subsystem};
use protocol::{
    CapabilityCatalog, ClientRole, ConnectOptions, EngineCapabilities, EngineSession, Endpoint,
    FabricEngine, FabricError, GatewayInformation, InterfaceDescriptor, InterfaceId, Timeout,
};

use crate::capability::{Capability, InterfaceHandle};
use crate::connection::{
    ClientHandlers, ConnectionBroker, ConnectionEventHandler, ServiceNotificationHandler,
};
use crate::health::HealthClient;
use crate::property::PropertyManagementClient;
use crate::query::QueryClient;
use crate::service::ServiceManagementClient;
use crate::settings::ClientSettings;

static NEXT_CLIENT_TAG: AtomicU64 = AtomicU64::new(1);

pub(crate) struct ClientInner {
    pub(crate) tag: u64,
    pub(crate) catalog: CapabilityCatalog,
    pub(crate) engine_capabilities: EngineCapabilities,
    pub(crate) session: Arc<dyn EngineSession>,
    pub(crate) broker: Arc<ConnectionBroker>,
    pub(crate) settings: RwLock<ClientSettings>,
    pub(crate) closed: AtomicBool,
    pub(crate) role: ClientRole,
    pub(crate) name: String,
}

impl ClientInner {
    pub(crate) fn settings(&self) -> ClientSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!(client = %self.name, "closing fabric client");
            self.session.close();
        }
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.close();
    }
}

/// Handle to one engine session.
#[derive(Clone)]
pub struct FabricClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl std::fmt::Debug for FabricClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FabricClient")
            .field("name", &self.inner.name)
            .field("role", &self.inner.role)
            .field("connected", &self.is_connected())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl FabricClient {
    /// Starts building a client.
    pub fn builder() -> FabricClientBuilder {
        FabricClientBuilder::default()
    }

    /// Constructs a client bound to `endpoints` (empty means local) and
    /// returns the capability object of identity `interface`.
    ///
    /// Fails with [`FabricError::CapabilityMismatch`] when the engine does not
    /// implement `interface`; nothing is connected in that case.
    pub fn create(
        endpoints: Vec<Endpoint>,
        engine: Arc<dyn FabricEngine>,
        handlers: ClientHandlers,
        interface: InterfaceId,
    ) -> Result<Capability, FabricError> {
        let local = endpoints.is_empty();
        let mut builder = FabricClient::builder()
            .endpoints(endpoints)
            .handlers(handlers)
            .interface(interface);
        if local {
            builder = builder.local();
        }
        builder.connect(engine)?.query_interface(interface)
    }

    /// Returns the capability object of identity `id`.
    pub fn query_interface(&self, id: InterfaceId) -> Result<Capability, FabricError> {
        let descriptor = self.negotiate(id)?;
        Ok(Capability::from_handle(InterfaceHandle::new(
            Arc::clone(&self.inner),
            descriptor,
        )))
    }

    /// Returns a property management handle of `version`.
    pub fn property_management(
        &self,
        version: u32,
    ) -> Result<PropertyManagementClient, FabricError> {
        self.subsystem_handle(subsystem::PROPERTY_MANAGEMENT, version)
            .map(PropertyManagementClient::new)
    }

    /// Returns a health handle of `version`.
    pub fn health(&self, version: u32) -> Result<HealthClient, FabricError> {
        self.subsystem_handle(subsystem::HEALTH, version)
            .map(HealthClient::new)
    }

    /// Returns a query handle of `version`.
    pub fn query(&self, version: u32) -> Result<QueryClient, FabricError> {
        self.subsystem_handle(subsystem::QUERY, version)
            .map(QueryClient::new)
    }

    /// Returns a service management handle of `version`.
    pub fn service_management(&self, version: u32) -> Result<ServiceManagementClient, FabricError> {
        self.subsystem_handle(subsystem::SERVICE_MANAGEMENT, version)
            .map(ServiceManagementClient::new)
    }

    /// Returns the newest version of `subsystem` both sides implement.
    pub fn best_version(&self, subsystem: &str) -> Option<u32> {
        self.inner
            .catalog
            .best_supported(subsystem, &self.inner.engine_capabilities)
            .map(|d| d.version)
    }

    /// The catalog this client negotiates against.
    pub fn catalog(&self) -> &CapabilityCatalog {
        &self.inner.catalog
    }

    /// What the connected engine implements.
    pub fn engine_capabilities(&self) -> &EngineCapabilities {
        &self.inner.engine_capabilities
    }

    /// A copy of the current settings.
    pub fn settings(&self) -> ClientSettings {
        self.inner.settings()
    }

    /// Replaces the settings. Invalid settings are rejected and the current
    /// ones stay in effect.
    pub fn update_settings(&self, settings: ClientSettings) -> Result<(), FabricError> {
        settings.validate()?;
        *self
            .inner
            .settings
            .write()
            .unwrap_or_else(PoisonError::into_inner) = settings;
        tracing::debug!(client = %self.inner.name, "client settings updated");
        Ok(())
    }

    /// The settings' default operation timeout.
    pub fn default_timeout(&self) -> Timeout {
        self.settings().default_timeout()
    }

    /// The role the client connected with.
    pub fn role(&self) -> ClientRole {
        self.inner.role
    }

    /// Returns `true` while the engine reports a live gateway connection.
    pub fn is_connected(&self) -> bool {
        self.inner.broker.is_connected()
    }

    /// The gateway of the most recent connection transition.
    pub fn gateway_information(&self) -> Option<GatewayInformation> {
        self.inner.broker.gateway()
    }

    /// Returns `true` once [`FabricClient::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Closes the session. Further `Begin` calls fail with a scheduling
    /// error; contexts already issued complete or are released by the engine.
    pub fn close(&self) {
        self.inner.close();
    }

    fn negotiate(&self, id: InterfaceId) -> Result<InterfaceDescriptor, FabricError> {
        self.inner
            .catalog
            .negotiate(id, &self.inner.engine_capabilities)
            .cloned()
    }

    fn subsystem_handle(&self, subsystem: &str, version: u32) -> Result<InterfaceHandle, FabricError> {
        // A version this client was not built with has no identity token; the
        // nil token stands in for it.
        let id = self
            .inner
            .catalog
            .ladder(subsystem)
            .and_then(|ladder| ladder.get(version))
            .map(|d| d.id)
            .ok_or_else(|| FabricError::CapabilityMismatch {
                requested: InterfaceId::from_u128(0),
                subsystem: protocol::SubsystemName::new(subsystem),
                requested_version: Some(version),
                highest_supported: self.inner.engine_capabilities.highest_version(subsystem),
            })?;
        let descriptor = self.negotiate(id)?;
        Ok(InterfaceHandle::new(Arc::clone(&self.inner), descriptor))
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for [`FabricClient`].
#[derive(Debug, Default)]
pub struct FabricClientBuilder {
    endpoints: Vec<Endpoint>,
    local: bool,
    role: ClientRole,
    settings: Option<ClientSettings>,
    handlers: ClientHandlers,
    interface: Option<InterfaceId>,
    catalog: Option<CapabilityCatalog>,
}

impl FabricClientBuilder {
    /// Adds gateway endpoints.
    pub fn endpoints(mut self, endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        self.endpoints.extend(endpoints);
        self
    }

    /// Binds to an in-process engine instead of gateway endpoints.
    pub fn local(mut self) -> Self {
        self.local = true;
        self
    }

    /// Permission indicator the session is opened with. Defaults to
    /// [`ClientRole::User`].
    pub fn role(mut self, role: ClientRole) -> Self {
        self.role = role;
        self
    }

    /// Settings to start with. Validated by [`FabricClientBuilder::connect`].
    pub fn settings(mut self, settings: ClientSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Replaces both event handlers at once.
    pub fn handlers(mut self, handlers: ClientHandlers) -> Self {
        self.handlers = handlers;
        self
    }

    /// Receives connected/disconnected transitions, each delivered once.
    pub fn connection_handler(mut self, handler: Arc<dyn ConnectionEventHandler>) -> Self {
        self.handlers.connection = Some(handler);
        self
    }

    /// Receives endpoint changes that pass a registered notification filter.
    pub fn notification_handler(mut self, handler: Arc<dyn ServiceNotificationHandler>) -> Self {
        self.handlers.notifications = Some(handler);
        self
    }

    /// Interface identity the caller requires. Checked before connecting.
    pub fn interface(mut self, id: InterfaceId) -> Self {
        self.interface = Some(id);
        self
    }

    /// Replaces the built-in catalog.
    pub fn catalog(mut self, catalog: CapabilityCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Validates the configuration, negotiates the requested interface and
    /// opens a session on `engine`.
    #[tracing::instrument(skip_all, fields(endpoints = self.endpoints.len(), local = self.local))]
    pub fn connect(self, engine: Arc<dyn FabricEngine>) -> Result<FabricClient, FabricError> {
        let settings = self.settings.unwrap_or_default();
        settings.validate()?;

        if self.endpoints.is_empty() && !self.local {
            return Err(FabricError::Scheduling {
                target: "FabricClient".to_string(),
                reason: "no gateway endpoints given and local() was not requested".to_string(),
                transient: false,
            });
        }
        if !self.endpoints.is_empty() && self.local {
            return Err(FabricError::Configuration {
                message: "local() cannot be combined with gateway endpoints".to_string(),
            });
        }

        let catalog = match self.catalog {
            Some(catalog) => catalog,
            None => interfaces::well_known().map_err(|e| FabricError::Configuration {
                message: format!("built-in interface catalog is invalid: {e}"),
            })?,
        };
        let engine_capabilities = engine.capabilities();
        if let Some(id) = self.interface {
            catalog.negotiate(id, &engine_capabilities)?;
        }

        let tag = NEXT_CLIENT_TAG.fetch_add(1, Ordering::Relaxed);
        let name = if settings.client_friendly_name.is_empty() {
            format!("client-{tag}")
        } else {
            settings.client_friendly_name.clone()
        };
        let broker = Arc::new(ConnectionBroker::new(self.handlers));
        let session = engine.connect(
            ConnectOptions {
                endpoints: self.endpoints,
                role: self.role,
                client_name: name.clone(),
            },
            Arc::clone(&broker) as Arc<dyn protocol::ConnectionSink>,
        )?;

        tracing::info!(client = %name, role = %self.role, "fabric client created");
        Ok(FabricClient {
            inner: Arc::new(ClientInner {
                tag,
                catalog,
                engine_capabilities,
                session,
                broker,
                settings: RwLock::new(settings),
                closed: AtomicBool::new(false),
                role: self.role,
                name,
            }),
        })
    }
}
