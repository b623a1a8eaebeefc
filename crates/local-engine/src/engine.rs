//! The in-process engine and its sessions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use protocol::interfaces::{self, ops};
use protocol::payloads::{
    ApplicationInfo, ApplicationQueryRequest, EnumeratePropertiesRequest,
    EnumerateSubNamesRequest, HealthReport, NameRequest, NodeHealthRequest, NodeInfo,
    NodeQueryRequest, NotificationFilterId, PropertyRequest, PutPropertyRequest,
    ResolvePartitionRequest, ServiceInfo, ServiceNotificationFilter, ServiceQueryRequest,
    UnregisterFilterRequest,
};
use protocol::{
    CapabilityCatalog, ClientRole, ConnectOptions, ContextId, ConnectionSink, EngineCapabilities,
    EnginePayload, EngineRequest, EngineSession, FabricEngine, FabricError, FabricName,
    GatewayInformation, OperationCompleter, RemoteErrorCode, ServiceNotification, SubsystemName,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::runtime::Handle;

use crate::cluster::ClusterModel;
use crate::script::{Behavior, EngineScript};
use crate::service::{FilterSet, PartitionTable};
use crate::store::NamingStore;
use crate::OperationFailure;

/// Number of nodes a default engine simulates.
pub const DEFAULT_NODE_COUNT: usize = 5;

/// Port reported in gateway information for local sessions.
const LOCAL_GATEWAY_PORT: u16 = 19000;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct EngineData {
    naming: NamingStore,
    cluster: ClusterModel,
    partitions: PartitionTable,
}

#[derive(Debug)]
struct EngineState {
    capabilities: EngineCapabilities,
    catalog: CapabilityCatalog,
    data: Mutex<EngineData>,
    script: Mutex<EngineScript>,
    reachable: Mutex<bool>,
    transitions: Mutex<()>,
    sessions: Mutex<Vec<Weak<LocalSession>>>,
    next_filter_id: AtomicU64,
}

impl EngineState {
    fn live_sessions(&self) -> Vec<Arc<LocalSession>> {
        let mut sessions = lock(&self.sessions);
        sessions.retain(|s| s.strong_count() > 0);
        sessions
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|s| !s.closed.load(Ordering::Acquire))
            .collect()
    }
}

/// An in-process engine with an in-memory naming store and cluster model.
///
/// Operations run on tokio tasks, so completions arrive on a task other than
/// the issuer's. Behaviour can be scripted per operation with
/// [`LocalEngine::script`], and gateway loss simulated with
/// [`LocalEngine::set_reachable`].
#[derive(Debug, Clone)]
pub struct LocalEngine {
    state: Arc<EngineState>,
}

impl Default for LocalEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalEngine {
    /// An engine implementing the newest version of every built-in subsystem.
    pub fn new() -> Self {
        let catalog = builtin_catalog();
        let capabilities = catalog
            .ladders()
            .fold(EngineCapabilities::new(), |caps, ladder| {
                caps.with(ladder.subsystem(), ladder.latest().version)
            });
        Self::build(catalog, capabilities)
    }

    /// An engine reporting exactly `capabilities`.
    pub fn with_capabilities(capabilities: EngineCapabilities) -> Self {
        Self::build(builtin_catalog(), capabilities)
    }

    /// An engine implementing `subsystem` only up to `highest_version`, and
    /// the newest version of everything else.
    pub fn with_subsystem_version(subsystem: &SubsystemName, highest_version: u32) -> Self {
        let capabilities = Self::new().capabilities().with(subsystem, highest_version);
        Self::with_capabilities(capabilities)
    }

    fn build(catalog: CapabilityCatalog, capabilities: EngineCapabilities) -> Self {
        Self {
            state: Arc::new(EngineState {
                capabilities,
                catalog,
                data: Mutex::new(EngineData {
                    naming: NamingStore::new(),
                    cluster: ClusterModel::with_nodes(DEFAULT_NODE_COUNT),
                    partitions: PartitionTable::new(),
                }),
                script: Mutex::new(EngineScript::new()),
                reachable: Mutex::new(true),
                transitions: Mutex::new(()),
                sessions: Mutex::new(Vec::new()),
                next_filter_id: AtomicU64::new(1),
            }),
        }
    }

    /// Sets the behaviour of `operation` for every later `Begin`.
    pub fn script(&self, operation: &str, behavior: Behavior) {
        lock(&self.state.script).set(operation, behavior);
    }

    /// Replaces the whole script.
    pub fn set_script(&self, script: EngineScript) {
        *lock(&self.state.script) = script;
    }

    /// Removes the override of `operation`.
    pub fn clear_script(&self, operation: &str) {
        lock(&self.state.script).clear(operation);
    }

    /// Simulates the gateway becoming unreachable (`false`) or reachable
    /// again (`true`), reporting the transition to every open session.
    pub fn set_reachable(&self, reachable: bool) {
        // Held across the reports so concurrent toggles are delivered in order.
        let _transition = lock(&self.state.transitions);
        *lock(&self.state.reachable) = reachable;
        tracing::info!(reachable, "local gateway reachability changed");
        for session in self.state.live_sessions() {
            if reachable {
                session.sink.on_connected(session.gateway.clone());
            } else {
                session.sink.on_disconnected(session.gateway.clone());
            }
        }
    }

    /// Returns `false` while gateway loss is being simulated.
    pub fn is_reachable(&self) -> bool {
        *lock(&self.state.reachable)
    }

    /// Records a change of a service partition's endpoints and notifies every
    /// open session holding a filter that matches the service name.
    ///
    /// A notification whose version is not newer than the known endpoint set
    /// is dropped. Returns the number of sessions notified.
    pub fn publish_notification(&self, notification: ServiceNotification) -> usize {
        if !lock(&self.state.data).partitions.apply(&notification) {
            tracing::debug!(
                service = %notification.service_name,
                version = notification.version,
                "stale service notification dropped"
            );
            return 0;
        }
        let mut delivered = 0;
        for session in self.state.live_sessions() {
            if lock(&session.scope.filters).matches(&notification.service_name) {
                session.sink.on_service_notification(notification.clone());
                delivered += 1;
            }
        }
        tracing::debug!(
            service = %notification.service_name,
            version = notification.version,
            delivered,
            "service notification published"
        );
        delivered
    }

    /// Number of sessions that are still open.
    pub fn open_sessions(&self) -> usize {
        self.state.live_sessions().len()
    }

    /// Number of scripted-to-hang operations whose contexts are still waiting.
    pub fn held_operations(&self) -> usize {
        self.state
            .live_sessions()
            .iter()
            .map(|session| lock(&session.hung).len())
            .sum()
    }

    /// Adds a node to the simulated cluster, replacing one of the same name.
    pub fn add_node(&self, node: NodeInfo) {
        lock(&self.state.data).cluster.add_node(node);
    }

    /// Deploys an application to the simulated cluster.
    pub fn add_application(&self, application: ApplicationInfo) {
        lock(&self.state.data).cluster.add_application(application);
    }

    /// Adds a service under an existing application.
    pub fn add_service(
        &self,
        application: &FabricName,
        service: ServiceInfo,
    ) -> Result<(), OperationFailure> {
        lock(&self.state.data)
            .cluster
            .add_service(application, service)
    }
}

fn builtin_catalog() -> CapabilityCatalog {
    interfaces::well_known().unwrap_or_else(|e| {
        tracing::error!(error = %e, "built-in interface catalog is invalid");
        CapabilityCatalog::new()
    })
}

impl FabricEngine for LocalEngine {
    fn capabilities(&self) -> EngineCapabilities {
        self.state.capabilities.clone()
    }

    fn connect(
        &self,
        options: ConnectOptions,
        sink: Arc<dyn ConnectionSink>,
    ) -> Result<Arc<dyn EngineSession>, FabricError> {
        let (node_name, node_instance_id) = {
            let data = lock(&self.state.data);
            let node = data.cluster.first_node().ok_or_else(|| FabricError::Scheduling {
                target: "connect".to_string(),
                reason: "the local cluster has no nodes".to_string(),
                transient: false,
            })?;
            (node.name.clone(), node.instance_id)
        };
        let address = options
            .endpoints
            .first()
            .map(|e| e.as_str().to_string())
            .unwrap_or_else(|| format!("localhost:{LOCAL_GATEWAY_PORT}"));
        let session = Arc::new(LocalSession {
            engine: Arc::clone(&self.state),
            sink,
            scope: SessionScope {
                role: options.role,
                filters: Arc::new(Mutex::new(FilterSet::default())),
            },
            client_name: options.client_name,
            gateway: GatewayInformation {
                address,
                node_name,
                node_instance_id,
            },
            closed: AtomicBool::new(false),
            hung: Arc::new(Mutex::new(HashMap::new())),
        });
        lock(&self.state.sessions).push(Arc::downgrade(&session));

        tracing::debug!(
            client = %session.client_name,
            gateway = %session.gateway.address,
            role = %session.scope.role,
            "local session opened"
        );
        if self.is_reachable() {
            session.sink.on_connected(session.gateway.clone());
        }
        Ok(session)
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// What an operation may see of the session that issued it.
#[derive(Debug, Clone)]
struct SessionScope {
    role: ClientRole,
    filters: Arc<Mutex<FilterSet>>,
}

/// One client's session with a [`LocalEngine`].
pub struct LocalSession {
    engine: Arc<EngineState>,
    sink: Arc<dyn ConnectionSink>,
    scope: SessionScope,
    client_name: String,
    gateway: GatewayInformation,
    closed: AtomicBool,
    /// Completers of `Hang` operations, released once their context finishes.
    hung: Arc<Mutex<HashMap<ContextId, OperationCompleter>>>,
}

impl std::fmt::Debug for LocalSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSession")
            .field("client", &self.client_name)
            .field("role", &self.scope.role)
            .field("gateway", &self.gateway)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl LocalSession {
    fn reject(&self, request: &EngineRequest, reason: impl Into<String>, transient: bool) -> FabricError {
        let err = FabricError::Scheduling {
            target: format!("{}.{}", request.subsystem, request.operation),
            reason: reason.into(),
            transient,
        };
        tracing::debug!(context_id = %request.context_id, error = %err, "request rejected");
        err
    }
}

impl EngineSession for LocalSession {
    fn schedule(
        &self,
        request: EngineRequest,
        completer: OperationCompleter,
    ) -> Result<(), FabricError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(self.reject(&request, "session is closed", false));
        }
        if !*lock(&self.engine.reachable) {
            return Err(self.reject(&request, "gateway is not reachable", true));
        }
        let declared = self
            .engine
            .catalog
            .lookup(request.interface)
            .filter(|d| self.engine.capabilities.supports(d))
            .is_some_and(|d| d.declares(request.operation.as_str()));
        if !declared {
            return Err(self.reject(
                &request,
                format!("interface {} does not implement this operation", request.interface),
                false,
            ));
        }

        let behavior = lock(&self.engine.script)
            .behavior_for(request.operation.as_str())
            .cloned();
        if behavior == Some(Behavior::RejectSchedule) {
            return Err(self.reject(&request, "scheduling refused by engine script", true));
        }
        let runtime = Handle::try_current()
            .map_err(|_| self.reject(&request, "no async runtime available", false))?;

        tracing::debug!(
            context_id = %request.context_id,
            operation = %request.operation,
            behavior = ?behavior,
            "operation scheduled"
        );

        if behavior == Some(Behavior::Hang) {
            let context_id = completer.context_id();
            let finished = completer.abandoned();
            lock(&self.hung).insert(context_id, completer);
            let hung = Arc::downgrade(&self.hung);
            runtime.spawn(async move {
                finished.await;
                let released = hung.upgrade().and_then(|hung| lock(&hung).remove(&context_id));
                if released.is_some() {
                    tracing::debug!(%context_id, "released hung operation");
                }
            });
            return Ok(());
        }

        let engine = Arc::clone(&self.engine);
        let scope = self.scope.clone();
        runtime.spawn(async move {
            if let Some(Behavior::Delay(delay)) = behavior {
                tokio::time::sleep(delay).await;
            }
            if completer.is_abandoned() {
                tracing::debug!(
                    context_id = %completer.context_id(),
                    "caller stopped waiting; skipping operation"
                );
                return;
            }
            if let Some(Behavior::Fail(code)) = behavior {
                completer.fail(code, "failure injected by engine script");
                return;
            }
            match execute(&engine, &request, &scope) {
                Ok(payload) => completer.complete(payload),
                Err(failure) => completer.fail(failure.code, failure.message),
            };
        });
        Ok(())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let hung: Vec<OperationCompleter> = lock(&self.hung).drain().map(|(_, c)| c).collect();
        tracing::debug!(
            client = %self.client_name,
            released = hung.len(),
            "local session closed"
        );
        // Dropping an unfinished completer fails its context with ObjectClosed.
        drop(hung);
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

fn decode<T: DeserializeOwned>(request: &EngineRequest) -> Result<T, OperationFailure> {
    request
        .payload
        .decode(&request.operation)
        .map_err(|e| OperationFailure::new(RemoteErrorCode::InvalidArgument, e.to_string()))
}

fn encode<T: Serialize>(request: &EngineRequest, value: &T) -> Result<EnginePayload, OperationFailure> {
    EnginePayload::encode(&request.operation, value)
        .map_err(|e| OperationFailure::new(RemoteErrorCode::Other(-1), e.to_string()))
}

fn execute(
    engine: &EngineState,
    request: &EngineRequest,
    scope: &SessionScope,
) -> Result<EnginePayload, OperationFailure> {
    let mut data = lock(&engine.data);
    match request.operation.as_str() {
        ops::CREATE_NAME => {
            let r: NameRequest = decode(request)?;
            data.naming.create_name(&r.name)?;
            Ok(EnginePayload::empty())
        }
        ops::DELETE_NAME => {
            let r: NameRequest = decode(request)?;
            data.naming.delete_name(&r.name)?;
            Ok(EnginePayload::empty())
        }
        ops::NAME_EXISTS => {
            let r: NameRequest = decode(request)?;
            encode(request, &data.naming.name_exists(&r.name))
        }
        ops::ENUMERATE_SUB_NAMES => {
            let r: EnumerateSubNamesRequest = decode(request)?;
            encode(request, &data.naming.enumerate_sub_names(&r)?)
        }
        ops::PUT_PROPERTY | ops::PUT_CUSTOM_PROPERTY => {
            let r: PutPropertyRequest = decode(request)?;
            let custom = request.operation.as_str() == ops::PUT_CUSTOM_PROPERTY;
            if custom != r.custom_type_id.is_some() {
                return Err(OperationFailure::new(
                    RemoteErrorCode::InvalidArgument,
                    "custom type id must be set by PutCustomProperty and only by it",
                ));
            }
            data.naming.put_property(&r)?;
            Ok(EnginePayload::empty())
        }
        ops::GET_PROPERTY => {
            let r: PropertyRequest = decode(request)?;
            encode(request, &data.naming.get_property(&r)?)
        }
        ops::GET_PROPERTY_METADATA => {
            let r: PropertyRequest = decode(request)?;
            encode(request, &data.naming.get_property_metadata(&r)?)
        }
        ops::DELETE_PROPERTY => {
            let r: PropertyRequest = decode(request)?;
            data.naming.delete_property(&r)?;
            Ok(EnginePayload::empty())
        }
        ops::ENUMERATE_PROPERTIES => {
            let r: EnumeratePropertiesRequest = decode(request)?;
            encode(request, &data.naming.enumerate_properties(&r)?)
        }
        ops::REPORT_HEALTH => {
            let r: HealthReport = decode(request)?;
            data.cluster.report_health(&r, scope.role)?;
            Ok(EnginePayload::empty())
        }
        ops::GET_CLUSTER_HEALTH => encode(request, &data.cluster.cluster_health()),
        ops::GET_NODE_HEALTH => {
            let r: NodeHealthRequest = decode(request)?;
            encode(request, &data.cluster.node_health(&r.node_name)?)
        }
        ops::GET_NODE_LIST => {
            let r: NodeQueryRequest = decode(request)?;
            encode(request, &data.cluster.node_list(&r))
        }
        ops::GET_APPLICATION_LIST => {
            let r: ApplicationQueryRequest = decode(request)?;
            encode(request, &data.cluster.application_list(&r))
        }
        ops::GET_SERVICE_LIST => {
            let r: ServiceQueryRequest = decode(request)?;
            encode(request, &data.cluster.service_list(&r)?)
        }
        ops::RESOLVE_SERVICE_PARTITION => {
            let r: ResolvePartitionRequest = decode(request)?;
            encode(request, &data.partitions.resolve(&r)?)
        }
        ops::REGISTER_SERVICE_NOTIFICATION_FILTER => {
            let filter: ServiceNotificationFilter = decode(request)?;
            let id = NotificationFilterId(engine.next_filter_id.fetch_add(1, Ordering::Relaxed));
            tracing::debug!(filter_id = %id, name = %filter.name, "notification filter registered");
            lock(&scope.filters).register(id, filter);
            encode(request, &id)
        }
        ops::UNREGISTER_SERVICE_NOTIFICATION_FILTER => {
            let r: UnregisterFilterRequest = decode(request)?;
            lock(&scope.filters).unregister(r.filter_id)?;
            Ok(EnginePayload::empty())
        }
        other => Err(OperationFailure::new(
            RemoteErrorCode::InvalidArgument,
            format!("the local engine does not implement '{other}'"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use protocol::interfaces::{iid, subsystem};
    use protocol::{begin, InterfaceId, OperationName, OperationTarget, Timeout};

    #[derive(Default)]
    struct CountingSink {
        connected: Mutex<u32>,
        disconnected: Mutex<u32>,
    }

    impl ConnectionSink for CountingSink {
        fn on_connected(&self, _: GatewayInformation) {
            *self.connected.lock().unwrap() += 1;
        }
        fn on_disconnected(&self, _: GatewayInformation) {
            *self.disconnected.lock().unwrap() += 1;
        }
        fn on_service_notification(&self, _: ServiceNotification) {}
    }

    fn open(engine: &LocalEngine) -> (Arc<CountingSink>, Arc<dyn EngineSession>) {
        let sink = Arc::new(CountingSink::default());
        let session = engine
            .connect(ConnectOptions::default(), Arc::clone(&sink) as Arc<dyn ConnectionSink>)
            .unwrap();
        (sink, session)
    }

    fn issue(
        session: &Arc<dyn EngineSession>,
        interface: InterfaceId,
        operation: &str,
        body: serde_json::Value,
        timeout: Timeout,
    ) -> Result<protocol::OperationContext, FabricError> {
        let target = OperationTarget {
            subsystem: SubsystemName::new(subsystem::PROPERTY_MANAGEMENT).unwrap(),
            operation: OperationName::new(operation).unwrap(),
            interface,
            timeout,
            issuer: 0,
        };
        let session = Arc::clone(session);
        begin(target.clone(), None, move |completer| {
            session.schedule(
                EngineRequest {
                    context_id: completer.context_id(),
                    subsystem: target.subsystem,
                    interface: target.interface,
                    operation: target.operation,
                    timeout,
                    payload: EnginePayload {
                        schema_version: EnginePayload::CURRENT_SCHEMA,
                        body,
                    },
                },
                completer,
            )
        })
    }

    #[tokio::test]
    async fn test_connect_reports_connected_once() {
        let engine = LocalEngine::new();
        let (sink, _session) = open(&engine);
        assert_eq!(*sink.connected.lock().unwrap(), 1);
        engine.set_reachable(false);
        engine.set_reachable(true);
        assert_eq!(*sink.connected.lock().unwrap(), 2);
        assert_eq!(*sink.disconnected.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_operation_runs_against_store() {
        let engine = LocalEngine::new();
        let (_sink, session) = open(&engine);
        let ctx = issue(
            &session,
            iid::PROPERTY_MANAGEMENT_CLIENT,
            ops::CREATE_NAME,
            serde_json::json!({"name": "fabric:/a"}),
            Timeout::INFINITE,
        )
        .unwrap();
        ctx.end(subsystem::PROPERTY_MANAGEMENT, ops::CREATE_NAME)
            .await
            .unwrap();

        let ctx = issue(
            &session,
            iid::PROPERTY_MANAGEMENT_CLIENT,
            ops::NAME_EXISTS,
            serde_json::json!({"name": "fabric:/a"}),
            Timeout::INFINITE,
        )
        .unwrap();
        let payload = ctx
            .end(subsystem::PROPERTY_MANAGEMENT, ops::NAME_EXISTS)
            .await
            .unwrap();
        assert_eq!(payload.body, serde_json::json!(true));
    }

    #[tokio::test]
    async fn test_unreachable_gateway_rejects_scheduling() {
        let engine = LocalEngine::new();
        let (_sink, session) = open(&engine);
        engine.set_reachable(false);
        let err = issue(
            &session,
            iid::PROPERTY_MANAGEMENT_CLIENT,
            ops::CREATE_NAME,
            serde_json::json!({"name": "fabric:/a"}),
            Timeout::INFINITE,
        )
        .unwrap_err();
        assert!(matches!(err, FabricError::Scheduling { transient: true, .. }));
    }

    #[tokio::test]
    async fn test_operation_outside_interface_is_rejected() {
        let engine = LocalEngine::new();
        let (_sink, session) = open(&engine);
        let err = issue(
            &session,
            iid::PROPERTY_MANAGEMENT_CLIENT,
            ops::GET_PROPERTY_METADATA,
            serde_json::json!({}),
            Timeout::INFINITE,
        )
        .unwrap_err();
        assert!(matches!(err, FabricError::Scheduling { transient: false, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_operation_is_skipped() {
        let engine = LocalEngine::new();
        engine.script(ops::CREATE_NAME, Behavior::Delay(Duration::from_secs(10)));
        let (_sink, session) = open(&engine);
        let ctx = issue(
            &session,
            iid::PROPERTY_MANAGEMENT_CLIENT,
            ops::CREATE_NAME,
            serde_json::json!({"name": "fabric:/late"}),
            Timeout::from_millis(1_000),
        )
        .unwrap();
        let err = ctx
            .end(subsystem::PROPERTY_MANAGEMENT, ops::CREATE_NAME)
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(!lock(&engine.state.data)
            .naming
            .name_exists(&FabricName::new("fabric:/late").unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_hung_operations_are_released() {
        let engine = LocalEngine::new();
        engine.script(ops::CREATE_NAME, Behavior::Hang);
        let (_sink, session) = open(&engine);
        for i in 0..200 {
            let ctx = issue(
                &session,
                iid::PROPERTY_MANAGEMENT_CLIENT,
                ops::CREATE_NAME,
                serde_json::json!({ "name": format!("fabric:/hung/{i}") }),
                Timeout::from_millis(10),
            )
            .unwrap();
            let err = ctx
                .end(subsystem::PROPERTY_MANAGEMENT, ops::CREATE_NAME)
                .await
                .unwrap_err();
            assert!(err.is_timeout());
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(engine.held_operations(), 0);
    }

    #[tokio::test]
    async fn test_hung_operation_is_held_until_cancelled() {
        let engine = LocalEngine::new();
        engine.script(ops::CREATE_NAME, Behavior::Hang);
        let (_sink, session) = open(&engine);
        let ctx = issue(
            &session,
            iid::PROPERTY_MANAGEMENT_CLIENT,
            ops::CREATE_NAME,
            serde_json::json!({"name": "fabric:/a"}),
            Timeout::INFINITE,
        )
        .unwrap();
        assert_eq!(engine.held_operations(), 1);

        assert!(ctx.cancel());
        tokio::task::yield_now().await;
        assert_eq!(engine.held_operations(), 0);
    }

    #[tokio::test]
    async fn test_malformed_name_is_rejected_by_engine() {
        let engine = LocalEngine::new();
        let (_sink, session) = open(&engine);
        let ctx = issue(
            &session,
            iid::PROPERTY_MANAGEMENT_CLIENT,
            ops::CREATE_NAME,
            serde_json::json!({"name": "a\u{e9}\u{e9}\u{e9}\u{e9}"}),
            Timeout::INFINITE,
        )
        .unwrap();
        let err = ctx
            .end(subsystem::PROPERTY_MANAGEMENT, ops::CREATE_NAME)
            .await
            .unwrap_err();
        assert_eq!(err.remote_code(), Some(RemoteErrorCode::InvalidArgument));
    }

    #[tokio::test]
    async fn test_close_releases_hung_operations() {
        let engine = LocalEngine::new();
        engine.script(ops::CREATE_NAME, Behavior::Hang);
        let (_sink, session) = open(&engine);
        let ctx = issue(
            &session,
            iid::PROPERTY_MANAGEMENT_CLIENT,
            ops::CREATE_NAME,
            serde_json::json!({"name": "fabric:/a"}),
            Timeout::INFINITE,
        )
        .unwrap();
        assert!(!ctx.is_completed());
        session.close();
        let err = ctx
            .end(subsystem::PROPERTY_MANAGEMENT, ops::CREATE_NAME)
            .await
            .unwrap_err();
        assert_eq!(err.remote_code(), Some(RemoteErrorCode::ObjectClosed));
        assert_eq!(engine.open_sessions(), 0);
    }
}
