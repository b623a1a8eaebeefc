//! Connection lifecycle and service notifications.
//!
//! The engine reports connectivity through [`ConnectionSink`]; it may report
//! from any thread and may repeat itself. [`ConnectionBroker`] sits between
//! the engine and the caller's handlers and turns those raw reports into an
//! alternating `Connected` / `Disconnected` sequence delivered in order, once
//! per transition.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use protocol::{ConnectionSink, GatewayInformation, ServiceNotification};

/// A connection lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The client reached a gateway.
    Connected(GatewayInformation),
    /// The client lost its gateway.
    Disconnected(GatewayInformation),
}

impl ConnectionEvent {
    /// The gateway the event is about.
    pub fn gateway(&self) -> &GatewayInformation {
        match self {
            Self::Connected(g) | Self::Disconnected(g) => g,
        }
    }
}

/// Receives connection lifecycle transitions.
///
/// Invoked on an engine-owned thread. Handlers must not report back into the
/// same broker from inside the call.
pub trait ConnectionEventHandler: Send + Sync {
    fn on_connection_event(&self, event: &ConnectionEvent);
}

impl<F> ConnectionEventHandler for F
where
    F: Fn(&ConnectionEvent) + Send + Sync,
{
    fn on_connection_event(&self, event: &ConnectionEvent) {
        self(event)
    }
}

/// Receives service endpoint change notifications.
pub trait ServiceNotificationHandler: Send + Sync {
    fn on_service_notification(&self, notification: &ServiceNotification);
}

impl<F> ServiceNotificationHandler for F
where
    F: Fn(&ServiceNotification) + Send + Sync,
{
    fn on_service_notification(&self, notification: &ServiceNotification) {
        self(notification)
    }
}

/// The optional handlers a client is constructed with.
#[derive(Clone, Default)]
pub struct ClientHandlers {
    pub connection: Option<Arc<dyn ConnectionEventHandler>>,
    pub notifications: Option<Arc<dyn ServiceNotificationHandler>>,
}

impl std::fmt::Debug for ClientHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandlers")
            .field("connection", &self.connection.is_some())
            .field("notifications", &self.notifications.is_some())
            .finish()
    }
}

#[derive(Debug, Default)]
struct LinkState {
    connected: bool,
    gateway: Option<GatewayInformation>,
}

/// De-duplicating bridge from engine reports to caller handlers.
pub struct ConnectionBroker {
    handlers: ClientHandlers,
    state: Mutex<LinkState>,
    /// Serialises delivery so handlers observe transitions in report order.
    delivery: Mutex<()>,
}

impl std::fmt::Debug for ConnectionBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionBroker")
            .field("handlers", &self.handlers)
            .field("state", &*self.state())
            .finish()
    }
}

impl ConnectionBroker {
    /// A broker that starts disconnected and reports to `handlers`.
    pub fn new(handlers: ClientHandlers) -> Self {
        Self {
            handlers,
            state: Mutex::new(LinkState::default()),
            delivery: Mutex::new(()),
        }
    }

    /// Returns `true` while the last delivered transition was `Connected`.
    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    /// The gateway of the last delivered transition.
    pub fn gateway(&self) -> Option<GatewayInformation> {
        self.state().gateway.clone()
    }

    fn state(&self) -> MutexGuard<'_, LinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, connected: bool, gateway: GatewayInformation) {
        let _delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
        let events = {
            let mut state = self.state();
            let events = match (state.connected, connected) {
                (false, true) => vec![ConnectionEvent::Connected(gateway.clone())],
                (true, false) => vec![ConnectionEvent::Disconnected(gateway.clone())],
                // A different gateway while connected is a reconnect.
                (true, true) if state.gateway.as_ref() != Some(&gateway) => {
                    let previous = state.gateway.clone().unwrap_or_else(|| gateway.clone());
                    vec![
                        ConnectionEvent::Disconnected(previous),
                        ConnectionEvent::Connected(gateway.clone()),
                    ]
                }
                _ => Vec::new(),
            };
            if events.is_empty() {
                tracing::debug!(
                    connected,
                    gateway = %gateway.address,
                    "duplicate connection report suppressed"
                );
                return;
            }
            state.connected = connected;
            state.gateway = Some(gateway);
            events
        };

        for event in &events {
            match event {
                ConnectionEvent::Connected(g) => {
                    tracing::info!(gateway = %g.address, node = %g.node_name, "connected to gateway")
                }
                ConnectionEvent::Disconnected(g) => {
                    tracing::warn!(gateway = %g.address, node = %g.node_name, "disconnected from gateway")
                }
            }
            if let Some(handler) = &self.handlers.connection {
                if catch_unwind(AssertUnwindSafe(|| handler.on_connection_event(event))).is_err() {
                    tracing::error!("connection event handler panicked");
                }
            }
        }
    }
}

impl ConnectionSink for ConnectionBroker {
    fn on_connected(&self, gateway: GatewayInformation) {
        self.transition(true, gateway);
    }

    fn on_disconnected(&self, gateway: GatewayInformation) {
        self.transition(false, gateway);
    }

    fn on_service_notification(&self, notification: ServiceNotification) {
        tracing::debug!(
            service = %notification.service_name,
            version = notification.version,
            endpoints = notification.endpoints.len(),
            "service notification"
        );
        if let Some(handler) = &self.handlers.notifications {
            if catch_unwind(AssertUnwindSafe(|| handler.on_service_notification(&notification)))
                .is_err()
            {
                tracing::error!("service notification handler panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{FabricName, NodeName};

    fn gateway(node: &str) -> GatewayInformation {
        GatewayInformation {
            address: format!("{node}:19000"),
            node_name: NodeName::new(node).unwrap(),
            node_instance_id: 1,
        }
    }

    fn recording_broker() -> (Arc<Mutex<Vec<ConnectionEvent>>>, ConnectionBroker) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let handler: Arc<dyn ConnectionEventHandler> =
            Arc::new(move |e: &ConnectionEvent| sink.lock().unwrap().push(e.clone()));
        let broker = ConnectionBroker::new(ClientHandlers {
            connection: Some(handler),
            notifications: None,
        });
        (events, broker)
    }

    #[test]
    fn test_repeated_reports_notify_once_per_transition() {
        let (events, broker) = recording_broker();
        broker.on_connected(gateway("n0"));
        broker.on_connected(gateway("n0"));
        broker.on_disconnected(gateway("n0"));
        broker.on_disconnected(gateway("n0"));
        broker.on_connected(gateway("n0"));

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                ConnectionEvent::Connected(gateway("n0")),
                ConnectionEvent::Disconnected(gateway("n0")),
                ConnectionEvent::Connected(gateway("n0")),
            ]
        );
        assert!(broker.is_connected());
    }

    #[test]
    fn test_gateway_switch_is_reported_as_reconnect() {
        let (events, broker) = recording_broker();
        broker.on_connected(gateway("n0"));
        broker.on_connected(gateway("n1"));
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1], ConnectionEvent::Disconnected(gateway("n0")));
        assert_eq!(broker.gateway(), Some(gateway("n1")));
    }

    #[test]
    fn test_disconnect_before_connect_is_ignored() {
        let (events, broker) = recording_broker();
        broker.on_disconnected(gateway("n0"));
        assert!(events.lock().unwrap().is_empty());
        assert!(!broker.is_connected());
    }

    #[test]
    fn test_handler_panic_is_contained() {
        let handler: Arc<dyn ConnectionEventHandler> =
            Arc::new(|_: &ConnectionEvent| panic!("handler bug"));
        let broker = ConnectionBroker::new(ClientHandlers {
            connection: Some(handler),
            notifications: None,
        });
        broker.on_connected(gateway("n0"));
        assert!(broker.is_connected());
    }

    #[test]
    fn test_service_notifications_are_forwarded() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: Arc<dyn ServiceNotificationHandler> =
            Arc::new(move |n: &ServiceNotification| sink.lock().unwrap().push(n.version));
        let broker = ConnectionBroker::new(ClientHandlers {
            connection: None,
            notifications: Some(handler),
        });
        broker.on_service_notification(ServiceNotification {
            service_name: FabricName::new("fabric:/app/svc").unwrap(),
            partition_key: None,
            endpoints: vec!["localhost:8080".into()],
            version: 4,
        });
        assert_eq!(*seen.lock().unwrap(), vec![4]);
    }
}
