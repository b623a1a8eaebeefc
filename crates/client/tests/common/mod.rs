#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use client::{ConnectionEvent, FabricClient};
use local_engine::LocalEngine;
use protocol::{CompletionCallback, FabricName, OperationContext, PropertyName};

pub fn local_client(engine: &LocalEngine) -> FabricClient {
    FabricClient::builder()
        .local()
        .connect(Arc::new(engine.clone()))
        .unwrap()
}

pub fn name(value: &str) -> FabricName {
    FabricName::new(value).unwrap()
}

pub fn property(value: &str) -> PropertyName {
    PropertyName::new(value).unwrap()
}

/// Counts callback invocations.
pub fn counting_callback() -> (Arc<AtomicUsize>, Arc<dyn CompletionCallback>) {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&count);
    let callback: Arc<dyn CompletionCallback> = Arc::new(move |_: &OperationContext| {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    (count, callback)
}

/// Records every connection event in delivery order.
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<ConnectionEvent>>,
}

impl EventLog {
    pub fn push(&self, event: &ConnectionEvent) {
        self.events.lock().unwrap().push(event.clone());
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| match e {
                ConnectionEvent::Connected(_) => "connected",
                ConnectionEvent::Disconnected(_) => "disconnected",
            })
            .collect()
    }
}
