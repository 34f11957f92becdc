//! Shared test fixtures: a scriptable in-memory transport.

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use resock_core::{
    Address, Client, ClientConfig, CloseReason, ConnectionId, EventSink, ManualScheduler,
    Payload, Transport, TransportError,
};

#[derive(Default)]
struct MockState {
    sinks: Vec<EventSink>,
    addresses: Vec<String>,
    sent: Vec<(ConnectionId, Payload)>,
    closed: Vec<ConnectionId>,
    fail_next_connect: Option<TransportError>,
    fail_sends: bool,
}

/// A transport whose events are injected by the test.
pub struct MockTransport {
    schemes: Vec<&'static str>,
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new(schemes: &[&'static str]) -> Arc<Self> {
        Arc::new(Self {
            schemes: schemes.to_vec(),
            state: Mutex::new(MockState::default()),
        })
    }

    /// Number of `connect` calls so far.
    pub fn connect_count(&self) -> usize {
        self.state.lock().sinks.len()
    }

    /// Addresses passed to `connect`, in call order.
    pub fn addresses(&self) -> Vec<String> {
        self.state.lock().addresses.clone()
    }

    /// The sink handed over by the most recent `connect`.
    pub fn last_sink(&self) -> EventSink {
        self.state
            .lock()
            .sinks
            .last()
            .cloned()
            .expect("no connection attempted")
    }

    /// The sink handed over by the `index`-th `connect` call.
    pub fn sink(&self, index: usize) -> EventSink {
        self.state.lock().sinks[index].clone()
    }

    pub fn open(&self) {
        self.last_sink().opened();
    }

    pub fn message(&self, payload: impl Into<Payload>) {
        self.last_sink().message(payload.into());
    }

    pub fn error(&self, message: &str) {
        self.last_sink()
            .error(TransportError::Protocol(message.to_string()));
    }

    /// Simulate the peer dropping the connection.
    pub fn drop_connection(&self) {
        self.last_sink().closed(CloseReason::abnormal());
    }

    pub fn sent(&self) -> Vec<(ConnectionId, Payload)> {
        self.state.lock().sent.clone()
    }

    pub fn closed(&self) -> Vec<ConnectionId> {
        self.state.lock().closed.clone()
    }

    pub fn fail_next_connect(&self, error: TransportError) {
        self.state.lock().fail_next_connect = Some(error);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.state.lock().fail_sends = fail;
    }
}

impl Transport for MockTransport {
    fn schemes(&self) -> &[&str] {
        &self.schemes
    }

    fn connect(&self, address: &Address, sink: EventSink) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if let Some(err) = state.fail_next_connect.take() {
            return Err(err);
        }
        state.addresses.push(address.to_string());
        state.sinks.push(sink);
        Ok(())
    }

    fn send(&self, connection: ConnectionId, payload: Payload) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.fail_sends {
            return Err(TransportError::Send("mock send failure".into()));
        }
        state.sent.push((connection, payload));
        Ok(())
    }

    fn close(&self, connection: ConnectionId, _reason: Option<CloseReason>) {
        self.state.lock().closed.push(connection);
    }
}

pub struct Harness {
    pub client: Client,
    pub transport: Arc<MockTransport>,
    pub scheduler: Arc<ManualScheduler>,
}

/// Build a client against a mock transport that recognizes `proto`, `ws` and `wss`.
pub fn harness(config: ClientConfig) -> Harness {
    let transport = MockTransport::new(&["proto", "ws", "wss"]);
    let scheduler = Arc::new(ManualScheduler::new());
    let client = Client::builder(config)
        .transport(transport.clone())
        .scheduler(scheduler.clone())
        .build()
        .expect("valid configuration");
    Harness {
        client,
        transport,
        scheduler,
    }
}

/// A harness whose connection is already open.
pub fn open_harness(config: ClientConfig) -> Harness {
    let h = harness(config);
    h.transport.open();
    h
}
