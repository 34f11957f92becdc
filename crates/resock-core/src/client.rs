//! The reconnecting client.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::address::Address;
use crate::config::{ClientConfig, ReconnectPolicy};
use crate::error::{ClientError, ConfigurationError, Result, TransportError};
use crate::history::{HistoryBuffer, HistoryKind, ReceivedEntry, SentEntry};
use crate::listener::{ListenerId, ListenerRegistry};
use crate::logging::{targets, transition};
use crate::message::{CloseReason, EventKind, Payload, SocketEvent};
use crate::scheduler::{Scheduler, TimerId};
use crate::signal::Signal;
use crate::state::ConnectionState;
use crate::transport::{ConnectionId, EventSink, Transport};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

#[derive(Clone, Default)]
struct Callbacks {
    on_open: Option<Arc<dyn Fn() + Send + Sync>>,
    on_close: Option<Callback<CloseReason>>,
    on_error: Option<Callback<TransportError>>,
    on_message: Option<Callback<Payload>>,
}

/// Builder for [`Client`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use resock_core::{Client, ClientConfig, ManualScheduler};
/// # use resock_core::{Address, ConnectionId, CloseReason, EventSink, Payload, Transport, TransportError};
/// # struct NullTransport;
/// # impl Transport for NullTransport {
/// #     fn schemes(&self) -> &[&str] { &["ws", "wss"] }
/// #     fn connect(&self, _: &Address, _: EventSink) -> Result<(), TransportError> { Ok(()) }
/// #     fn send(&self, _: ConnectionId, _: Payload) -> Result<(), TransportError> { Ok(()) }
/// #     fn close(&self, _: ConnectionId, _: Option<CloseReason>) {}
/// # }
///
/// let client = Client::builder(ClientConfig::new("ws://localhost:9000").history_capacity(20))
///     .transport(Arc::new(NullTransport))
///     .scheduler(Arc::new(ManualScheduler::new()))
///     .on_message(|payload| println!("got {payload:?}"))
///     .build()
///     .unwrap();
///
/// assert_eq!(client.history_capacity(), 20);
/// ```
#[must_use]
pub struct ClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    callbacks: Callbacks,
}

impl ClientBuilder {
    fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            scheduler: None,
            callbacks: Callbacks::default(),
        }
    }

    /// Set the transport that provides connections.
    pub fn transport<T: Transport + 'static>(mut self, transport: Arc<T>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the scheduler used to defer reconnection attempts.
    pub fn scheduler<S: Scheduler + 'static>(mut self, scheduler: Arc<S>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Called after the connection opens.
    pub fn on_open<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.callbacks.on_open = Some(Arc::new(callback));
        self
    }

    /// Called after the connection closes, before the reconnect policy runs.
    pub fn on_close<F>(mut self, callback: F) -> Self
    where
        F: Fn(&CloseReason) + Send + Sync + 'static,
    {
        self.callbacks.on_close = Some(Arc::new(callback));
        self
    }

    /// Called for every transport error.
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&TransportError) + Send + Sync + 'static,
    {
        self.callbacks.on_error = Some(Arc::new(callback));
        self
    }

    /// Called for every inbound payload, after it has been recorded.
    pub fn on_message<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.callbacks.on_message = Some(Arc::new(callback));
        self
    }

    /// Validate the configuration and create the client.
    ///
    /// When `auto_connect` is set the connection is initiated before this
    /// returns. A transport that fails to start connecting is then reported
    /// through the error callback and handled like a dropped connection.
    pub fn build(self) -> std::result::Result<Client, ConfigurationError> {
        let transport = self.transport.ok_or(ConfigurationError::MissingTransport)?;
        let scheduler = self.scheduler.ok_or(ConfigurationError::MissingScheduler)?;
        let address = Address::parse(&self.config.address, transport.schemes())?;
        let capacity = self.config.history_capacity;

        let shared = Arc::new(Shared {
            debug: self.config.debug,
            policy: self.config.reconnect,
            transport,
            scheduler,
            callbacks: self.callbacks,
            state_changed: Signal::new(),
            history_changed: Signal::new(),
            inner: Mutex::new(Inner {
                address,
                state: ConnectionState::Closed,
                connection: None,
                last_connection: ConnectionId::from_raw(0),
                attempts: 0,
                pending_reconnect: None,
                next_reconnect_token: 0,
                sent: HistoryBuffer::new(capacity),
                received: HistoryBuffer::new(capacity),
                sequence: 0,
            }),
        });

        transition!(shared.debug, target: targets::CLIENT, address = %self.config.address, "client created");

        if self.config.auto_connect {
            shared.connect_or_schedule();
        }

        Ok(Client { shared })
    }
}

/// The live connection owned by the client.
struct ActiveConnection {
    id: ConnectionId,
    listeners: ListenerRegistry,
}

#[derive(Clone, Copy)]
struct PendingReconnect {
    timer: TimerId,
    token: u64,
}

struct Inner {
    address: Address,
    state: ConnectionState,
    connection: Option<ActiveConnection>,
    last_connection: ConnectionId,
    attempts: u32,
    pending_reconnect: Option<PendingReconnect>,
    next_reconnect_token: u64,
    sent: HistoryBuffer<SentEntry>,
    received: HistoryBuffer<ReceivedEntry>,
    sequence: u64,
}

impl Inner {
    fn set_state(&mut self, state: ConnectionState, effects: &mut Effects, debug: bool) {
        if self.state == state {
            return;
        }
        transition!(debug, target: targets::CLIENT, from = %self.state, to = %state, "state change");
        self.state = state;
        effects.states.push(state);
    }

    fn active_id(&self) -> Option<ConnectionId> {
        self.connection.as_ref().map(|c| c.id)
    }
}

/// Notifications collected under the lock and emitted after it is released.
#[derive(Default)]
struct Effects {
    states: Vec<ConnectionState>,
    history: Vec<HistoryKind>,
}

impl Effects {
    fn flush(self, shared: &Shared) {
        for state in self.states {
            shared.state_changed.emit(state);
        }
        for kind in self.history {
            shared.history_changed.emit(kind);
        }
    }
}

struct Shared {
    debug: bool,
    policy: ReconnectPolicy,
    transport: Arc<dyn Transport>,
    scheduler: Arc<dyn Scheduler>,
    callbacks: Callbacks,
    state_changed: Signal<ConnectionState>,
    history_changed: Signal<HistoryKind>,
    inner: Mutex<Inner>,
}

impl Shared {
    /// Replace any existing connection with a new one to `inner.address`.
    fn open_connection(
        self: &Arc<Self>,
        inner: &mut Inner,
        effects: &mut Effects,
    ) -> std::result::Result<(), TransportError> {
        self.cancel_pending_reconnect(inner);

        if let Some(old) = inner.connection.take() {
            transition!(self.debug, target: targets::CLIENT, connection = %old.id, "superseding connection");
            self.transport.close(old.id, Some(CloseReason::normal()));
        }

        let id = inner.last_connection.next();
        inner.last_connection = id;
        inner.set_state(ConnectionState::Connecting, effects, self.debug);
        inner.connection = Some(ActiveConnection {
            id,
            listeners: ListenerRegistry::new(),
        });

        let weak: Weak<Shared> = Arc::downgrade(self);
        let sink = EventSink::new(id, move |connection, event| {
            if let Some(shared) = weak.upgrade() {
                shared.handle_event(connection, event);
            }
        });

        transition!(self.debug, target: targets::CLIENT, connection = %id, address = %inner.address, "connecting");
        if let Err(err) = self.transport.connect(&inner.address, sink) {
            inner.connection = None;
            inner.set_state(ConnectionState::Closed, effects, self.debug);
            return Err(err);
        }
        Ok(())
    }

    /// Open a connection; on a synchronous transport failure, fall back to
    /// the reconnect policy.
    fn open_or_schedule(
        self: &Arc<Self>,
        inner: &mut Inner,
        effects: &mut Effects,
    ) -> std::result::Result<(), TransportError> {
        let result = self.open_connection(inner, effects);
        if result.is_err() {
            self.schedule_reconnect(inner);
        }
        result
    }

    /// Emit collected notifications and report a failed connection start.
    fn finish_connect(&self, effects: Effects, result: std::result::Result<(), TransportError>) {
        effects.flush(self);

        if let Err(err) = result {
            tracing::warn!(target: targets::CLIENT, error = %err, "failed to start connection");
            if let Some(on_error) = &self.callbacks.on_error {
                on_error(&err);
            }
        }
    }

    fn connect_or_schedule(self: &Arc<Self>) {
        let mut effects = Effects::default();
        let result = self.open_or_schedule(&mut self.inner.lock(), &mut effects);
        self.finish_connect(effects, result);
    }

    fn cancel_pending_reconnect(&self, inner: &mut Inner) {
        if let Some(pending) = inner.pending_reconnect.take() {
            self.scheduler.cancel(pending.timer);
            transition!(self.debug, target: targets::RECONNECT, "pending reconnect cancelled");
        }
    }

    /// Consult the reconnect policy and, if it allows, schedule one attempt.
    fn schedule_reconnect(self: &Arc<Self>, inner: &mut Inner) {
        if inner.pending_reconnect.is_some() {
            return;
        }
        if !self.policy.allows(inner.attempts) {
            if self.policy.enabled {
                tracing::info!(
                    target: targets::RECONNECT,
                    attempts = inner.attempts,
                    "reconnect attempts exhausted"
                );
            }
            return;
        }

        inner.attempts += 1;
        inner.next_reconnect_token += 1;
        let token = inner.next_reconnect_token;

        let weak = Arc::downgrade(self);
        let timer = self.scheduler.schedule(
            self.policy.delay,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.fire_reconnect(token);
                }
            }),
        );
        inner.pending_reconnect = Some(PendingReconnect { timer, token });

        transition!(
            self.debug,
            target: targets::RECONNECT,
            attempt = inner.attempts,
            max_attempts = self.policy.max_attempts,
            delay = ?self.policy.delay,
            "reconnect scheduled"
        );
    }

    fn fire_reconnect(self: &Arc<Self>, token: u64) {
        let mut effects = Effects::default();
        // The claim and the connect happen under one lock.
        let result = {
            let mut inner = self.inner.lock();
            // Cancelled or superseded after the timer was already due.
            if inner.pending_reconnect.map(|pending| pending.token) != Some(token) {
                return;
            }
            inner.pending_reconnect = None;
            transition!(self.debug, target: targets::RECONNECT, attempt = inner.attempts, "reconnecting");
            self.open_or_schedule(&mut inner, &mut effects)
        };
        self.finish_connect(effects, result);
    }

    fn handle_event(self: &Arc<Self>, connection: ConnectionId, event: SocketEvent) {
        let mut effects = Effects::default();

        let listeners = {
            let mut inner = self.inner.lock();
            let Some(active) = inner.connection.as_ref().filter(|c| c.id == connection) else {
                tracing::trace!(
                    target: targets::CLIENT,
                    connection = %connection,
                    kind = %event.kind(),
                    "discarding event from released connection"
                );
                return;
            };
            let listeners = active.listeners.listeners(event.kind());

            match &event {
                SocketEvent::Open => {
                    inner.set_state(ConnectionState::Open, &mut effects, self.debug);
                    inner.attempts = 0;
                    self.cancel_pending_reconnect(&mut inner);
                }
                SocketEvent::Message(payload) => {
                    inner.sequence += 1;
                    let entry = ReceivedEntry {
                        payload: payload.clone(),
                        received_at: Utc::now(),
                        connection,
                        sequence: inner.sequence,
                    };
                    inner.received.record(entry);
                    effects.history.push(HistoryKind::Received);
                }
                SocketEvent::Error(err) => {
                    tracing::warn!(target: targets::CLIENT, connection = %connection, error = %err, "transport error");
                }
                SocketEvent::Close(reason) => {
                    transition!(
                        self.debug,
                        target: targets::CLIENT,
                        connection = %connection,
                        code = reason.code.as_u16(),
                        "connection closed by transport"
                    );
                    inner.set_state(ConnectionState::Closed, &mut effects, self.debug);
                }
            }
            listeners
        };

        effects.flush(self);

        match &event {
            SocketEvent::Open => {
                if let Some(on_open) = &self.callbacks.on_open {
                    on_open();
                }
            }
            SocketEvent::Message(payload) => {
                if let Some(on_message) = &self.callbacks.on_message {
                    on_message(payload);
                }
            }
            SocketEvent::Error(err) => {
                if let Some(on_error) = &self.callbacks.on_error {
                    on_error(err);
                }
            }
            SocketEvent::Close(reason) => {
                if let Some(on_close) = &self.callbacks.on_close {
                    on_close(reason);
                }
            }
        }

        for listener in listeners {
            listener(&event);
        }

        if matches!(event, SocketEvent::Close(_)) {
            let mut inner = self.inner.lock();
            // A callback may have reopened or closed the client in the meantime.
            if inner.active_id() == Some(connection) && inner.state == ConnectionState::Closed {
                self.schedule_reconnect(&mut inner);
            }
        }
    }
}

/// A point-in-time copy of everything the client exposes.
///
/// This is the data a debug panel renders.
#[derive(Clone, Debug, Serialize)]
pub struct ClientSnapshot {
    /// The target address.
    pub address: String,
    /// Current connection state.
    pub state: ConnectionState,
    /// The active transport connection, if any.
    pub connection: Option<ConnectionId>,
    /// Consecutive reconnection attempts since the last successful open.
    pub reconnect_attempts: u32,
    /// Whether a reconnection attempt is scheduled.
    pub reconnect_pending: bool,
    /// The history bound (`0` = unbounded).
    pub history_capacity: usize,
    /// Sent history, newest first.
    pub sent: Vec<SentEntry>,
    /// Received history, newest first.
    pub received: Vec<ReceivedEntry>,
    /// Registered listener counts per event kind.
    pub listeners: BTreeMap<EventKind, usize>,
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
}

/// A managed, reconnecting socket client.
///
/// The client owns at most one transport connection at a time. It tracks the
/// connection state, records sent and received payloads in bounded
/// newest-first histories, re-opens dropped connections according to its
/// [`ReconnectPolicy`], and fans raw events out to registered listeners.
///
/// All operations return immediately; connection progress is reported through
/// callbacks, listeners and the [`state_changed`](Self::state_changed) signal.
/// Callbacks run without any client lock held and may call back into the client.
///
/// Dropping the client closes it.
pub struct Client {
    shared: Arc<Shared>,
}

impl Client {
    /// Start building a client.
    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// Connect to `address`, replacing the configured address.
    ///
    /// Any existing connection is closed first without triggering
    /// reconnection, and any pending reconnection is cancelled.
    pub fn open(&self, address: &str) -> Result<()> {
        let address = Address::parse(address, self.shared.transport.schemes())?;
        self.open_with(Some(address))
    }

    /// Connect again to the current address.
    pub fn reopen(&self) -> Result<()> {
        self.open_with(None)
    }

    fn open_with(&self, address: Option<Address>) -> Result<()> {
        let mut effects = Effects::default();
        let result = {
            let mut inner = self.shared.inner.lock();
            if let Some(address) = address {
                inner.address = address;
            }
            self.shared.open_connection(&mut inner, &mut effects)
        };
        effects.flush(&self.shared);
        Ok(result?)
    }

    /// Send a payload on the open connection.
    ///
    /// Fails with [`ClientError::NotConnected`] when there is no connection and
    /// with [`ClientError::InvalidState`] unless the state is `Open`. On success
    /// exactly one entry is added to the sent history.
    pub fn send(&self, payload: impl Into<Payload>) -> Result<()> {
        let payload = payload.into();
        {
            let mut inner = self.shared.inner.lock();
            let id = inner.active_id().ok_or(ClientError::NotConnected)?;
            if !inner.state.is_open() {
                return Err(ClientError::InvalidState { state: inner.state });
            }

            self.shared.transport.send(id, payload.clone())?;
            inner.sent.record(SentEntry {
                payload,
                sent_at: Utc::now(),
            });
        }
        self.shared.history_changed.emit(HistoryKind::Sent);
        Ok(())
    }

    /// Send a text payload.
    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.send(Payload::Text(text.into()))
    }

    /// Send a binary payload.
    pub fn send_binary(&self, data: impl Into<Vec<u8>>) -> Result<()> {
        self.send(Payload::Binary(data.into()))
    }

    /// Close the connection intentionally.
    ///
    /// Cancels any pending reconnection, moves through `Closing` to `Closed`,
    /// releases the transport connection, and clears both histories and the
    /// attempt counter. If the connection had not already reported its close,
    /// the close callback and the connection's `Close` listeners run once with
    /// a normal close reason, and no reconnection follows. Events the
    /// transport still delivers for the released connection are ignored.
    pub fn close(&self) {
        let mut effects = Effects::default();
        let reason = CloseReason::normal();
        let released = {
            let mut inner = self.shared.inner.lock();
            self.shared.cancel_pending_reconnect(&mut inner);
            inner.attempts = 0;

            let mut released = None;
            if let Some(active) = inner.connection.take() {
                let was_live = inner.state != ConnectionState::Closed;
                inner.set_state(ConnectionState::Closing, &mut effects, self.shared.debug);
                self.shared.transport.close(active.id, Some(reason.clone()));
                if was_live {
                    released = Some(active.listeners.listeners(EventKind::Close));
                }
            }
            inner.set_state(ConnectionState::Closed, &mut effects, self.shared.debug);

            if !inner.sent.is_empty() {
                inner.sent.clear();
                effects.history.push(HistoryKind::Sent);
            }
            if !inner.received.is_empty() {
                inner.received.clear();
                effects.history.push(HistoryKind::Received);
            }
            released
        };
        effects.flush(&self.shared);

        let Some(listeners) = released else {
            return;
        };
        if let Some(on_close) = &self.shared.callbacks.on_close {
            on_close(&reason);
        }
        let event = SocketEvent::Close(reason);
        for listener in listeners {
            listener(&event);
        }
    }

    /// Register a raw-event listener on the current connection.
    ///
    /// Listeners run after the client's own bookkeeping and callbacks, in
    /// registration order. They belong to the connection and are discarded
    /// when it is released.
    pub fn add_listener<F>(&self, kind: EventKind, listener: F) -> Result<ListenerId>
    where
        F: Fn(&SocketEvent) + Send + Sync + 'static,
    {
        let mut inner = self.shared.inner.lock();
        let active = inner.connection.as_mut().ok_or(ClientError::NotConnected)?;
        Ok(active.listeners.add(kind, Arc::new(listener)))
    }

    /// Remove a listener.
    ///
    /// Returns `Ok(false)` if (`kind`, `id`) was not registered.
    pub fn remove_listener(&self, kind: EventKind, id: ListenerId) -> Result<bool> {
        let mut inner = self.shared.inner.lock();
        let active = inner.connection.as_mut().ok_or(ClientError::NotConnected)?;
        Ok(active.listeners.remove(kind, id))
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    /// Whether the connection is open.
    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// The current target address.
    pub fn address(&self) -> Address {
        self.shared.inner.lock().address.clone()
    }

    /// The active transport connection, if any.
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.shared.inner.lock().active_id()
    }

    /// Sent history, newest first.
    pub fn sent_history(&self) -> Vec<SentEntry> {
        self.shared.inner.lock().sent.to_vec()
    }

    /// Received history, newest first.
    pub fn received_history(&self) -> Vec<ReceivedEntry> {
        self.shared.inner.lock().received.to_vec()
    }

    /// The bound applied to both histories (`0` = unbounded).
    pub fn history_capacity(&self) -> usize {
        self.shared.inner.lock().sent.capacity()
    }

    /// Change the history bound; shrinking drops the oldest entries at once.
    pub fn set_history_capacity(&self, capacity: usize) {
        let mut effects = Effects::default();
        {
            let mut inner = self.shared.inner.lock();
            let (sent, received) = (inner.sent.len(), inner.received.len());
            inner.sent.set_capacity(capacity);
            inner.received.set_capacity(capacity);
            if inner.sent.len() != sent {
                effects.history.push(HistoryKind::Sent);
            }
            if inner.received.len() != received {
                effects.history.push(HistoryKind::Received);
            }
        }
        effects.flush(&self.shared);
    }

    /// Consecutive reconnection attempts since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.inner.lock().attempts
    }

    /// Whether a reconnection attempt is scheduled.
    pub fn is_reconnect_pending(&self) -> bool {
        self.shared.inner.lock().pending_reconnect.is_some()
    }

    /// The reconnection policy.
    pub fn reconnect_policy(&self) -> &ReconnectPolicy {
        &self.shared.policy
    }

    /// Number of listeners registered for `kind` on the current connection.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.shared
            .inner
            .lock()
            .connection
            .as_ref()
            .map_or(0, |c| c.listeners.len(kind))
    }

    /// Take a consistent snapshot of the client's observable state.
    pub fn snapshot(&self) -> ClientSnapshot {
        let inner = self.shared.inner.lock();
        ClientSnapshot {
            address: inner.address.to_string(),
            state: inner.state,
            connection: inner.active_id(),
            reconnect_attempts: inner.attempts,
            reconnect_pending: inner.pending_reconnect.is_some(),
            history_capacity: inner.sent.capacity(),
            sent: inner.sent.to_vec(),
            received: inner.received.to_vec(),
            listeners: inner
                .connection
                .as_ref()
                .map(|c| c.listeners.summary())
                .unwrap_or_default(),
            taken_at: Utc::now(),
        }
    }

    /// Emitted with the new state on every state change.
    pub fn state_changed(&self) -> &Signal<ConnectionState> {
        &self.shared.state_changed
    }

    /// Emitted whenever a history buffer changes.
    pub fn history_changed(&self) -> &Signal<HistoryKind> {
        &self.shared.history_changed
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("Client")
            .field("address", &inner.address.as_str())
            .field("state", &inner.state)
            .field("connection", &inner.active_id())
            .field("reconnect_attempts", &inner.attempts)
            .finish()
    }
}
