//! The transport seam.
//!
//! A [`Transport`] owns the actual network connections. The client asks it to
//! connect, send and close, and the transport reports everything that happens
//! on a connection through the [`EventSink`] it was handed at connect time.

use std::sync::Arc;

use serde::Serialize;

use crate::address::Address;
use crate::error::TransportError;
use crate::message::{CloseReason, Payload, SocketEvent};

/// Identifies one transport connection.
///
/// Allocated by the client, strictly increasing per client. Events carrying a
/// connection id the client has already released are discarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Create a connection id from its raw value.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw value.
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type Dispatch = Arc<dyn Fn(ConnectionId, SocketEvent) + Send + Sync>;

/// Delivers the events of one connection back to its owner.
#[derive(Clone)]
pub struct EventSink {
    connection: ConnectionId,
    dispatch: Dispatch,
}

impl EventSink {
    /// Create a sink that forwards events for `connection` to `dispatch`.
    pub fn new<F>(connection: ConnectionId, dispatch: F) -> Self
    where
        F: Fn(ConnectionId, SocketEvent) + Send + Sync + 'static,
    {
        Self {
            connection,
            dispatch: Arc::new(dispatch),
        }
    }

    /// The connection this sink belongs to.
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Deliver an event.
    pub fn emit(&self, event: SocketEvent) {
        (self.dispatch)(self.connection, event);
    }

    /// Deliver [`SocketEvent::Open`].
    pub fn opened(&self) {
        self.emit(SocketEvent::Open);
    }

    /// Deliver [`SocketEvent::Message`].
    pub fn message(&self, payload: Payload) {
        self.emit(SocketEvent::Message(payload));
    }

    /// Deliver [`SocketEvent::Error`].
    pub fn error(&self, error: TransportError) {
        self.emit(SocketEvent::Error(error));
    }

    /// Deliver [`SocketEvent::Close`].
    pub fn closed(&self, reason: CloseReason) {
        self.emit(SocketEvent::Close(reason));
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("connection", &self.connection)
            .finish()
    }
}

/// A bidirectional connection provider.
///
/// Implementations must deliver events asynchronously: the sink must never be
/// invoked from inside `connect`, `send` or `close`. Events of one connection
/// must be delivered in the order they occurred, with at most one `Open` per
/// successful connect, and `Close` as the final event.
pub trait Transport: Send + Sync {
    /// URL schemes this transport can connect to, lowercase.
    fn schemes(&self) -> &[&str];

    /// Start connecting to `address`; report progress through `sink`.
    fn connect(&self, address: &Address, sink: EventSink) -> Result<(), TransportError>;

    /// Send `payload` on an open connection.
    fn send(&self, connection: ConnectionId, payload: Payload) -> Result<(), TransportError>;

    /// Begin closing a connection and release it.
    ///
    /// The transport may still deliver a final `Close` for it afterwards.
    fn close(&self, connection: ConnectionId, reason: Option<CloseReason>);
}
