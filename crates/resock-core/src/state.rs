//! Connection state.

use serde::Serialize;

/// Current state of a client's connection.
///
/// The state always reflects the last event observed from the transport. A
/// client that has never initiated a connection reads as `Closed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ConnectionState {
    /// A connection has been initiated and the transport has not opened yet.
    Connecting,
    /// Connected and ready to send/receive messages.
    Open,
    /// The connection is being closed.
    Closing,
    /// No open connection.
    Closed,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Closed
    }
}

impl ConnectionState {
    /// Whether payloads may be sent in this state.
    pub fn is_open(self) -> bool {
        self == Self::Open
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Open => write!(f, "Open"),
            Self::Closing => write!(f, "Closing"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}
