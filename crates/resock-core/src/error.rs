//! Error types for resock.

use crate::state::ConnectionState;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors raised while building a [`Client`](crate::Client).
///
/// These are fatal: no client is constructed when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    /// The address could not be parsed as a URL.
    #[error("Invalid address '{address}': {message}")]
    InvalidAddress { address: String, message: String },

    /// The address parsed, but its scheme is not handled by the transport.
    #[error("Unsupported scheme '{scheme}' in address '{address}' (expected one of: {expected})")]
    UnsupportedScheme {
        address: String,
        scheme: String,
        expected: String,
    },

    /// No transport was supplied to the builder.
    #[error("No transport configured")]
    MissingTransport,

    /// No scheduler was supplied to the builder.
    #[error("No scheduler configured")]
    MissingScheduler,

    /// The configuration document could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

impl ConfigurationError {
    /// Create an invalid address error.
    pub fn invalid_address(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported scheme error.
    pub fn unsupported_scheme(
        address: impl Into<String>,
        scheme: impl Into<String>,
        expected: &[&str],
    ) -> Self {
        Self::UnsupportedScheme {
            address: address.into(),
            scheme: scheme.into(),
            expected: expected.join(", "),
        }
    }
}

impl From<toml::de::Error> for ConfigurationError {
    fn from(err: toml::de::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Errors reported by a [`Transport`](crate::Transport).
///
/// Transport errors raised on an established connection are forwarded to the
/// error callback and never change the client's lifecycle on their own.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Establishing the connection failed.
    #[error("Connection error: {0}")]
    Connect(String),

    /// Writing a frame failed.
    #[error("Send error: {0}")]
    Send(String),

    /// Reading from the connection failed or the peer violated the protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The transport no longer knows the given connection.
    #[error("Unknown connection")]
    UnknownConnection,

    /// Any other transport failure.
    #[error("Transport error: {0}")]
    Other(String),
}

/// Operational errors returned synchronously by client operations.
///
/// Client state is left unchanged whenever one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// There is no active transport.
    #[error("Not connected")]
    NotConnected,

    /// The connection exists but is not in a state that allows the operation.
    #[error("Invalid connection state: {state}")]
    InvalidState { state: ConnectionState },

    /// The address passed to `open` was rejected.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The transport rejected the operation.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_scheme_message() {
        let err = ConfigurationError::unsupported_scheme("http://a", "http", &["ws", "wss"]);
        assert_eq!(
            err.to_string(),
            "Unsupported scheme 'http' in address 'http://a' (expected one of: ws, wss)"
        );
    }

    #[test]
    fn test_invalid_state_message() {
        let err = ClientError::InvalidState {
            state: ConnectionState::Connecting,
        };
        assert_eq!(err.to_string(), "Invalid connection state: Connecting");
    }

    #[test]
    fn test_transport_error_is_transparent() {
        let err: ClientError = TransportError::Send("broken pipe".into()).into();
        assert_eq!(err.to_string(), "Send error: broken pipe");
    }
}
