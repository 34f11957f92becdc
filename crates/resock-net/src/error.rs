//! Error types for the networking collaborators.

use resock_core::ConfigurationError;
use thiserror::Error;

/// A specialized Result type for resock-net.
pub type Result<T> = std::result::Result<T, NetError>;

/// Errors raised while assembling a networked client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetError {
    /// No tokio runtime is available to run connection tasks and timers.
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),

    /// The client configuration was rejected.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}
