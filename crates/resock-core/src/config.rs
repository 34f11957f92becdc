//! Client configuration.
//!
//! [`ClientConfig`] holds every option that can be written down: the target
//! address, the reconnection policy, the history bound and the debug flag.
//! It can be built in code or loaded from TOML:
//!
//! ```
//! use resock_core::ClientConfig;
//!
//! let config = ClientConfig::from_toml_str(r#"
//! address = "wss://example.com/feed"
//! history_capacity = 50
//!
//! [reconnect]
//! enabled = true
//! delay_ms = 250
//! max_attempts = 5
//! "#).unwrap();
//!
//! assert_eq!(config.history_capacity, 50);
//! assert_eq!(config.reconnect.max_attempts, 5);
//! ```
//!
//! Callbacks are not configuration; they are supplied to
//! [`ClientBuilder`](crate::ClientBuilder).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Rules governing whether and when a dropped connection is re-established.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Whether automatic reconnection is enabled.
    pub enabled: bool,
    /// Fixed delay before each reconnection attempt.
    #[serde(rename = "delay_ms", with = "duration_millis")]
    pub delay: Duration,
    /// Maximum number of consecutive attempts. `0` never reconnects.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            delay: Duration::from_millis(1000),
            max_attempts: 3,
        }
    }
}

impl ReconnectPolicy {
    /// Create a disabled policy with default delay and attempt limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an enabled policy.
    pub fn enabled(delay: Duration, max_attempts: u32) -> Self {
        Self {
            enabled: true,
            delay,
            max_attempts,
        }
    }

    /// Set the delay between reconnection attempts.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the maximum number of reconnection attempts.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Whether another attempt may be made after `attempts` have already been made.
    pub fn allows(&self, attempts: u32) -> bool {
        self.enabled && attempts < self.max_attempts
    }
}

/// Configuration for a [`Client`](crate::Client).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// The target address. Validated against the transport's schemes at build time.
    pub address: String,
    /// Emit diagnostic traces of internal transitions at `debug` level.
    #[serde(default)]
    pub debug: bool,
    /// Bound applied to both history buffers. `0` means unbounded.
    #[serde(default)]
    pub history_capacity: usize,
    /// Open the connection as soon as the client is built.
    #[serde(default = "default_auto_connect")]
    pub auto_connect: bool,
    /// Reconnection policy. Kept last so it serializes as a trailing TOML table.
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
}

fn default_auto_connect() -> bool {
    true
}

impl ClientConfig {
    /// Create a configuration for the given address with default options.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            debug: false,
            history_capacity: 0,
            auto_connect: true,
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Parse a configuration from a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigurationError> {
        Ok(toml::from_str(source)?)
    }

    /// Enable or disable debug tracing.
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Set the reconnection policy.
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Enable reconnection with the given delay and attempt limit.
    pub fn auto_reconnect(mut self, delay: Duration, max_attempts: u32) -> Self {
        self.reconnect = ReconnectPolicy::enabled(delay, max_attempts);
        self
    }

    /// Set the history bound (`0` = unbounded).
    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Choose whether building the client opens the connection immediately.
    pub fn auto_connect(mut self, enabled: bool) -> Self {
        self.auto_connect = enabled;
        self
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Whole milliseconds, saturating at `u64::MAX`.
    pub fn millis(value: &Duration) -> u64 {
        u64::try_from(value.as_millis()).unwrap_or(u64::MAX)
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(millis(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
