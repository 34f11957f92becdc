//! Logging facilities for resock.
//!
//! resock uses the `tracing` crate for instrumentation. To see logs, install
//! a subscriber in your application:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("resock_core::client=debug")
//!     .init();
//! ```
//!
//! Internal transitions (state changes, reconnect decisions, supersedes) are
//! logged at `debug` when the client was configured with `debug = true`, and
//! at `trace` otherwise. Transport errors are logged at `warn`, and an
//! exhausted reconnect policy at `info`.

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Connection manager target.
    pub const CLIENT: &str = "resock_core::client";
    /// Reconnection policy target.
    pub const RECONNECT: &str = "resock_core::reconnect";
    /// Scheduler target.
    pub const SCHEDULER: &str = "resock_core::scheduler";
    /// Signal emission target.
    pub const SIGNAL: &str = "resock_core::signal";
}

/// Log an internal transition at `debug` when `$debug` is set, else at `trace`.
macro_rules! transition {
    ($debug:expr, target: $target:expr, $($arg:tt)+) => {
        if $debug {
            ::tracing::debug!(target: $target, $($arg)+);
        } else {
            ::tracing::trace!(target: $target, $($arg)+);
        }
    };
}

pub(crate) use transition;
