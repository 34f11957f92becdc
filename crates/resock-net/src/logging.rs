//! Logging facilities for resock-net.
//!
//! Connection tasks log their start and finish at `debug`; timers log at
//! `trace`. Client-level events are logged by `resock_core` under
//! [`resock_core::logging::targets`].

/// Target names for log filtering.
pub mod targets {
    /// WebSocket connection tasks.
    pub const TRANSPORT: &str = "resock_net::transport";
    /// Tokio timer scheduler.
    pub const SCHEDULER: &str = "resock_net::scheduler";
}
