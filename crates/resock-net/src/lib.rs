//! Networking collaborators for resock.
//!
//! This crate plugs a real network and clock into [`resock_core::Client`]:
//!
//! - [`TungsteniteTransport`]: `ws://` and `wss://` connections, one tokio
//!   task per connection
//! - [`TokioScheduler`]: reconnect timers as sleeping tokio tasks
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use resock_core::ClientConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::new("wss://echo.example.com")
//!     .auto_reconnect(Duration::from_secs(1), 5);
//!
//! let client = resock_net::builder(config)?
//!     .on_message(|payload| println!("received: {payload:?}"))
//!     .build()?;
//!
//! client.state_changed().connect(|state| println!("state: {state}"));
//! # Ok(())
//! # }
//! ```

mod error;
pub mod logging;
mod scheduler;
mod transport;

use std::sync::Arc;

use resock_core::{Client, ClientBuilder, ClientConfig};

pub use error::{NetError, Result};
pub use scheduler::TokioScheduler;
pub use transport::TungsteniteTransport;

/// Start a [`ClientBuilder`] wired to the current tokio runtime.
///
/// The returned builder already carries a [`TungsteniteTransport`] and a
/// [`TokioScheduler`]; callbacks can still be added before `build`.
pub fn builder(config: ClientConfig) -> Result<ClientBuilder> {
    let transport = Arc::new(TungsteniteTransport::current()?);
    let scheduler = Arc::new(TokioScheduler::current()?);
    Ok(Client::builder(config)
        .transport(transport)
        .scheduler(scheduler))
}

/// Build a WebSocket client on the current tokio runtime.
pub fn connect(config: ClientConfig) -> Result<Client> {
    Ok(builder(config)?.build()?)
}
