//! Core of resock: a managed, reconnecting socket client.
//!
//! This crate provides the framework-independent parts of resock:
//!
//! - **Connection Manager**: [`Client`] owns one transport connection at a
//!   time, tracks its [`ConnectionState`], and re-opens dropped connections
//!   according to a [`ReconnectPolicy`]
//! - **History Buffers**: bounded, newest-first records of sent and received
//!   payloads ([`HistoryBuffer`])
//! - **Event Fan-out**: raw-event listeners attached per connection
//!   ([`Client::add_listener`])
//! - **Change notification**: [`Signal`]s a UI layer can connect to
//!
//! The network and the clock are injected through the [`Transport`] and
//! [`Scheduler`] traits. `resock-net` provides a WebSocket transport and a
//! tokio scheduler; [`ManualScheduler`] drives time explicitly.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use resock_core::{Client, ClientConfig, EventKind};
//!
//! let config = ClientConfig::new("wss://example.com/feed")
//!     .auto_reconnect(Duration::from_millis(500), 5)
//!     .history_capacity(100);
//!
//! let client = Client::builder(config)
//!     .transport(transport)
//!     .scheduler(scheduler)
//!     .on_open(|| println!("connected"))
//!     .on_message(|payload| println!("received {payload:?}"))
//!     .build()?;
//!
//! client.state_changed().connect(|state| println!("state: {state}"));
//!
//! // Once open:
//! client.send_text("hello")?;
//! client.add_listener(EventKind::Message, |event| println!("raw: {event:?}"))?;
//! ```

mod address;
mod client;
mod config;
mod error;
mod history;
mod listener;
pub mod logging;
mod message;
mod scheduler;
mod signal;
mod state;
mod transport;

pub use address::Address;
pub use client::{Client, ClientBuilder, ClientSnapshot};
pub use config::{ClientConfig, ReconnectPolicy};
pub use error::{ClientError, ConfigurationError, Result, TransportError};
pub use history::{HistoryBuffer, HistoryKind, ReceivedEntry, SentEntry};
pub use listener::{Listener, ListenerId, ListenerRegistry};
pub use message::{CloseCode, CloseReason, EventKind, Payload, SocketEvent};
pub use scheduler::{ManualScheduler, Scheduler, Task, TimerId};
pub use signal::{Signal, SlotId};
pub use state::ConnectionState;
pub use transport::{ConnectionId, EventSink, Transport};
