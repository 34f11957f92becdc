//! WebSocket transport built on tokio-tungstenite.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use resock_core::{
    Address, CloseCode, CloseReason, ConnectionId, EventSink, Payload, Transport, TransportError,
};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as TungsteniteCloseCode;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{NetError, Result};
use crate::logging::targets;

const SCHEMES: &[&str] = &["ws", "wss"];

/// Command sent to a connection task.
enum Command {
    Send(Payload),
    Close(Option<CloseReason>),
}

type Connections = Arc<Mutex<HashMap<ConnectionId, mpsc::UnboundedSender<Command>>>>;

/// A [`Transport`] for `ws://` and `wss://` addresses.
///
/// Every connection runs in its own task on the given tokio runtime. The task
/// performs the handshake, reports `Open`, forwards inbound text and binary
/// frames, and always finishes with exactly one `Close` event. Ping/pong is
/// handled by tungstenite.
#[derive(Clone)]
pub struct TungsteniteTransport {
    runtime: Handle,
    connections: Connections,
}

impl TungsteniteTransport {
    /// Create a transport that spawns its connection tasks on `runtime`.
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            connections: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create a transport on the tokio runtime of the calling context.
    pub fn current() -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| NetError::NoRuntime(e.to_string()))?;
        Ok(Self::new(runtime))
    }

    /// Number of connections whose task is still running.
    pub fn active_connections(&self) -> usize {
        self.connections.lock().len()
    }
}

impl Transport for TungsteniteTransport {
    fn schemes(&self) -> &[&str] {
        SCHEMES
    }

    fn connect(&self, address: &Address, sink: EventSink) -> std::result::Result<(), TransportError> {
        let request = address
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.lock().insert(sink.connection(), tx);

        tracing::debug!(target: targets::TRANSPORT, connection = %sink.connection(), %address, "spawning connection task");
        self.runtime
            .spawn(run_connection(request, sink, rx, self.connections.clone()));
        Ok(())
    }

    fn send(&self, connection: ConnectionId, payload: Payload) -> std::result::Result<(), TransportError> {
        let connections = self.connections.lock();
        let tx = connections
            .get(&connection)
            .ok_or(TransportError::UnknownConnection)?;
        tx.send(Command::Send(payload))
            .map_err(|_| TransportError::Send("connection task has stopped".into()))
    }

    fn close(&self, connection: ConnectionId, reason: Option<CloseReason>) {
        if let Some(tx) = self.connections.lock().remove(&connection) {
            let _ = tx.send(Command::Close(reason));
        }
    }
}

impl std::fmt::Debug for TungsteniteTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TungsteniteTransport")
            .field("active_connections", &self.active_connections())
            .finish()
    }
}

async fn run_connection(
    request: Request,
    sink: EventSink,
    mut rx: mpsc::UnboundedReceiver<Command>,
    connections: Connections,
) {
    let id = sink.connection();

    let ws_stream = match tokio_tungstenite::connect_async(request).await {
        Ok((ws_stream, _response)) => ws_stream,
        Err(e) => {
            connections.lock().remove(&id);
            sink.error(TransportError::Connect(e.to_string()));
            sink.closed(CloseReason::abnormal());
            return;
        }
    };

    sink.opened();
    let (mut write, mut read) = ws_stream.split();

    let reason = loop {
        tokio::select! {
            // Receive command from the client
            cmd = rx.recv() => {
                match cmd {
                    Some(Command::Send(payload)) => {
                        if let Err(e) = write.send(to_message(payload)).await {
                            sink.error(TransportError::Send(e.to_string()));
                            break CloseReason::abnormal();
                        }
                    }
                    Some(Command::Close(reason)) => {
                        let reason = reason.unwrap_or_default();
                        let frame = CloseFrame {
                            code: TungsteniteCloseCode::from(reason.code.as_u16()),
                            reason: reason.reason.clone().unwrap_or_default().into(),
                        };
                        let _ = write.send(Message::Close(Some(frame))).await;
                        break reason;
                    }
                    None => {
                        // Transport dropped
                        let _ = write.close().await;
                        break CloseReason::normal();
                    }
                }
            }

            // Receive message from server
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        sink.message(Payload::Text(text.to_string()));
                    }
                    Some(Ok(Message::Binary(data))) => {
                        sink.message(Payload::Binary(data.to_vec()));
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {
                        // Pong is sent automatically by tungstenite
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break frame.map_or(CloseReason::new(CloseCode::NoStatus), |frame| {
                            from_close_frame(&frame)
                        });
                    }
                    Some(Err(e)) => {
                        sink.error(TransportError::Protocol(e.to_string()));
                        break CloseReason::abnormal();
                    }
                    None => {
                        // Stream ended without a close frame
                        break CloseReason::abnormal();
                    }
                }
            }
        }
    };

    connections.lock().remove(&id);
    tracing::debug!(target: targets::TRANSPORT, connection = %id, code = reason.code.as_u16(), "connection task finished");
    sink.closed(reason);
}

fn to_message(payload: Payload) -> Message {
    match payload {
        Payload::Text(text) => Message::Text(text.into()),
        Payload::Binary(data) => Message::Binary(data.into()),
    }
}

fn from_close_frame(frame: &CloseFrame) -> CloseReason {
    let code = CloseCode::from_u16(u16::from(frame.code));
    if frame.reason.is_empty() {
        CloseReason::new(code)
    } else {
        CloseReason::with_reason(code, frame.reason.as_str())
    }
}
