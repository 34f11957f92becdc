//! Echo client example: keeps a WebSocket connection alive and sends a ping
//! every second.
//!
//! Run with: cargo run -p resock-net --example echo_client -- ws://127.0.0.1:9001
//!
//! Pass a path ending in `.toml` instead of an address to load a
//! `ClientConfig` file. Set `RUST_LOG=resock_core=debug` to see transitions.

use std::time::Duration;

use resock_core::{ClientConfig, ConnectionState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let arg = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:9001".to_string());
    let config = if arg.ends_with(".toml") {
        ClientConfig::from_toml_str(&std::fs::read_to_string(&arg)?)?
    } else {
        ClientConfig::new(arg)
            .auto_reconnect(Duration::from_secs(2), 5)
            .history_capacity(20)
    };

    let client = resock_net::builder(config)?
        .on_open(|| tracing::info!("connected"))
        .on_close(|reason| tracing::info!(code = reason.code.as_u16(), "disconnected"))
        .on_error(|err| tracing::warn!(%err, "transport error"))
        .on_message(|payload| tracing::info!(?payload, "received"))
        .build()?;

    client
        .state_changed()
        .connect(|state: &ConnectionState| tracing::info!(%state, "state changed"));

    for i in 0..10 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        if client.is_open() {
            client.send_text(format!("ping {i}"))?;
        }
    }

    let snapshot = client.snapshot();
    tracing::info!(
        sent = snapshot.sent.len(),
        received = snapshot.received.len(),
        "finished"
    );
    client.close();
    Ok(())
}
