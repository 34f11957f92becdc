//! Integration tests for the WebSocket transport against a local server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use resock_core::{
    ClientConfig, ClientError, CloseCode, ConnectionState, EventKind, HistoryKind, Payload,
    SocketEvent, TransportError,
};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as TungsteniteCloseCode;

const WAIT: Duration = Duration::from_secs(5);

/// Poll `condition` until it holds or the wait times out.
async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Server that echoes every text and binary frame back.
async fn spawn_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    if msg.is_text() || msg.is_binary() {
                        if ws.send(msg).await.is_err() {
                            break;
                        }
                    } else if msg.is_close() {
                        break;
                    }
                }
            });
        }
    });

    addr
}

/// Server that closes every connection right after the handshake.
async fn spawn_closing_server(accepted: Arc<AtomicUsize>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let accepted = accepted.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                accepted.fetch_add(1, Ordering::SeqCst);
                let frame = CloseFrame {
                    code: TungsteniteCloseCode::Away,
                    reason: "going away".into(),
                };
                let _ = ws.close(Some(frame)).await;
                // Drain until the client acknowledges
                while let Some(Ok(_)) = ws.next().await {}
            });
        }
    });

    addr
}

/// An address nothing is listening on.
async fn unused_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_open_send_and_receive_echo() {
    let addr = spawn_echo_server().await;
    let opened = Arc::new(AtomicUsize::new(0));
    let opened_clone = opened.clone();

    let client = resock_net::builder(ClientConfig::new(format!("ws://{addr}")))
        .unwrap()
        .on_open(move || {
            opened_clone.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .unwrap();

    assert!(wait_until(|| client.is_open()).await);
    assert_eq!(opened.load(Ordering::SeqCst), 1);

    client.send_text("hello").unwrap();
    client.send_binary(vec![1u8, 2, 3]).unwrap();

    assert!(wait_until(|| client.received_history().len() == 2).await);

    let received = client.received_history();
    assert_eq!(received[0].payload, Payload::Binary(vec![1, 2, 3]));
    assert_eq!(received[1].payload, Payload::Text("hello".into()));
    assert_eq!(received[0].connection, client.connection_id().unwrap());

    let sent = client.sent_history();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].payload, Payload::Binary(vec![1, 2, 3]));

    client.close();
    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(client.received_history().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_message_listener_sees_raw_events() {
    let addr = spawn_echo_server().await;
    let client = resock_net::connect(ClientConfig::new(format!("ws://{addr}"))).unwrap();
    assert!(wait_until(|| client.is_open()).await);

    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    client
        .add_listener(EventKind::Message, move |event| {
            if let SocketEvent::Message(payload) = event {
                seen_clone.lock().push(payload.clone());
            }
        })
        .unwrap();

    client.send_text("ping").unwrap();
    assert!(wait_until(|| seen.lock().len() == 1).await);
    assert_eq!(seen.lock()[0], Payload::Text("ping".into()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_history_signal_fires_on_receive() {
    let addr = spawn_echo_server().await;
    let client = resock_net::connect(ClientConfig::new(format!("ws://{addr}"))).unwrap();
    assert!(wait_until(|| client.is_open()).await);

    let received = Arc::new(AtomicUsize::new(0));
    let received_clone = received.clone();
    client.history_changed().connect(move |kind| {
        if *kind == HistoryKind::Received {
            received_clone.fetch_add(1, Ordering::SeqCst);
        }
    });

    client.send_text("x").unwrap();
    assert!(wait_until(|| received.load(Ordering::SeqCst) == 1).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_server_close_reports_code_and_reconnects() {
    let accepted = Arc::new(AtomicUsize::new(0));
    let addr = spawn_closing_server(accepted.clone()).await;
    let close_codes = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let close_codes_clone = close_codes.clone();

    let config = ClientConfig::new(format!("ws://{addr}"))
        .auto_reconnect(Duration::from_millis(50), 3);
    let client = resock_net::builder(config)
        .unwrap()
        .on_close(move |reason| close_codes_clone.lock().push(reason.code))
        .build()
        .unwrap();

    // Each accepted connection is closed by the server and re-opened by the client.
    assert!(wait_until(|| accepted.load(Ordering::SeqCst) >= 3).await);
    assert!(wait_until(|| !close_codes.lock().is_empty()).await);

    let codes = close_codes.lock().clone();
    assert!(codes.iter().all(|code| *code == CloseCode::Away));

    // An intentional close reports at most one more, normal, close.
    client.close();
    let after = close_codes.lock().clone();
    let normal = after.iter().filter(|code| **code == CloseCode::Normal).count();
    assert!(normal <= 1);
    assert!(
        after
            .iter()
            .all(|code| matches!(code, CloseCode::Away | CloseCode::Normal))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_refused_connection_reports_error_then_closed() {
    let addr = unused_address().await;
    let errors = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let errors_clone = errors.clone();

    let client = resock_net::builder(ClientConfig::new(format!("ws://{addr}")))
        .unwrap()
        .on_error(move |err| errors_clone.lock().push(err.clone()))
        .build()
        .unwrap();

    assert!(wait_until(|| client.state() == ConnectionState::Closed).await);
    assert!(wait_until(|| !errors.lock().is_empty()).await);
    assert!(matches!(errors.lock()[0], TransportError::Connect(_)));
    assert!(!client.is_reconnect_pending());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_refused_connection_retries_up_to_max_attempts() {
    let addr = unused_address().await;
    let errors = Arc::new(AtomicUsize::new(0));
    let errors_clone = errors.clone();

    let config = ClientConfig::new(format!("ws://{addr}"))
        .auto_reconnect(Duration::from_millis(20), 2);
    let client = resock_net::builder(config)
        .unwrap()
        .on_error(move |_| {
            errors_clone.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .unwrap();

    // The initial attempt plus two reconnects.
    assert!(wait_until(|| errors.load(Ordering::SeqCst) == 3).await);
    assert!(
        wait_until(|| client.state() == ConnectionState::Closed && !client.is_reconnect_pending())
            .await
    );
    assert_eq!(client.reconnect_attempts(), 2);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(errors.load(Ordering::SeqCst), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unsupported_scheme_is_rejected() {
    let result = resock_net::connect(ClientConfig::new("http://localhost:1"));
    assert!(matches!(
        result,
        Err(resock_net::NetError::Configuration(_))
    ));

    let addr = spawn_echo_server().await;
    let client = resock_net::connect(ClientConfig::new(format!("ws://{addr}"))).unwrap();
    assert!(matches!(
        client.open("tcp://localhost:1"),
        Err(ClientError::Configuration(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_send_while_connecting_is_invalid_state() {
    let addr = spawn_echo_server().await;
    let config = ClientConfig::new(format!("ws://{addr}")).auto_connect(false);
    let client = resock_net::connect(config).unwrap();

    assert_eq!(client.send_text("early"), Err(ClientError::NotConnected));

    client.reopen().unwrap();
    if client.state() == ConnectionState::Connecting {
        assert!(matches!(
            client.send_text("early"),
            Err(ClientError::InvalidState { .. })
        ));
    }
    assert!(wait_until(|| client.is_open()).await);
    client.send_text("late").unwrap();
}
