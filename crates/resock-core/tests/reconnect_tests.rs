//! Tests for the reconnection policy.

mod common;

use std::sync::{Arc, Barrier};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use resock_core::{
    Client, ClientConfig, ConnectionState, ManualScheduler, ReconnectPolicy, TransportError,
};

use common::{MockTransport, harness, open_harness};

const DELAY: Duration = Duration::from_millis(100);

fn reconnecting(max_attempts: u32) -> ClientConfig {
    ClientConfig::new("proto://host:1").auto_reconnect(DELAY, max_attempts)
}

#[test]
fn test_reconnect_after_delay_resets_counter_on_open() {
    let h = open_harness(reconnecting(3));
    assert_eq!(h.transport.connect_count(), 1);

    h.transport.drop_connection();
    assert_eq!(h.client.state(), ConnectionState::Closed);
    assert_eq!(h.client.reconnect_attempts(), 1);
    assert!(h.client.is_reconnect_pending());

    // Nothing happens before the delay elapses.
    h.scheduler.advance(DELAY - Duration::from_millis(1));
    assert_eq!(h.transport.connect_count(), 1);

    h.scheduler.advance(Duration::from_millis(1));
    assert_eq!(h.transport.connect_count(), 2);
    assert_eq!(h.client.state(), ConnectionState::Connecting);
    assert!(!h.client.is_reconnect_pending());

    h.transport.open();
    assert_eq!(h.client.state(), ConnectionState::Open);
    assert_eq!(h.client.reconnect_attempts(), 0);
}

#[test]
fn test_attempts_cap_at_max() {
    let h = open_harness(reconnecting(3));

    for expected in 1..=3 {
        h.transport.drop_connection();
        assert_eq!(h.client.reconnect_attempts(), expected);
        h.scheduler.advance(DELAY);
    }
    assert_eq!(h.transport.connect_count(), 4);

    // The third reconnect attempt fails too: no fourth attempt.
    h.transport.drop_connection();
    assert_eq!(h.client.reconnect_attempts(), 3);
    assert!(!h.client.is_reconnect_pending());
    h.scheduler.advance(DELAY * 10);
    assert_eq!(h.transport.connect_count(), 4);
    assert_eq!(h.client.state(), ConnectionState::Closed);
}

#[test]
fn test_successful_open_after_failures_resets_counter() {
    let h = open_harness(reconnecting(5));

    h.transport.drop_connection();
    h.scheduler.advance(DELAY);
    h.transport.drop_connection();
    h.scheduler.advance(DELAY);
    assert_eq!(h.client.reconnect_attempts(), 2);

    h.transport.open();
    assert_eq!(h.client.reconnect_attempts(), 0);

    // A later drop starts counting from scratch.
    h.transport.drop_connection();
    assert_eq!(h.client.reconnect_attempts(), 1);
}

#[test]
fn test_close_cancels_pending_reconnect() {
    let h = open_harness(reconnecting(3));
    h.transport.drop_connection();
    assert!(h.client.is_reconnect_pending());

    h.client.close();
    assert!(!h.client.is_reconnect_pending());
    assert_eq!(h.scheduler.pending(), 0);

    h.scheduler.advance(DELAY * 2);
    assert_eq!(h.transport.connect_count(), 1);
    assert_eq!(h.client.state(), ConnectionState::Closed);
    assert_eq!(h.client.reconnect_attempts(), 0);
}

#[test]
fn test_disabled_policy_never_reconnects() {
    let h = open_harness(ClientConfig::new("ws://a").reconnect(ReconnectPolicy::new()));
    h.transport.drop_connection();

    assert!(!h.client.is_reconnect_pending());
    assert_eq!(h.client.reconnect_attempts(), 0);
    h.scheduler.advance(Duration::from_secs(60));
    assert_eq!(h.transport.connect_count(), 1);
}

#[test]
fn test_zero_max_attempts_never_reconnects() {
    let h = open_harness(reconnecting(0));
    h.transport.drop_connection();

    assert!(!h.client.is_reconnect_pending());
    h.scheduler.advance(DELAY * 5);
    assert_eq!(h.transport.connect_count(), 1);
}

#[test]
fn test_intentional_close_does_not_reconnect() {
    let h = open_harness(reconnecting(3));
    let sink = h.transport.last_sink();

    h.client.close();
    // The transport reports the close afterwards.
    sink.closed(resock_core::CloseReason::normal());

    assert!(!h.client.is_reconnect_pending());
    h.scheduler.advance(DELAY * 2);
    assert_eq!(h.transport.connect_count(), 1);
}

#[test]
fn test_reconnect_uses_current_address() {
    let h = open_harness(reconnecting(3));
    h.client.open("ws://other:2").unwrap();
    h.transport.open();

    h.transport.drop_connection();
    h.scheduler.advance(DELAY);

    assert_eq!(
        h.transport.addresses(),
        vec!["proto://host:1", "ws://other:2/", "ws://other:2/"]
    );
}

#[test]
fn test_explicit_open_cancels_pending_reconnect() {
    let h = open_harness(reconnecting(3));
    h.transport.drop_connection();
    assert!(h.client.is_reconnect_pending());

    h.client.reopen().unwrap();
    assert!(!h.client.is_reconnect_pending());

    h.scheduler.advance(DELAY);
    // Only the explicit reopen connected.
    assert_eq!(h.transport.connect_count(), 2);
}

#[test]
fn test_close_callback_runs_before_reconnect_is_scheduled() {
    let transport = MockTransport::new(&["proto"]);
    let scheduler = Arc::new(ManualScheduler::new());
    let pending_during_callback = Arc::new(AtomicUsize::new(usize::MAX));
    let observed = pending_during_callback.clone();
    let scheduler_for_callback = scheduler.clone();

    let client = Client::builder(reconnecting(3))
        .transport(transport.clone())
        .scheduler(scheduler.clone())
        .on_close(move |_| {
            observed.store(scheduler_for_callback.pending(), Ordering::SeqCst);
        })
        .build()
        .unwrap();

    transport.open();
    transport.drop_connection();

    assert_eq!(pending_during_callback.load(Ordering::SeqCst), 0);
    assert!(client.is_reconnect_pending());
}

#[test]
fn test_failed_connect_counts_as_attempt() {
    let errors = Arc::new(AtomicUsize::new(0));
    let errors_clone = errors.clone();
    let transport = MockTransport::new(&["proto"]);
    let scheduler = Arc::new(ManualScheduler::new());
    let client = Client::builder(reconnecting(2))
        .transport(transport.clone())
        .scheduler(scheduler.clone())
        .on_error(move |_| {
            errors_clone.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .unwrap();

    transport.open();
    transport.drop_connection();
    transport.fail_next_connect(TransportError::Connect("refused".into()));

    scheduler.advance(DELAY);
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert_eq!(client.state(), ConnectionState::Closed);
    assert_eq!(client.reconnect_attempts(), 2);
    assert!(client.is_reconnect_pending());

    scheduler.advance(DELAY);
    assert_eq!(transport.connect_count(), 2);
    transport.open();
    assert_eq!(client.reconnect_attempts(), 0);
}

#[test]
fn test_failed_initial_connect_schedules_reconnect() {
    let transport = MockTransport::new(&["proto"]);
    transport.fail_next_connect(TransportError::Connect("no route".into()));
    let scheduler = Arc::new(ManualScheduler::new());

    let client = Client::builder(reconnecting(1))
        .transport(transport.clone())
        .scheduler(scheduler.clone())
        .build()
        .unwrap();

    assert_eq!(client.state(), ConnectionState::Closed);
    assert_eq!(client.reconnect_attempts(), 1);

    scheduler.advance(DELAY);
    assert_eq!(transport.connect_count(), 1);
    assert_eq!(client.state(), ConnectionState::Connecting);
}

#[test]
fn test_dropping_client_cancels_reconnect() {
    let h = harness(reconnecting(3));
    h.transport.open();
    h.transport.drop_connection();
    assert_eq!(h.scheduler.pending(), 1);

    let scheduler = h.scheduler.clone();
    let transport = h.transport.clone();
    drop(h);

    assert_eq!(scheduler.pending(), 0);
    scheduler.advance(DELAY);
    assert_eq!(transport.connect_count(), 1);
}

#[test]
fn test_close_racing_a_due_reconnect_leaves_client_closed() {
    for _ in 0..200 {
        let h = open_harness(reconnecting(3));
        h.transport.drop_connection();
        assert!(h.client.is_reconnect_pending());

        let barrier = Barrier::new(2);
        std::thread::scope(|s| {
            s.spawn(|| {
                barrier.wait();
                h.scheduler.advance(DELAY);
            });
            s.spawn(|| {
                barrier.wait();
                h.client.close();
            });
        });

        // Either the reconnect ran first and was closed, or it never ran.
        assert_eq!(h.client.state(), ConnectionState::Closed);
        assert_eq!(h.client.connection_id(), None);
        assert!(!h.client.is_reconnect_pending());
        assert_eq!(h.scheduler.pending(), 0);
    }
}
