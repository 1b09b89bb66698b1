//! Integration tests for the connection engine.
//!
//! Every test drives a real engine actor against the in-memory transport.
//! The listener plays the device: it accepts connections, reads request
//! frames and writes replies. Time is paused, so timeouts and backoff
//! delays elapse instantly and deterministically.

use std::time::Duration;

use ctrlwire_engine::{
    ConnectionState, EngineConfig, EngineError, EngineHandle, StateChange, spawn_engine,
};
use ctrlwire_protocol::{
    Frame, ProtocolError, RESPONSE_BINARY, RESPONSE_STRING, decode_frame, encode_request,
};
use ctrlwire_transport::{MemoryListener, MemoryPeer, memory_channel};
use tokio::time;

// =========================================================================
// Helpers
// =========================================================================

const SIG: [u8; 2] = [0xba, 0xda];

fn setup() -> (EngineHandle, MemoryListener) {
    let (connector, listener) = memory_channel();
    (spawn_engine(connector, EngineConfig::default()), listener)
}

async fn wait_for_state(engine: &EngineHandle, target: ConnectionState) {
    let mut rx = engine.watch_state();
    time::timeout(Duration::from_secs(30), rx.wait_for(|s| *s == target))
        .await
        .unwrap_or_else(|_| panic!("engine never reached {target}"))
        .expect("engine stopped");
}

/// An engine that has completed `begin()` and is connected to a peer.
async fn connected() -> (EngineHandle, MemoryListener, MemoryPeer) {
    let (engine, mut listener) = setup();
    engine.begin().await.unwrap();
    let peer = listener.accept().await.unwrap();
    wait_for_state(&engine, ConnectionState::Connected).await;
    (engine, listener, peer)
}

/// Builds a device-to-client frame.
fn reply(request_id: u16, frame_type: u8, payload: &[u8]) -> Vec<u8> {
    encode_request(SIG, request_id, frame_type, Some(payload)).unwrap()
}

async fn next_request(peer: &mut MemoryPeer) -> Frame {
    let bytes = peer.recv().await.expect("peer closed");
    decode_frame(&bytes).unwrap()
}

fn spawn_request(
    engine: &EngineHandle,
    command: u8,
    payload: Option<Vec<u8>>,
) -> tokio::task::JoinHandle<Result<Frame, EngineError>> {
    let engine = engine.clone();
    tokio::spawn(async move { engine.request(command, payload.as_deref()).await })
}

// =========================================================================
// Lifecycle
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_lifecycle_misuse() {
    let (engine, _listener) = setup();
    assert_eq!(engine.state(), ConnectionState::Uninitialized);
    assert_eq!(engine.connect().await, Err(EngineError::NotInitialized));
    assert_eq!(engine.close().await, Err(EngineError::NotInitialized));

    engine.begin().await.unwrap();
    assert_eq!(engine.begin().await, Err(EngineError::AlreadyInitialized));
}

#[tokio::test(start_paused = true)]
async fn test_begin_connects() {
    let (engine, listener, _peer) = connected().await;
    assert!(engine.is_connected());
    assert_eq!(listener.attempts(), 1);

    // connect() while connected is a no-op.
    engine.connect().await.unwrap();
    time::sleep(Duration::from_millis(10)).await;
    assert_eq!(listener.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_close_aborts_and_stays_disconnected() {
    let (engine, mut listener, mut peer) = connected().await;
    let request = spawn_request(&engine, 0x10, None);
    next_request(&mut peer).await;

    engine.close().await.unwrap();
    assert_eq!(request.await.unwrap(), Err(EngineError::RequestAborted(1)));
    assert_eq!(engine.state(), ConnectionState::Disconnected);
    assert!(peer.recv().await.is_none(), "socket should be closed");

    time::sleep(Duration::from_secs(10)).await;
    assert_eq!(listener.attempts(), 1, "no automatic reconnect after close");
    assert_eq!(engine.state(), ConnectionState::Disconnected);

    // An explicit connect() brings it back.
    engine.connect().await.unwrap();
    let _peer = listener.accept().await.unwrap();
    wait_for_state(&engine, ConnectionState::Connected).await;
}

// =========================================================================
// Requests
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_request_not_connected_writes_nothing() {
    let (engine, mut listener) = setup();
    assert_eq!(
        engine.request(0x10, None).await,
        Err(EngineError::NotConnected)
    );

    listener.stall_connections(true);
    engine.begin().await.unwrap();
    assert_eq!(engine.state(), ConnectionState::Connecting);
    assert_eq!(
        engine.request(0x10, Some(&[1])).await,
        Err(EngineError::NotConnected)
    );

    listener.stall_connections(false);
    let mut peer = listener.accept().await.unwrap();
    wait_for_state(&engine, ConnectionState::Connected).await;
    assert!(peer.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_request_binary_ack_and_unmatched_reply() {
    let (engine, _listener, mut peer) = connected().await;
    let request = spawn_request(&engine, 0x03, Some(vec![0x40, 0x1f]));

    let sent = next_request(&mut peer).await;
    assert_eq!(sent.signature, SIG);
    assert_eq!(sent.frame_type, 0x03);
    assert_eq!(sent.declared_len, 2);
    assert_eq!(sent.payload, [0x40, 0x1f]);
    let mut reader = sent.reader();
    assert_eq!(reader.read_u16().unwrap(), 0x1f40);

    // A reply with a different id is logged and dropped.
    peer.send(reply(sent.request_id + 100, RESPONSE_BINARY, &[9]))
        .unwrap();
    time::sleep(Duration::from_millis(10)).await;
    assert!(!request.is_finished());

    peer.send(reply(sent.request_id, RESPONSE_BINARY, &[1, 2]))
        .unwrap();
    let frame = request.await.unwrap().unwrap();
    assert_eq!(frame.request_id, sent.request_id);
    assert_eq!(frame.frame_type, RESPONSE_BINARY);
    assert_eq!(frame.payload, [1, 2]);
    assert!(engine.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_request_string_acks() {
    let (engine, _listener, mut peer) = connected().await;

    let ok = spawn_request(&engine, 0x20, Some(vec![1]));
    let sent = next_request(&mut peer).await;
    peer.send(reply(sent.request_id, RESPONSE_STRING, b"OK\0"))
        .unwrap();
    assert_eq!(ok.await.unwrap().unwrap().frame_type, RESPONSE_STRING);

    let bad = spawn_request(&engine, 0x20, Some(vec![2]));
    let sent = next_request(&mut peer).await;
    peer.send(reply(sent.request_id, RESPONSE_STRING, b"BAD"))
        .unwrap();
    assert_eq!(
        bad.await.unwrap(),
        Err(EngineError::CommandFailed("BAD".into()))
    );

    // A rejected command leaves the connection alone.
    assert!(engine.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_request_payload_too_large() {
    let (engine, _listener, mut peer) = connected().await;
    let payload = vec![0u8; 256];
    assert_eq!(
        engine.request(0x10, Some(&payload)).await,
        Err(EngineError::Protocol(ProtocolError::PayloadTooLarge {
            len: 256,
            max: 255
        }))
    );
    assert!(peer.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_requests_get_unique_ids_and_complete_out_of_order() {
    let (engine, _listener, mut peer) = connected().await;

    let requests: Vec<_> = (0..5u8)
        .map(|i| spawn_request(&engine, 0x30, Some(vec![i])))
        .collect();

    let mut sent = Vec::new();
    for _ in 0..5 {
        sent.push(next_request(&mut peer).await);
    }
    let mut ids: Vec<u16> = sent.iter().map(|f| f.request_id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 5);
    assert!(!ids.contains(&0));

    // Answer in reverse order, echoing each request's payload.
    for frame in sent.iter().rev() {
        peer.send(reply(frame.request_id, RESPONSE_BINARY, &frame.payload))
            .unwrap();
    }

    let mut echoed = Vec::new();
    for request in requests {
        echoed.push(request.await.unwrap().unwrap().payload[0]);
    }
    assert_eq!(echoed, [0, 1, 2, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn test_undecodable_frame_is_ignored() {
    let (engine, _listener, mut peer) = connected().await;
    peer.send(vec![0xba, 0xda, 0x01]).unwrap();

    let request = spawn_request(&engine, 0x10, None);
    let sent = next_request(&mut peer).await;
    peer.send(reply(sent.request_id, RESPONSE_BINARY, &[]))
        .unwrap();
    assert!(request.await.unwrap().is_ok());
}

// =========================================================================
// Timeouts and reconnection
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_timeout_tears_down_and_aborts_others() {
    let (engine, listener, mut peer) = connected().await;
    listener.refuse_connections(true);

    let first = spawn_request(&engine, 0x10, None);
    next_request(&mut peer).await;
    time::sleep(Duration::from_millis(1_000)).await;
    let second = spawn_request(&engine, 0x11, None);
    next_request(&mut peer).await;

    assert_eq!(first.await.unwrap(), Err(EngineError::RequestTimeout(1)));
    assert_eq!(second.await.unwrap(), Err(EngineError::RequestAborted(2)));
    wait_for_state(&engine, ConnectionState::Reconnecting).await;
}

#[tokio::test(start_paused = true)]
async fn test_timeout_fires_at_configured_deadline() {
    let (engine, _listener, mut peer) = connected().await;
    let start = time::Instant::now();

    let request = spawn_request(&engine, 0x10, None);
    next_request(&mut peer).await;
    assert_eq!(request.await.unwrap(), Err(EngineError::RequestTimeout(1)));
    assert_eq!(time::Instant::now() - start, Duration::from_millis(2_000));
}

#[tokio::test(start_paused = true)]
async fn test_late_reply_after_timeout_is_dropped() {
    let (engine, mut listener, mut peer) = connected().await;
    let request = spawn_request(&engine, 0x10, None);
    let sent = next_request(&mut peer).await;
    assert_eq!(request.await.unwrap(), Err(EngineError::RequestTimeout(1)));

    // The old socket is gone; the engine reconnects on a fresh one.
    let _ = peer.send(reply(sent.request_id, RESPONSE_BINARY, &[]));
    let _peer = listener.accept().await.unwrap();
    wait_for_state(&engine, ConnectionState::Connected).await;
}

#[tokio::test(start_paused = true)]
async fn test_peer_close_triggers_reconnect() {
    let (engine, mut listener, mut peer) = connected().await;
    let request = spawn_request(&engine, 0x10, None);
    next_request(&mut peer).await;

    peer.close();
    assert_eq!(request.await.unwrap(), Err(EngineError::RequestAborted(1)));

    let _peer = listener.accept().await.unwrap();
    wait_for_state(&engine, ConnectionState::Connected).await;
    assert_eq!(listener.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_state_changes_report_every_step_of_a_reconnect() {
    let (engine, mut listener, peer) = connected().await;
    let mut changes = engine.state_changes();

    peer.close();
    let _peer = listener.accept().await.unwrap();
    wait_for_state(&engine, ConnectionState::Connected).await;

    let steps: Vec<(ConnectionState, ConnectionState)> = (0..3)
        .map(|_| {
            let StateChange { from, to } = changes.try_recv().unwrap();
            (from, to)
        })
        .collect();
    assert_eq!(
        steps,
        [
            (ConnectionState::Connected, ConnectionState::Reconnecting),
            (ConnectionState::Reconnecting, ConnectionState::Connecting),
            (ConnectionState::Connecting, ConnectionState::Connected),
        ]
    );
    assert!(changes.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_backoff_grows_by_step() {
    let (engine, listener) = setup();
    listener.refuse_connections(true);
    engine.begin().await.unwrap();

    // First retry is immediate, then 500 ms, then 1000 ms more.
    time::sleep(Duration::from_millis(10)).await;
    assert_eq!(listener.attempts(), 2);
    assert_eq!(engine.state(), ConnectionState::Reconnecting);

    time::sleep(Duration::from_millis(500)).await; // t = 510
    assert_eq!(listener.attempts(), 3);

    time::sleep(Duration::from_millis(1_000)).await; // t = 1510
    assert_eq!(listener.attempts(), 4);

    time::sleep(Duration::from_millis(1_480)).await; // t = 2990
    assert_eq!(listener.attempts(), 4);

    time::sleep(Duration::from_millis(20)).await; // t = 3010
    assert_eq!(listener.attempts(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_caps_at_max_delay() {
    let (connector, listener) = memory_channel();
    let engine = spawn_engine(
        connector,
        EngineConfig {
            reconnect_step_ms: 1_000,
            reconnect_max_delay_ms: 1_500,
            ..Default::default()
        },
    );
    listener.refuse_connections(true);
    engine.begin().await.unwrap();

    // Delays: 0, 1000, 1500, 1500, ...
    time::sleep(Duration::from_millis(10)).await;
    assert_eq!(listener.attempts(), 2);
    time::sleep(Duration::from_millis(1_000)).await; // t = 1010
    assert_eq!(listener.attempts(), 3);
    time::sleep(Duration::from_millis(1_500)).await; // t = 2510
    assert_eq!(listener.attempts(), 4);
    time::sleep(Duration::from_millis(1_500)).await; // t = 4010
    assert_eq!(listener.attempts(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_connect_while_reconnecting_skips_the_wait() {
    let (engine, mut listener) = setup();
    listener.refuse_connections(true);
    engine.begin().await.unwrap();
    time::sleep(Duration::from_millis(10)).await;
    assert_eq!(engine.state(), ConnectionState::Reconnecting);

    listener.refuse_connections(false);
    engine.connect().await.unwrap();
    let _peer = listener.accept().await.unwrap();
    wait_for_state(&engine, ConnectionState::Connected).await;
    assert_eq!(listener.attempts(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_successful_connect_resets_backoff() {
    let (engine, mut listener) = setup();
    listener.refuse_connections(true);
    engine.begin().await.unwrap();
    time::sleep(Duration::from_millis(510)).await;
    assert_eq!(listener.attempts(), 3);

    // Let the next attempt (at t = 1500) succeed.
    listener.refuse_connections(false);
    let peer = listener.accept().await.unwrap();
    wait_for_state(&engine, ConnectionState::Connected).await;

    // After a healthy connection the first retry is immediate again.
    peer.close();
    let _peer = listener.accept().await.unwrap();
    wait_for_state(&engine, ConnectionState::Connected).await;
    assert_eq!(listener.attempts(), 5);
}

// =========================================================================
// Detached sockets
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_stalled_connect_is_abandoned_after_bounded_polls() {
    let (engine, mut listener) = setup();
    listener.stall_connections(true);
    engine.begin().await.unwrap();
    assert_eq!(engine.state(), ConnectionState::Connecting);

    engine.close().await.unwrap();
    assert_eq!(engine.state(), ConnectionState::Disconnected);

    // 20 polls × 500 ms, then the attempt is aborted.
    time::sleep(Duration::from_secs(11)).await;
    listener.stall_connections(false);
    time::sleep(Duration::from_millis(10)).await;

    assert!(listener.try_accept().is_none());
    assert_eq!(listener.attempts(), 1);
    assert_eq!(engine.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_detached_connect_is_closed_once_open() {
    let (engine, mut listener) = setup();
    listener.stall_connections(true);
    engine.begin().await.unwrap();
    engine.close().await.unwrap();

    time::sleep(Duration::from_millis(1_200)).await;
    listener.stall_connections(false);

    // The attempt completes, is noticed by the next poll and closed.
    let mut peer = listener.accept().await.unwrap();
    assert!(peer.recv().await.is_none());
    assert_eq!(engine.state(), ConnectionState::Disconnected);
}

// =========================================================================
// Notifications
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_notification_broadcast_leaves_requests_pending() {
    let (engine, _listener, mut peer) = connected().await;
    let mut notes = engine.subscribe();

    let request = spawn_request(&engine, 0x10, None);
    let sent = next_request(&mut peer).await;

    peer.send(reply(0, 0x10, &[1])).unwrap();
    let note = notes.recv().await.unwrap();
    assert!(note.is_notification());
    assert_eq!(note.frame_type, 0x10);
    assert_eq!(note.payload, [1]);
    assert!(!request.is_finished());

    peer.send(reply(sent.request_id, RESPONSE_BINARY, &[]))
        .unwrap();
    assert!(request.await.unwrap().is_ok());
}
