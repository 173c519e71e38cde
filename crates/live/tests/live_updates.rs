//! Integration tests for [`LiveUpdates`] against an in-process axum
//! WebSocket server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::sync::broadcast;

use notekeep_core::backoff::ReconnectConfig;
use notekeep_core::env::ResolvedEnv;
use notekeep_core::messages::{ChangePayload, NoteChange};
use notekeep_live::{ConnectionState, LiveEvent, LiveUpdates};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct Script {
    frames: Vec<Message>,
    /// Keep the socket open after sending the frames.
    hold_open: bool,
    connections: Arc<AtomicUsize>,
}

async fn ws_handler(ws: WebSocketUpgrade, script: Script) -> impl IntoResponse {
    script.connections.fetch_add(1, Ordering::SeqCst);
    ws.on_upgrade(move |mut socket| async move {
        for frame in script.frames {
            if socket.send(frame).await.is_err() {
                return;
            }
        }
        if script.hold_open {
            while let Some(Ok(_)) = socket.recv().await {}
        } else {
            let _ = socket.send(Message::Close(None)).await;
        }
    })
}

async fn serve(script: Script) -> String {
    let router = Router::new().route(
        "/ws",
        get(move |ws: WebSocketUpgrade| ws_handler(ws, script.clone())),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("ws://{addr}/ws")
}

fn fast_reconnect() -> ReconnectConfig {
    ReconnectConfig {
        initial_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(100),
        multiplier: 2.0,
    }
}

async fn next_event(rx: &mut broadcast::Receiver<LiveEvent>) -> LiveEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for live event")
        .expect("live event channel closed")
}

fn text(s: &str) -> Message {
    Message::Text(s.into())
}

// ---------------------------------------------------------------------------
// Test: recognized messages are republished, malformed ones skipped
// ---------------------------------------------------------------------------

#[tokio::test]
async fn republishes_recognized_messages_and_skips_malformed() {
    let script = Script {
        frames: vec![
            text("not json"),
            text(r#"{"type":"notes.archived","payload":{"id":"a"}}"#),
            Message::Binary(vec![0xff, 0xfe, 0xfd].into()),
            text(r#"{"type":"notes.deleted","payload":{"id":"X"}}"#),
            text(r#"{"type":"notes.created","payload":{"id":"n2","title":"fresh"}}"#),
        ],
        hold_open: true,
        connections: Arc::new(AtomicUsize::new(0)),
    };
    let url = serve(script).await;

    let live = LiveUpdates::start(url, fast_reconnect());
    let mut rx = live.subscribe();

    assert_eq!(next_event(&mut rx).await, LiveEvent::Connected);
    assert_eq!(
        next_event(&mut rx).await,
        LiveEvent::Note(NoteChange::Deleted(ChangePayload::new("X")))
    );
    match next_event(&mut rx).await {
        LiveEvent::Note(NoteChange::Created(payload)) => {
            assert_eq!(payload.id, "n2");
            assert_eq!(payload.extra["title"], "fresh");
        }
        other => panic!("Expected Created, got {other:?}"),
    }
    assert_eq!(live.state(), ConnectionState::Connected);

    live.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: a server-side close triggers a reconnect
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reconnects_after_server_close() {
    let connections = Arc::new(AtomicUsize::new(0));
    let script = Script {
        frames: vec![text(r#"{"type":"notes.updated","payload":{"id":"n1"}}"#)],
        hold_open: false,
        connections: Arc::clone(&connections),
    };
    let url = serve(script).await;

    let live = LiveUpdates::start(url, fast_reconnect());
    let mut rx = live.subscribe();

    assert_eq!(next_event(&mut rx).await, LiveEvent::Connected);
    assert!(matches!(next_event(&mut rx).await, LiveEvent::Note(_)));
    assert_eq!(next_event(&mut rx).await, LiveEvent::Disconnected);
    assert_eq!(next_event(&mut rx).await, LiveEvent::Connected);
    assert!(connections.load(Ordering::SeqCst) >= 2);

    live.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: shutdown leaves no reconnect attempts behind
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_cancels_pending_reconnects() {
    let connections = Arc::new(AtomicUsize::new(0));
    let script = Script {
        frames: Vec::new(),
        hold_open: false,
        connections: Arc::clone(&connections),
    };
    let url = serve(script).await;

    let live = LiveUpdates::start(url, fast_reconnect());
    let mut state = live.watch_state();
    let mut rx = live.subscribe();
    assert_eq!(next_event(&mut rx).await, LiveEvent::Connected);

    live.shutdown().await;
    let after_shutdown = connections.load(Ordering::SeqCst);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(connections.load(Ordering::SeqCst), after_shutdown);
    assert_eq!(*state.borrow_and_update(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn unreachable_server_keeps_retrying_until_shutdown() {
    // Bind then drop to obtain a port nothing listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let live = LiveUpdates::start(format!("ws://{addr}/ws"), fast_reconnect());
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_ne!(live.state(), ConnectionState::Connected);

    live.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: live updates are off without a WebSocket URL
// ---------------------------------------------------------------------------

#[tokio::test]
async fn no_ws_url_means_no_live_updates() {
    let endpoints = ResolvedEnv {
        api_base: "http://localhost:3000".into(),
        ws_url: None,
    };
    assert!(LiveUpdates::from_endpoints(&endpoints, ReconnectConfig::default()).is_none());
}
