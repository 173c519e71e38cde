//! Owner of the single live-update connection of a session.
//!
//! [`LiveUpdates::start`] spawns the connection task. Events are broadcast
//! via a [`tokio::sync::broadcast`] channel; call
//! [`LiveUpdates::subscribe`] to receive them. Shutting down (or dropping)
//! the handle closes the socket and cancels any pending reconnect.

use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use notekeep_core::backoff::ReconnectConfig;
use notekeep_core::env::ResolvedEnv;

use crate::client::LiveClient;
use crate::events::{ConnectionState, LiveEvent};
use crate::reconnect::run_connection_loop;

/// Broadcast channel capacity for live events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long [`LiveUpdates::shutdown`] waits for the task to exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Handle to the running live-update connection.
pub struct LiveUpdates {
    event_tx: broadcast::Sender<LiveEvent>,
    state_rx: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl LiveUpdates {
    /// Spawn the connection task for `ws_url`. Must be called from within a
    /// tokio runtime.
    pub fn start(ws_url: impl Into<String>, config: ReconnectConfig) -> Self {
        let client = LiveClient::new(ws_url);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let cancel = CancellationToken::new();

        let task_tx = event_tx.clone();
        let task_cancel = cancel.clone();
        let task_handle = tokio::spawn(async move {
            tracing::info!(ws_url = %client.ws_url(), "Starting live-update task");
            run_connection_loop(&client, &config, &task_tx, &state_tx, &task_cancel).await;
        });

        Self {
            event_tx,
            state_rx,
            cancel,
            task_handle: Some(task_handle),
        }
    }

    /// Start live updates only when a WebSocket URL is configured.
    pub fn from_endpoints(endpoints: &ResolvedEnv, config: ReconnectConfig) -> Option<Self> {
        match endpoints.ws_url.as_deref() {
            Some(url) => Some(Self::start(url, config)),
            None => {
                tracing::info!("No WebSocket URL configured, live updates disabled");
                None
            }
        }
    }

    /// Subscribe to live events.
    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.event_tx.subscribe()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch connection state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Close the socket, cancel any pending reconnect, and wait for the task
    /// to exit.
    pub async fn shutdown(mut self) {
        tracing::info!("Shutting down live updates");
        self.cancel.cancel();

        if let Some(handle) = self.task_handle.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                tracing::warn!("Live-update task did not exit within the grace period");
            }
        }
    }
}

impl Drop for LiveUpdates {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
