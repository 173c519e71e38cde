//! Connect → process → reconnect loop.
//!
//! After every failed connect or dropped session the loop waits for the
//! next delay of a [`Backoff`] schedule. A successful connect resets the
//! schedule. Cancellation is observed while connecting, while processing
//! and while waiting, so no attempt is made after shutdown.

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use notekeep_core::backoff::{Backoff, ReconnectConfig};

use crate::client::LiveClient;
use crate::events::{ConnectionState, LiveEvent};
use crate::processor::{process_messages, SessionEnd};

/// Run the connection state machine until `cancel` fires.
pub async fn run_connection_loop(
    client: &LiveClient,
    config: &ReconnectConfig,
    event_tx: &broadcast::Sender<LiveEvent>,
    state_tx: &watch::Sender<ConnectionState>,
    cancel: &CancellationToken,
) {
    let mut backoff = Backoff::new(config.clone());

    loop {
        state_tx.send_replace(ConnectionState::Connecting);

        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = client.connect() => result,
        };

        match connected {
            Ok(mut conn) => {
                backoff.on_success();
                state_tx.send_replace(ConnectionState::Connected);
                let _ = event_tx.send(LiveEvent::Connected);

                let end = process_messages(&mut conn.ws_stream, event_tx, cancel).await;

                state_tx.send_replace(ConnectionState::Disconnected);
                let _ = event_tx.send(LiveEvent::Disconnected);

                if end == SessionEnd::Cancelled {
                    break;
                }
                tracing::info!(ws_url = %client.ws_url(), ?end, "Live-update session ended");
            }
            Err(e) => {
                state_tx.send_replace(ConnectionState::Disconnected);
                tracing::warn!(
                    error = %e,
                    failures = backoff.failures() + 1,
                    "Live-update connection failed",
                );
            }
        }

        let delay = backoff.on_failure();
        tracing::info!(
            ws_url = %client.ws_url(),
            attempt = backoff.failures(),
            delay_ms = delay.as_millis() as u64,
            "Scheduling live-update reconnect",
        );

        // Wait before the next attempt, respecting cancellation.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    state_tx.send_replace(ConnectionState::Disconnected);
    tracing::info!(ws_url = %client.ws_url(), "Live-update loop stopped");
}
