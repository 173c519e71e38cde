//! WebSocket message processing loop.
//!
//! Reads raw frames from the live-update connection, parses them into
//! [`NoteChange`] notifications, and republishes each one as a
//! [`LiveEvent::Note`] on the broadcast channel.

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;

use notekeep_core::messages::parse_message;

use crate::client::WsStream;
use crate::events::LiveEvent;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer closed the socket or the stream ran dry.
    Closed,
    /// A receive error broke the connection.
    Failed,
    /// The owner asked us to stop; the socket was closed from our side.
    Cancelled,
}

/// Process WebSocket messages until the socket closes, fails, or `cancel`
/// fires.
///
/// Malformed frames are logged and skipped; they never end the session.
pub async fn process_messages(
    ws_stream: &mut WsStream,
    event_tx: &broadcast::Sender<LiveEvent>,
    cancel: &CancellationToken,
) -> SessionEnd {
    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                if let Err(e) = ws_stream.close(None).await {
                    tracing::debug!(error = %e, "Error while closing live-update socket");
                }
                return SessionEnd::Cancelled;
            }
            frame = ws_stream.next() => frame,
        };

        if let Some(end) = handle_frame(frame, event_tx) {
            return end;
        }
    }
}

/// Act on one item read from the socket. Returns `Some` when the session is
/// over.
pub(crate) fn handle_frame(
    frame: Option<Result<Message, WsError>>,
    event_tx: &broadcast::Sender<LiveEvent>,
) -> Option<SessionEnd> {
    match frame {
        Some(Ok(Message::Text(text))) => {
            handle_text_message(&text, event_tx);
        }
        Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
            Ok(text) => {
                handle_text_message(text, event_tx);
            }
            Err(e) => {
                tracing::warn!(error = %e, len = bytes.len(), "Ignoring non-UTF-8 frame");
            }
        },
        // A text frame that failed UTF-8 validation; the socket is still usable.
        Some(Err(WsError::Utf8)) => {
            tracing::warn!("Ignoring text frame with invalid UTF-8");
        }
        Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
            // Handled automatically by tungstenite.
        }
        Some(Ok(Message::Close(frame))) => {
            tracing::info!(?frame, "Live-update socket closed by server");
            return Some(SessionEnd::Closed);
        }
        Some(Ok(Message::Frame(_))) => {}
        Some(Err(e)) => {
            tracing::error!(error = %e, "Live-update receive error");
            return Some(SessionEnd::Failed);
        }
        None => {
            tracing::info!("Live-update stream exhausted");
            return Some(SessionEnd::Closed);
        }
    }
    None
}

/// Parse one text frame and publish it. Returns whether an event was
/// published.
pub(crate) fn handle_text_message(text: &str, event_tx: &broadcast::Sender<LiveEvent>) -> bool {
    match parse_message(text) {
        Ok(change) => {
            tracing::debug!(kind = change.kind(), note_id = %change.note_id(), "Live update");
            // A send error only means nobody is subscribed right now.
            let _ = event_tx.send(LiveEvent::Note(change));
            true
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                raw_message = %text,
                "Ignoring malformed live-update message",
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use notekeep_core::messages::{ChangePayload, NoteChange};

    use super::*;

    #[test]
    fn recognized_message_is_republished() {
        let (tx, mut rx) = broadcast::channel(8);
        assert!(handle_text_message(
            r#"{"type":"notes.deleted","payload":{"id":"X"}}"#,
            &tx
        ));
        assert_eq!(
            rx.try_recv().unwrap(),
            LiveEvent::Note(NoteChange::Deleted(ChangePayload::new("X")))
        );
    }

    #[test]
    fn unknown_type_is_dropped() {
        let (tx, mut rx) = broadcast::channel(8);
        assert!(!handle_text_message(
            r#"{"type":"presence.joined","payload":{"id":"u1"}}"#,
            &tx
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn invalid_utf8_text_keeps_the_session_open() {
        let (tx, mut rx) = broadcast::channel(8);
        assert_eq!(handle_frame(Some(Err(WsError::Utf8)), &tx), None);
        assert_eq!(
            handle_frame(Some(Ok(Message::Binary(vec![0xff, 0xfe]))), &tx),
            None
        );
        assert!(rx.try_recv().is_err());

        let next = Message::Text(r#"{"type":"notes.deleted","payload":{"id":"X"}}"#.into());
        assert_eq!(handle_frame(Some(Ok(next)), &tx), None);
        assert!(matches!(rx.try_recv(), Ok(LiveEvent::Note(_))));
    }

    #[test]
    fn receive_errors_and_close_end_the_session() {
        let (tx, _) = broadcast::channel(8);
        assert_eq!(
            handle_frame(Some(Err(WsError::ConnectionClosed)), &tx),
            Some(SessionEnd::Failed)
        );
        assert_eq!(handle_frame(Some(Ok(Message::Close(None))), &tx), Some(SessionEnd::Closed));
        assert_eq!(handle_frame(None, &tx), Some(SessionEnd::Closed));
    }

    #[test]
    fn publishing_without_subscribers_does_not_panic() {
        let (tx, _) = broadcast::channel(8);
        assert!(handle_text_message(
            r#"{"type":"notes.created","payload":{"id":"n1"}}"#,
            &tx
        ));
    }
}
