//! WebSocket client for the live-update endpoint.
//!
//! [`LiveClient`] holds the connection configuration. Call
//! [`LiveClient::connect`] to establish a live [`LiveConnection`].

use tokio_tungstenite::{connect_async, MaybeTlsStream};

/// The raw WebSocket stream type used for live updates.
pub type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Configuration handle for the live-update endpoint.
#[derive(Debug, Clone)]
pub struct LiveClient {
    ws_url: String,
}

/// A live WebSocket connection.
pub struct LiveConnection {
    /// URL the connection was opened against.
    pub ws_url: String,
    /// The raw WebSocket stream for reading/writing frames.
    pub ws_stream: WsStream,
}

impl LiveClient {
    /// * `ws_url` - WebSocket URL, e.g. `wss://notes.example.com/ws`.
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
        }
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Open the WebSocket connection.
    pub async fn connect(&self) -> Result<LiveConnection, LiveError> {
        let (ws_stream, _response) = connect_async(self.ws_url.as_str())
            .await
            .map_err(|e| {
                LiveError::Connection(format!("Failed to connect to {}: {e}", self.ws_url))
            })?;

        tracing::info!(ws_url = %self.ws_url, "Live-update socket connected");

        Ok(LiveConnection {
            ws_url: self.ws_url.clone(),
            ws_stream,
        })
    }
}

/// Errors that can occur when working with the WebSocket client.
#[derive(Debug, thiserror::Error)]
pub enum LiveError {
    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),
}
