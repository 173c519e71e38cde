//! Live-update WebSocket client.
//!
//! Connects to the backend's change feed, parses `notes.*` notifications,
//! and republishes them as [`LiveEvent`]s on a broadcast channel so the
//! store never touches the transport. Dropped connections are retried with
//! capped exponential backoff until the [`LiveUpdates`] handle is shut down.

pub mod client;
pub mod events;
pub mod manager;
pub mod processor;
pub mod reconnect;

pub use client::{LiveClient, LiveError};
pub use events::{ConnectionState, LiveEvent};
pub use manager::LiveUpdates;
