//! Local events republished by the live-update client.

use notekeep_core::messages::NoteChange;

/// An event on the live-update bus.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// The socket connected (initially or after a reconnect).
    Connected,

    /// The socket dropped. Notifications may be missed until the next
    /// [`LiveEvent::Connected`].
    Disconnected,

    /// A change notification from the backend, type and payload unchanged.
    Note(NoteChange),
}

/// Connection state machine of the live-update client.
///
/// `Disconnected → Connecting → Connected → Disconnected → ...`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}
