//! Live-update WebSocket message types and parser.
//!
//! The backend pushes JSON text frames shaped as
//! `{"type": "notes.<change>", "payload": {"id": "...", ...}}`. This module
//! deserializes them into a strongly-typed [`NoteChange`].

use serde::{Deserialize, Serialize};

use crate::types::NoteId;

/// All recognized change notifications.
///
/// Deserialized via the adjacently-tagged `"type"` field with associated
/// `"payload"` content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum NoteChange {
    /// A note was created.
    #[serde(rename = "notes.created")]
    Created(ChangePayload),

    /// A note was updated.
    #[serde(rename = "notes.updated")]
    Updated(ChangePayload),

    /// A note was deleted.
    #[serde(rename = "notes.deleted")]
    Deleted(ChangePayload),
}

/// Payload of a change notification. Fields beyond `id` are carried through
/// untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangePayload {
    pub id: NoteId,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ChangePayload {
    pub fn new(id: impl Into<NoteId>) -> Self {
        Self {
            id: id.into(),
            extra: serde_json::Map::new(),
        }
    }
}

impl NoteChange {
    /// Id of the note this change concerns.
    pub fn note_id(&self) -> &str {
        &self.payload().id
    }

    pub fn payload(&self) -> &ChangePayload {
        match self {
            Self::Created(p) | Self::Updated(p) | Self::Deleted(p) => p,
        }
    }

    /// Wire name of the change type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Created(_) => "notes.created",
            Self::Updated(_) => "notes.updated",
            Self::Deleted(_) => "notes.deleted",
        }
    }
}

/// Parse a live-update text frame.
///
/// Returns `Err` for malformed JSON, unknown `type` values or a payload
/// without an `id`. Callers should log and keep the connection open.
pub fn parse_message(text: &str) -> Result<NoteChange, serde_json::Error> {
    serde_json::from_str(text)
}
