//! Wire data model shared by the REST client, the live-update client and
//! the store.
//!
//! Field names follow the backend's camelCase JSON.

use serde::{Deserialize, Serialize};

/// Backend-assigned note identifier. Opaque to the client.
pub type NoteId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// A tag reference attached to a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// A single note as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl Note {
    /// Apply a partial update in place.
    ///
    /// Only the fields present in `patch` change. `updated_at` is bumped to
    /// `now` but never moves backwards.
    pub fn apply_patch(&mut self, patch: &NotePatch, now: Timestamp) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(content) = &patch.content {
            self.content = content.clone();
        }
        if let Some(favorite) = patch.favorite {
            self.favorite = favorite;
        }
        if let Some(tags) = &patch.tags {
            self.tags = tags.clone();
        }
        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}

/// One page of a list query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Paginated<T> {
    /// An empty first page, used as the base for optimistic inserts into a
    /// list that has never been fetched.
    pub fn empty(page: u32, page_size: u32) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            page,
            page_size,
        }
    }
}

/// Request body for `POST /notes` and `PUT /notes/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl NoteDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    /// Materialize a provisional note for optimistic display.
    pub fn to_provisional(&self, id: NoteId, now: Timestamp) -> Note {
        Note {
            id,
            title: self.title.clone(),
            content: self.content.clone(),
            created_at: now,
            updated_at: now,
            favorite: self.favorite,
            tags: self.tags.clone(),
        }
    }
}

/// Request body for `PATCH /notes/{id}`. Absent fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorite: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<Tag>>,
}

impl NotePatch {
    /// Shorthand for the favorite toggle, the most common patch.
    pub fn favorite(favorite: bool) -> Self {
        Self {
            favorite: Some(favorite),
            ..Default::default()
        }
    }
}
