//! Pure list edits used for optimistic updates and their reconciliation.

use notekeep_core::query::NoteQuery;
use notekeep_core::types::{Note, NotePatch, Paginated, Timestamp};

/// Prefix of ids given to notes that exist only locally until the backend
/// confirms their creation.
pub const PROVISIONAL_PREFIX: &str = "local-";

/// Whether `note` would be part of the result of `query`, judged locally.
pub fn matches_query(note: &Note, query: &NoteQuery) -> bool {
    if query.favorites_only && !note.favorite {
        return false;
    }
    if let Some(tag) = query.tag.as_deref().filter(|t| !t.is_empty()) {
        if !note.tags.iter().any(|t| t.id == tag) {
            return false;
        }
    }
    if let Some(term) = query.search_term() {
        let term = term.to_lowercase();
        if !note.title.to_lowercase().contains(&term)
            && !note.content.to_lowercase().contains(&term)
        {
            return false;
        }
    }
    true
}

/// Insert `note` at the top of a page, keeping `items.len() <= page_size`.
pub fn insert_first(page: &mut Paginated<Note>, note: Note) {
    page.items.insert(0, note);
    page.total += 1;
    if page.page_size > 0 {
        page.items.truncate(page.page_size as usize);
    }
}

/// Apply `patch` to the note with `id`. Returns whether it was present.
pub fn patch_item(page: &mut Paginated<Note>, id: &str, patch: &NotePatch, now: Timestamp) -> bool {
    match page.items.iter_mut().find(|n| n.id == id) {
        Some(note) => {
            note.apply_patch(patch, now);
            true
        }
        None => false,
    }
}

/// Replace the note with `id` by `note`. Returns whether it was present.
pub fn replace_item(page: &mut Paginated<Note>, id: &str, note: &Note) -> bool {
    match page.items.iter_mut().find(|n| n.id == id) {
        Some(slot) => {
            *slot = note.clone();
            true
        }
        None => false,
    }
}

/// Remove the note with `id`. Returns whether it was present.
pub fn remove_item(page: &mut Paginated<Note>, id: &str) -> bool {
    let before = page.items.len();
    page.items.retain(|n| n.id != id);
    let removed = page.items.len() != before;
    if removed {
        page.total = page.total.saturating_sub(1);
    }
    removed
}
