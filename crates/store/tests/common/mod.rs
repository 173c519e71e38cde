use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use notekeep_client::{ClientError, NotesApi};
use notekeep_core::error::ErrorRecord;
use notekeep_core::query::NoteQuery;
use notekeep_core::types::{Note, NoteDraft, NotePatch, Paginated, Timestamp};
use notekeep_store::StoreEvent;

/// Fixed timestamp so notes compare equal across calls.
pub fn at(secs: i64) -> Timestamp {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn note(id: &str, title: &str) -> Note {
    NoteDraft::new(title, format!("{title} body")).to_provisional(id.to_string(), at(0))
}

/// In-memory backend with call counters, optional latency and one-shot
/// failure injection.
#[derive(Default)]
pub struct FakeApi {
    notes: Mutex<Vec<Note>>,
    latency: Duration,
    fail_next: Mutex<Option<ClientError>>,
    panic_next_get: AtomicBool,
    next_id: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
    /// Calls that ran to completion instead of being dropped.
    pub completed: AtomicUsize,
}

impl FakeApi {
    pub fn with_notes(notes: Vec<Note>) -> Self {
        Self {
            notes: Mutex::new(notes),
            ..Default::default()
        }
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make the next mutation fail with `err`.
    pub fn fail_next(&self, err: ClientError) {
        *self.fail_next.lock().unwrap() = Some(err);
    }

    /// Make the next `get` panic, as a bug in the transport would.
    pub fn panic_next_get(&self) {
        self.panic_next_get.store(true, Ordering::SeqCst);
    }

    /// Change a note server-side, as another client would.
    pub fn edit(&self, id: &str, title: &str) {
        let mut notes = self.notes.lock().unwrap();
        if let Some(note) = notes.iter_mut().find(|n| n.id == id) {
            note.title = title.to_string();
            note.updated_at = at(60);
        }
    }

    pub fn lists(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    async fn delay(&self, cancel: &CancellationToken) -> Result<(), ClientError> {
        if !self.latency.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                _ = tokio::time::sleep(self.latency) => {}
            }
        }
        Ok(())
    }

    fn injected(&self) -> Result<(), ClientError> {
        match self.fail_next.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn not_found() -> ClientError {
    ClientError::http(404, ErrorRecord::new("Note not found").with_code("NOT_FOUND"))
}

#[async_trait]
impl NotesApi for FakeApi {
    async fn list(
        &self,
        query: &NoteQuery,
        cancel: &CancellationToken,
    ) -> Result<Paginated<Note>, ClientError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.delay(cancel).await?;
        self.completed.fetch_add(1, Ordering::SeqCst);

        let notes = self.notes.lock().unwrap();
        let matching: Vec<&Note> = notes
            .iter()
            .filter(|n| !query.favorites_only || n.favorite)
            .collect();
        let skip = (query.page.saturating_sub(1) * query.page_size) as usize;
        Ok(Paginated {
            items: matching
                .iter()
                .skip(skip)
                .take(query.page_size as usize)
                .map(|n| (*n).clone())
                .collect(),
            total: matching.len() as u64,
            page: query.page,
            page_size: query.page_size,
        })
    }

    async fn get(&self, id: &str, cancel: &CancellationToken) -> Result<Note, ClientError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.delay(cancel).await?;
        if self.panic_next_get.swap(false, Ordering::SeqCst) {
            panic!("transport bug");
        }
        self.completed.fetch_add(1, Ordering::SeqCst);

        let notes = self.notes.lock().unwrap();
        notes.iter().find(|n| n.id == id).cloned().ok_or_else(not_found)
    }

    async fn create(
        &self,
        draft: &NoteDraft,
        cancel: &CancellationToken,
    ) -> Result<Note, ClientError> {
        self.delay(cancel).await?;
        self.injected()?;

        let id = format!("n-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 100);
        let note = draft.to_provisional(id, at(30));
        self.notes.lock().unwrap().insert(0, note.clone());
        Ok(note)
    }

    async fn replace(
        &self,
        id: &str,
        draft: &NoteDraft,
        cancel: &CancellationToken,
    ) -> Result<Note, ClientError> {
        let patch = NotePatch {
            title: Some(draft.title.clone()),
            content: Some(draft.content.clone()),
            favorite: Some(draft.favorite),
            tags: Some(draft.tags.clone()),
        };
        self.patch(id, &patch, cancel).await
    }

    async fn patch(
        &self,
        id: &str,
        patch: &NotePatch,
        cancel: &CancellationToken,
    ) -> Result<Note, ClientError> {
        self.delay(cancel).await?;
        self.injected()?;

        let mut notes = self.notes.lock().unwrap();
        let note = notes.iter_mut().find(|n| n.id == id).ok_or_else(not_found)?;
        note.apply_patch(patch, at(45));
        Ok(note.clone())
    }

    async fn remove(&self, id: &str, cancel: &CancellationToken) -> Result<(), ClientError> {
        self.delay(cancel).await?;
        self.injected()?;

        let mut notes = self.notes.lock().unwrap();
        let before = notes.len();
        notes.retain(|n| n.id != id);
        if notes.len() == before {
            return Err(not_found());
        }
        Ok(())
    }
}

pub async fn next_event(rx: &mut broadcast::Receiver<StoreEvent>) -> StoreEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for store event")
        .expect("store event channel closed")
}

/// Skip events until one matches.
pub async fn wait_for(
    rx: &mut broadcast::Receiver<StoreEvent>,
    matches: impl Fn(&StoreEvent) -> bool,
) -> StoreEvent {
    loop {
        let event = next_event(rx).await;
        if matches(&event) {
            return event;
        }
    }
}
