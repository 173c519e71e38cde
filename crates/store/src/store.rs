//! The notes store.
//!
//! One [`Store`] is constructed per session and shared by cloning the
//! handle. Cache state lives behind a mutex that is only held for short,
//! non-async sections; the per-key [`InFlight`] marker serializes requests
//! for one key. Events are sent while the state lock is held so delivery
//! order matches the order in which changes were applied.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use notekeep_client::{ClientError, NotesApi};
use notekeep_core::messages::NoteChange;
use notekeep_core::query::{ListKey, NoteQuery};
use notekeep_core::types::{Note, NoteDraft, NoteId, NotePatch, Paginated};
use notekeep_live::LiveEvent;

use crate::cache::{CacheEntry, Cached, InFlight, SharedResult};
use crate::events::{Operation, StoreEvent, Subscription};
use crate::optimistic::{self, PROVISIONAL_PREFIX};

/// Broadcast channel capacity for store events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Per-call options for [`Store::fetch_list`] and [`Store::fetch_detail`].
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Skip fresh cached data. Still joins a request already in flight.
    pub force_refresh: bool,
    /// Stop waiting when cancelled. The request itself is aborted once every
    /// waiter has cancelled.
    pub cancel: Option<CancellationToken>,
}

impl FetchOptions {
    pub fn forced() -> Self {
        Self {
            force_refresh: true,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

#[derive(Default)]
struct State {
    lists: HashMap<ListKey, CacheEntry<Paginated<Note>>>,
    details: HashMap<NoteId, CacheEntry<Note>>,
    /// Query of the list currently in view.
    active_query: Option<NoteQuery>,
    selected: Option<NoteId>,
    next_request_id: u64,
    /// Set when the live connection drops; cleared by the next connect.
    live_disconnected: bool,
}

struct Inner {
    api: Arc<dyn NotesApi>,
    state: Mutex<State>,
    events: broadcast::Sender<StoreEvent>,
    shutdown: CancellationToken,
    live_task: Mutex<Option<JoinHandle<()>>>,
}

/// Cache and mutation front for notes. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

/// Pre-mutation state of one entry.
struct Undo<T: Clone> {
    snapshot: Cached<T>,
    /// Entry epoch right after the optimistic write.
    epoch: u64,
}

/// Everything an optimistic mutation touched.
#[derive(Default)]
struct Rollback {
    lists: Vec<(ListKey, Undo<Paginated<Note>>)>,
    detail: Option<(NoteId, Undo<Note>)>,
    /// Id of the locally inserted note, for creates.
    provisional: Option<NoteId>,
}

// ---------------------------------------------------------------------------
// Cache slots
// ---------------------------------------------------------------------------

/// A keyed family of cache entries with the request that fills them.
trait Slot: Send + Sync + 'static {
    type Request: Clone + Send + Sync + 'static;
    type Key: Clone + Eq + Hash + Debug + Send + Sync + 'static;
    type Value: Clone + Send + Sync + 'static;

    const OPERATION: Operation;

    fn key(request: &Self::Request) -> Self::Key;

    fn entries(state: &mut State) -> &mut HashMap<Self::Key, CacheEntry<Self::Value>>;

    fn changed(key: &Self::Key) -> StoreEvent;

    fn send(
        api: Arc<dyn NotesApi>,
        request: Self::Request,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<Self::Value, ClientError>>;
}

struct Lists;

impl Slot for Lists {
    type Request = NoteQuery;
    type Key = ListKey;
    type Value = Paginated<Note>;

    const OPERATION: Operation = Operation::FetchList;

    fn key(request: &NoteQuery) -> ListKey {
        request.cache_key()
    }

    fn entries(state: &mut State) -> &mut HashMap<ListKey, CacheEntry<Paginated<Note>>> {
        &mut state.lists
    }

    fn changed(key: &ListKey) -> StoreEvent {
        StoreEvent::ListChanged { key: key.clone() }
    }

    fn send(
        api: Arc<dyn NotesApi>,
        query: NoteQuery,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<Paginated<Note>, ClientError>> {
        async move { api.list(&query, &cancel).await }.boxed()
    }
}

struct Details;

impl Slot for Details {
    type Request = NoteId;
    type Key = NoteId;
    type Value = Note;

    const OPERATION: Operation = Operation::FetchDetail;

    fn key(request: &NoteId) -> NoteId {
        request.clone()
    }

    fn entries(state: &mut State) -> &mut HashMap<NoteId, CacheEntry<Note>> {
        &mut state.details
    }

    fn changed(key: &NoteId) -> StoreEvent {
        StoreEvent::DetailChanged { id: key.clone() }
    }

    fn send(
        api: Arc<dyn NotesApi>,
        id: NoteId,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<Note, ClientError>> {
        async move { api.get(&id, &cancel).await }.boxed()
    }
}

// ---------------------------------------------------------------------------
// Entry helpers
// ---------------------------------------------------------------------------

/// Apply `edit` to a copy of the entry's data and write it back, keeping the
/// freshness flag. Entries without data, or where `edit` changes nothing,
/// are left alone.
fn edit_entry<T: Clone>(
    entry: &mut CacheEntry<T>,
    edit: impl FnOnce(&mut T) -> bool,
) -> Option<Undo<T>> {
    let mut data = entry.data.clone()?;
    if !edit(&mut data) {
        return None;
    }
    let snapshot = entry.snapshot();
    entry.write(Some(data), entry.fresh);
    Some(Undo {
        snapshot,
        epoch: entry.epoch,
    })
}

/// Put back the pre-mutation state, but only if nothing else wrote to the
/// entry in the meantime.
fn restore_entry<T: Clone>(entry: &mut CacheEntry<T>, undo: Undo<T>) -> bool {
    if entry.epoch != undo.epoch {
        return false;
    }
    entry.restore(undo.snapshot);
    true
}

/// Mark stale. A request already in flight started before the change, so a
/// re-fetch is queued behind it.
fn mark_stale<T: Clone>(entry: &mut CacheEntry<T>) {
    entry.invalidate();
    if entry.in_flight.is_some() {
        entry.refetch_queued = true;
    }
}

/// Mark every list stale. Returns the active query if its list should be
/// re-fetched right away.
fn invalidate_lists(state: &mut State) -> Option<NoteQuery> {
    for entry in state.lists.values_mut() {
        mark_stale(entry);
    }
    let query = state.active_query.clone()?;
    let entry = state.lists.get(&query.cache_key())?;
    entry.in_flight.is_none().then_some(query)
}

/// Mark the selected detail stale. Returns its id if it should be re-fetched
/// right away.
fn invalidate_selected(state: &mut State) -> Option<NoteId> {
    let id = state.selected.clone()?;
    match state.details.get_mut(&id) {
        Some(entry) => {
            mark_stale(entry);
            entry.in_flight.is_none().then_some(id)
        }
        None => Some(id),
    }
}

impl Store {
    pub fn new(api: Arc<dyn NotesApi>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                api,
                state: Mutex::new(State::default()),
                events,
                shutdown: CancellationToken::new(),
                live_task: Mutex::new(None),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: StoreEvent) {
        // No receivers is fine.
        let _ = self.inner.events.send(event);
    }

    // -----------------------------------------------------------------------
    // Fetching
    // -----------------------------------------------------------------------

    /// Fetch one page of notes, serving fresh cached data when possible.
    ///
    /// The query becomes the list in view: live-update notifications and
    /// successful creates and deletes re-fetch it in the background.
    pub async fn fetch_list(
        &self,
        query: &NoteQuery,
        options: FetchOptions,
    ) -> Result<Paginated<Note>, ClientError> {
        self.lock().active_query = Some(query.clone());
        self.fetch::<Lists>(query.clone(), options).await
    }

    /// Fetch one note, serving fresh cached data when possible.
    pub async fn fetch_detail(&self, id: &str, options: FetchOptions) -> Result<Note, ClientError> {
        self.fetch::<Details>(id.to_owned(), options).await
    }

    async fn fetch<S: Slot>(
        &self,
        request: S::Request,
        options: FetchOptions,
    ) -> Result<S::Value, ClientError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        let key = S::key(&request);

        let (request_id, result) = {
            let mut state = self.lock();
            state.next_request_id += 1;
            let next_id = state.next_request_id;

            let entry = S::entries(&mut state).entry(key.clone()).or_default();
            if !options.force_refresh {
                if let Some(data) = entry.fresh_data() {
                    return Ok(data.clone());
                }
            }

            match entry.in_flight.as_mut() {
                Some(flight) => {
                    flight.waiters += 1;
                    tracing::debug!(
                        key = ?key,
                        request_id = flight.id,
                        "Joining in-flight request",
                    );
                    (flight.id, flight.result.clone())
                }
                None => {
                    let cancel = self.inner.shutdown.child_token();
                    let result = self.spawn_request::<S>(request, next_id, cancel.clone());
                    entry.in_flight = Some(InFlight {
                        id: next_id,
                        epoch: entry.epoch,
                        cancel,
                        waiters: 1,
                        result: result.clone(),
                    });
                    tracing::debug!(key = ?key, request_id = next_id, "Started request");
                    (next_id, result)
                }
            }
        };

        let Some(cancel) = options.cancel else {
            return result.await;
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.release_waiter::<S>(&key, request_id);
                Err(ClientError::Cancelled)
            }
            outcome = result => outcome,
        }
    }

    /// Run the request on its own task so it survives waiters going away.
    /// Must be called with the state lock held, before the marker is stored.
    fn spawn_request<S: Slot>(
        &self,
        request: S::Request,
        request_id: u64,
        cancel: CancellationToken,
    ) -> SharedResult<S::Value> {
        let store = self.clone();
        let settle = request.clone();
        let handle = tokio::spawn(async move {
            let sent = S::send(Arc::clone(&store.inner.api), request.clone(), cancel.clone());
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ClientError::Cancelled),
                result = sent => result,
            };
            store.complete::<S>(request, request_id, &result);
            result
        });

        let store = self.clone();
        async move {
            match handle.await {
                Ok(result) => result,
                // The task never reached `complete`; settle the entry here.
                Err(err) => {
                    let result = if err.is_cancelled() {
                        Err(ClientError::Cancelled)
                    } else {
                        tracing::error!(error = %err, "Request task failed");
                        Err(ClientError::Network(format!("request task failed: {err}")))
                    };
                    store.complete::<S>(settle, request_id, &result);
                    result
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Settle a request: store the result if the entry has not changed since
    /// the request started, report failures, and run a queued re-fetch.
    fn complete<S: Slot>(
        &self,
        request: S::Request,
        request_id: u64,
        result: &Result<S::Value, ClientError>,
    ) {
        let key = S::key(&request);
        let refetch = {
            let mut state = self.lock();
            let Some(entry) = S::entries(&mut state).get_mut(&key) else {
                return;
            };
            if !entry.is_current(request_id) {
                return;
            }
            let Some(flight) = entry.in_flight.take() else {
                return;
            };
            let refetch = std::mem::take(&mut entry.refetch_queued);

            match result {
                Ok(value) if flight.epoch == entry.epoch => {
                    entry.write(Some(value.clone()), true);
                    self.emit(S::changed(&key));
                }
                Ok(_) => {
                    tracing::debug!(
                        key = ?key,
                        request_id,
                        "Entry changed during request, result not cached",
                    );
                }
                Err(ClientError::Cancelled) => {}
                Err(err) => {
                    tracing::warn!(key = ?key, error = %err, "Fetch failed");
                    self.emit(StoreEvent::Error {
                        operation: S::OPERATION,
                        error: err.record(),
                    });
                }
            }
            refetch && !self.inner.shutdown.is_cancelled()
        };

        if refetch {
            self.spawn_refetch::<S>(request);
        }
    }

    /// A cancelling waiter leaves. The last one out aborts the request.
    fn release_waiter<S: Slot>(&self, key: &S::Key, request_id: u64) {
        let mut state = self.lock();
        let Some(entry) = S::entries(&mut state).get_mut(key) else {
            return;
        };
        let Some(flight) = entry.in_flight.as_mut().filter(|f| f.id == request_id) else {
            return;
        };
        flight.waiters = flight.waiters.saturating_sub(1);
        if flight.waiters > 0 {
            return;
        }
        if let Some(flight) = entry.in_flight.take() {
            flight.cancel.cancel();
        }
        entry.refetch_queued = false;
        tracing::debug!(key = ?key, request_id, "All waiters cancelled, request aborted");
    }

    fn spawn_refetch<S: Slot>(&self, request: S::Request) {
        let store = self.clone();
        tokio::spawn(async move {
            // Failures are reported as events by `complete`.
            let _ = store.fetch::<S>(request, FetchOptions::forced()).await;
        });
    }

    fn spawn_refetches(&self, list: Option<NoteQuery>, detail: Option<NoteId>) {
        if let Some(query) = list {
            self.spawn_refetch::<Lists>(query);
        }
        if let Some(id) = detail {
            self.spawn_refetch::<Details>(id);
        }
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Create a note. A provisional copy is shown at the top of the first
    /// page in view (when it matches the filters) until the backend answers.
    pub async fn create_note(&self, draft: NoteDraft) -> Result<Note, ClientError> {
        let provisional_id = format!("{PROVISIONAL_PREFIX}{}", Uuid::new_v4());
        let provisional = draft.to_provisional(provisional_id.clone(), Utc::now());

        let rollback = {
            let mut state = self.lock();
            let mut rollback = Rollback {
                provisional: Some(provisional_id.clone()),
                ..Default::default()
            };
            let target = state
                .active_query
                .as_ref()
                .filter(|q| q.page == 1 && optimistic::matches_query(&provisional, q))
                .map(NoteQuery::cache_key);
            if let Some(key) = target {
                if let Some(entry) = state.lists.get_mut(&key) {
                    let undo = edit_entry(entry, |page| {
                        optimistic::insert_first(page, provisional.clone());
                        true
                    });
                    if let Some(undo) = undo {
                        self.emit(StoreEvent::ListChanged { key: key.clone() });
                        rollback.lists.push((key, undo));
                    }
                }
            }
            rollback
        };

        let cancel = self.inner.shutdown.child_token();
        match self.inner.api.create(&draft, &cancel).await {
            Ok(note) => {
                let refresh = {
                    let mut state = self.lock();
                    for (key, entry) in state.lists.iter_mut() {
                        if edit_entry(entry, |page| {
                            optimistic::replace_item(page, &provisional_id, &note)
                        })
                        .is_some()
                        {
                            self.emit(StoreEvent::ListChanged { key: key.clone() });
                        }
                    }
                    state
                        .details
                        .entry(note.id.clone())
                        .or_default()
                        .write(Some(note.clone()), true);
                    self.emit(StoreEvent::DetailChanged {
                        id: note.id.clone(),
                    });
                    invalidate_lists(&mut state)
                };
                tracing::info!(id = %note.id, "Note created");
                self.spawn_refetches(refresh, None);
                Ok(note)
            }
            Err(err) => {
                self.roll_back(rollback, Operation::Create, &err);
                Err(err)
            }
        }
    }

    /// Partially update a note, optimistically patching every cached copy.
    pub async fn update_note(&self, id: &str, patch: NotePatch) -> Result<Note, ClientError> {
        let rollback = {
            let mut state = self.lock();
            let now = Utc::now();
            let mut rollback = Rollback::default();
            for (key, entry) in state.lists.iter_mut() {
                if let Some(undo) =
                    edit_entry(entry, |page| optimistic::patch_item(page, id, &patch, now))
                {
                    self.emit(StoreEvent::ListChanged { key: key.clone() });
                    rollback.lists.push((key.clone(), undo));
                }
            }
            if let Some(entry) = state.details.get_mut(id) {
                let undo = edit_entry(entry, |note| {
                    note.apply_patch(&patch, now);
                    true
                });
                if let Some(undo) = undo {
                    self.emit(StoreEvent::DetailChanged { id: id.to_owned() });
                    rollback.detail = Some((id.to_owned(), undo));
                }
            }
            rollback
        };

        let cancel = self.inner.shutdown.child_token();
        match self.inner.api.patch(id, &patch, &cancel).await {
            Ok(note) => {
                let refresh = {
                    let mut state = self.lock();
                    for (key, entry) in state.lists.iter_mut() {
                        let replaced =
                            edit_entry(entry, |page| optimistic::replace_item(page, id, &note));
                        if replaced.is_some() {
                            self.emit(StoreEvent::ListChanged { key: key.clone() });
                        }
                    }
                    state
                        .details
                        .entry(note.id.clone())
                        .or_default()
                        .write(Some(note.clone()), true);
                    self.emit(StoreEvent::DetailChanged {
                        id: note.id.clone(),
                    });
                    // The edit may move the note in or out of filtered lists.
                    invalidate_lists(&mut state)
                };
                tracing::info!(id = %note.id, "Note updated");
                self.spawn_refetches(refresh, None);
                Ok(note)
            }
            Err(err) => {
                self.roll_back(rollback, Operation::Update, &err);
                Err(err)
            }
        }
    }

    /// Delete a note, optimistically removing it from every cached list.
    /// The selection is cleared once the backend confirms.
    pub async fn delete_note(&self, id: &str) -> Result<(), ClientError> {
        let rollback = {
            let mut state = self.lock();
            let mut rollback = Rollback::default();
            for (key, entry) in state.lists.iter_mut() {
                if let Some(undo) = edit_entry(entry, |page| optimistic::remove_item(page, id)) {
                    self.emit(StoreEvent::ListChanged { key: key.clone() });
                    rollback.lists.push((key.clone(), undo));
                }
            }
            if let Some(entry) = state.details.get_mut(id).filter(|e| e.data.is_some()) {
                let snapshot = entry.snapshot();
                entry.write(None, false);
                self.emit(StoreEvent::DetailRemoved { id: id.to_owned() });
                rollback.detail = Some((
                    id.to_owned(),
                    Undo {
                        snapshot,
                        epoch: entry.epoch,
                    },
                ));
            }
            rollback
        };

        let cancel = self.inner.shutdown.child_token();
        match self.inner.api.remove(id, &cancel).await {
            Ok(()) => {
                let refresh = {
                    let mut state = self.lock();
                    state.details.remove(id);
                    if state.selected.as_deref() == Some(id) {
                        state.selected = None;
                        self.emit(StoreEvent::SelectionChanged { selected: None });
                    }
                    invalidate_lists(&mut state)
                };
                tracing::info!(id, "Note deleted");
                self.spawn_refetches(refresh, None);
                Ok(())
            }
            Err(err) => {
                self.roll_back(rollback, Operation::Delete, &err);
                Err(err)
            }
        }
    }

    /// Undo an optimistic mutation after the backend rejected it.
    ///
    /// Entries untouched since the mutation get their exact snapshot back.
    /// Entries that changed in the meantime hold newer data than the
    /// snapshot; they are marked stale instead, and a provisional note is
    /// removed from them.
    fn roll_back(&self, rollback: Rollback, operation: Operation, err: &ClientError) {
        let mut state = self.lock();

        for (key, undo) in rollback.lists {
            let Some(entry) = state.lists.get_mut(&key) else {
                continue;
            };
            let changed = restore_entry(entry, undo)
                || rollback.provisional.as_deref().is_some_and(|provisional| {
                    edit_entry(entry, |page| optimistic::remove_item(page, provisional)).is_some()
                });
            if changed {
                self.emit(StoreEvent::ListChanged { key });
            } else {
                mark_stale(entry);
            }
        }

        if let Some((id, undo)) = rollback.detail {
            if let Some(entry) = state.details.get_mut(&id) {
                if restore_entry(entry, undo) {
                    self.emit(StoreEvent::DetailChanged { id });
                } else {
                    mark_stale(entry);
                }
            }
        }

        if err.is_cancelled() {
            tracing::debug!(?operation, "Mutation cancelled, rolled back");
            return;
        }
        tracing::warn!(?operation, error = %err, "Mutation failed, rolled back");
        self.emit(StoreEvent::Error {
            operation,
            error: err.record(),
        });
    }

    // -----------------------------------------------------------------------
    // Selection
    // -----------------------------------------------------------------------

    pub fn select(&self, id: impl Into<NoteId>) {
        self.set_selection(Some(id.into()));
    }

    pub fn clear_selection(&self) {
        self.set_selection(None);
    }

    pub fn selection(&self) -> Option<NoteId> {
        self.lock().selected.clone()
    }

    fn set_selection(&self, selected: Option<NoteId>) {
        let mut state = self.lock();
        if state.selected == selected {
            return;
        }
        state.selected = selected.clone();
        self.emit(StoreEvent::SelectionChanged { selected });
    }

    // -----------------------------------------------------------------------
    // Cache access
    // -----------------------------------------------------------------------

    /// Cached list for `query`, without any I/O.
    pub fn peek_list(&self, query: &NoteQuery) -> Option<Cached<Paginated<Note>>> {
        self.lock()
            .lists
            .get(&query.cache_key())
            .map(CacheEntry::view)
    }

    /// Cached note, without any I/O.
    pub fn peek_detail(&self, id: &str) -> Option<Cached<Note>> {
        self.lock().details.get(id).map(CacheEntry::view)
    }

    pub fn invalidate_list(&self, query: &NoteQuery) {
        if let Some(entry) = self.lock().lists.get_mut(&query.cache_key()) {
            mark_stale(entry);
        }
    }

    pub fn invalidate_detail(&self, id: &str) {
        if let Some(entry) = self.lock().details.get_mut(id) {
            mark_stale(entry);
        }
    }

    /// Mark every entry stale. Data stays available through the peek methods.
    pub fn invalidate_all(&self) {
        let mut state = self.lock();
        state.lists.values_mut().for_each(mark_stale);
        state.details.values_mut().for_each(mark_stale);
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Receive store events directly.
    pub fn events(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    /// Call `callback` for every store event until the returned
    /// [`Subscription`] is dropped or unsubscribed.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(StoreEvent) + Send + 'static,
    {
        Subscription::spawn(self.events(), callback)
    }

    // -----------------------------------------------------------------------
    // Live updates
    // -----------------------------------------------------------------------

    /// React to one live-update event.
    pub fn apply_live_event(&self, event: &LiveEvent) {
        match event {
            LiveEvent::Disconnected => {
                self.lock().live_disconnected = true;
            }
            LiveEvent::Connected => {
                let resync = std::mem::take(&mut self.lock().live_disconnected);
                if resync {
                    self.resync();
                }
            }
            LiveEvent::Note(change) => self.apply_change(change),
        }
    }

    fn apply_change(&self, change: &NoteChange) {
        let id = change.note_id();
        tracing::debug!(kind = change.kind(), id, "Applying live change");

        let (list, detail) = {
            let mut state = self.lock();
            let list = invalidate_lists(&mut state);
            let selected = state.selected.as_deref() == Some(id);

            let detail = match change {
                NoteChange::Deleted(_) => {
                    if state.details.remove(id).is_some() {
                        self.emit(StoreEvent::DetailRemoved { id: id.to_owned() });
                    }
                    if selected {
                        state.selected = None;
                        self.emit(StoreEvent::SelectionChanged { selected: None });
                    }
                    None
                }
                NoteChange::Created(_) | NoteChange::Updated(_) => {
                    match state.details.get_mut(id) {
                        Some(entry) => {
                            mark_stale(entry);
                            (selected && entry.in_flight.is_none()).then(|| id.to_owned())
                        }
                        None => selected.then(|| id.to_owned()),
                    }
                }
            };
            (list, detail)
        };

        self.spawn_refetches(list, detail);
    }

    /// Notifications may have been missed: refresh what is in view.
    fn resync(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        tracing::info!("Resynchronizing cache after missed live updates");
        let (list, detail) = {
            let mut state = self.lock();
            (invalidate_lists(&mut state), invalidate_selected(&mut state))
        };
        self.spawn_refetches(list, detail);
    }

    /// Consume a live-update event stream until shutdown. Replaces any
    /// previously attached stream.
    pub fn attach_live(&self, mut events: broadcast::Receiver<LiveEvent>) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let shutdown = self.inner.shutdown.clone();

        let handle = tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    received = events.recv() => received,
                };
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let store = Store { inner };
                match received {
                    Ok(event) => store.apply_live_event(&event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Live-update stream lagged");
                        store.resync();
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Live-update stream closed");
                        break;
                    }
                }
            }
        });

        let previous = self
            .inner
            .live_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Stop live attachment and cancel every in-flight request. Later
    /// fetches fail with [`ClientError::Cancelled`].
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down store");
        self.inner.shutdown.cancel();

        let handle = self
            .inner
            .live_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}
