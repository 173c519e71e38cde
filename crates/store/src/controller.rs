//! Query state of one list view.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use notekeep_client::ClientError;
use notekeep_core::config::DEFAULT_SEARCH_DEBOUNCE;
use notekeep_core::query::{NoteQuery, ViewMode};
use notekeep_core::types::{Note, Paginated};

use crate::store::{FetchOptions, Store};

#[derive(Default)]
struct ViewState {
    query: NoteQuery,
    /// Token of the last fetch issued by this view.
    in_flight: Option<CancellationToken>,
    /// Pending debounced search.
    debounce: Option<JoinHandle<()>>,
    /// Bumped by every search keystroke.
    search_generation: u64,
}

/// Drives [`Store::fetch_list`] for a single list view.
///
/// Every load cancels the previous one, so a slow answer for an old query
/// never lands after the answer for a newer one.
#[derive(Clone)]
pub struct ListController {
    store: Store,
    search_debounce: Duration,
    state: Arc<Mutex<ViewState>>,
}

impl ListController {
    pub fn new(store: Store) -> Self {
        Self::with_debounce(store, DEFAULT_SEARCH_DEBOUNCE)
    }

    pub fn with_debounce(store: Store, search_debounce: Duration) -> Self {
        Self {
            store,
            search_debounce,
            state: Arc::new(Mutex::new(ViewState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ViewState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn query(&self) -> NoteQuery {
        self.lock().query.clone()
    }

    /// Fetch the current query, cancelling whatever this view fetched before.
    pub async fn load(&self) -> Result<Paginated<Note>, ClientError> {
        self.load_with(false).await
    }

    /// Like [`load`](Self::load) but skips fresh cached data.
    pub async fn refresh(&self) -> Result<Paginated<Note>, ClientError> {
        self.load_with(true).await
    }

    async fn load_with(&self, force_refresh: bool) -> Result<Paginated<Note>, ClientError> {
        let cancel = CancellationToken::new();
        let query = {
            let mut state = self.lock();
            if let Some(pending) = state.debounce.take() {
                pending.abort();
            }
            if let Some(previous) = state.in_flight.replace(cancel.clone()) {
                previous.cancel();
            }
            state.query.clone()
        };

        let options = FetchOptions {
            force_refresh,
            cancel: Some(cancel),
        };
        self.store.fetch_list(&query, options).await
    }

    /// Stop waiting for the current fetch, e.g. when the view goes away.
    pub fn cancel(&self) {
        let mut state = self.lock();
        if let Some(pending) = state.debounce.take() {
            pending.abort();
        }
        if let Some(previous) = state.in_flight.take() {
            previous.cancel();
        }
    }

    pub async fn set_page(&self, page: u32) -> Result<Paginated<Note>, ClientError> {
        self.lock().query.page = page.max(1);
        self.load().await
    }

    /// Change the page size. Goes back to page 1.
    pub async fn set_page_size(&self, page_size: u32) -> Result<Paginated<Note>, ClientError> {
        {
            let mut state = self.lock();
            state.query.page_size = page_size.max(1);
            state.query.page = 1;
        }
        self.load().await
    }

    /// Toggle the favorites-only filter. Goes back to page 1.
    pub async fn set_favorites_only(
        &self,
        favorites_only: bool,
    ) -> Result<Paginated<Note>, ClientError> {
        {
            let mut state = self.lock();
            state.query.favorites_only = favorites_only;
            state.query.page = 1;
        }
        self.load().await
    }

    /// Filter by tag id, or clear the filter. Goes back to page 1.
    pub async fn set_tag(&self, tag: Option<String>) -> Result<Paginated<Note>, ClientError> {
        {
            let mut state = self.lock();
            state.query.tag = tag;
            state.query.page = 1;
        }
        self.load().await
    }

    /// Presentation only: the cached list is shared by both modes.
    pub fn set_view_mode(&self, view_mode: ViewMode) {
        self.lock().query.view_mode = view_mode;
    }

    /// Record the search text and load it once typing pauses.
    ///
    /// Each call restarts the debounce window; only the text present when
    /// the window elapses is fetched. Failures surface as store events.
    pub fn set_search(&self, text: impl Into<String>) {
        let controller = self.clone();
        let delay = self.search_debounce;

        let mut state = self.lock();
        state.query.search = text.into();
        state.query.page = 1;
        state.search_generation += 1;
        let generation = state.search_generation;
        if let Some(pending) = state.debounce.take() {
            pending.abort();
        }
        state.debounce = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut state = controller.lock();
                if state.search_generation != generation {
                    return;
                }
                // Detach so the load below does not abort its own task.
                state.debounce = None;
            }
            if let Err(err) = controller.load().await {
                tracing::debug!(error = %err, "Debounced search load did not complete");
            }
        }));
    }
}
