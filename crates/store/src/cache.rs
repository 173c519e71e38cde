//! Cache entries.
//!
//! Every entry carries an epoch that is bumped on each local write and each
//! invalidation. A request remembers the epoch it started under; when it
//! completes under a different epoch its result is handed to the waiters
//! but never written, so an older server answer cannot overwrite a newer
//! optimistic write or skip a pending invalidation.

use futures::future::{BoxFuture, Shared};
use tokio_util::sync::CancellationToken;

use notekeep_client::ClientError;

/// Outcome of a request, shared by every waiter.
pub(crate) type SharedResult<T> = Shared<BoxFuture<'static, Result<T, ClientError>>>;

/// A read-only view of a cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub data: Option<T>,
    pub fresh: bool,
}

/// The single request allowed per key at any time.
pub(crate) struct InFlight<T: Clone> {
    pub id: u64,
    /// Entry epoch when the request started.
    pub epoch: u64,
    pub cancel: CancellationToken,
    /// Callers still waiting. The request is aborted when this drops to 0
    /// through cancellation.
    pub waiters: usize,
    pub result: SharedResult<T>,
}

pub(crate) struct CacheEntry<T: Clone> {
    pub data: Option<T>,
    pub fresh: bool,
    pub epoch: u64,
    pub in_flight: Option<InFlight<T>>,
    /// Re-fetch once the current request settles.
    pub refetch_queued: bool,
}

impl<T: Clone> Default for CacheEntry<T> {
    fn default() -> Self {
        Self {
            data: None,
            fresh: false,
            epoch: 0,
            in_flight: None,
            refetch_queued: false,
        }
    }
}

impl<T: Clone> CacheEntry<T> {
    /// Cached data, if present and fresh.
    pub fn fresh_data(&self) -> Option<&T> {
        self.data.as_ref().filter(|_| self.fresh)
    }

    /// Replace the data. Bumps the epoch.
    pub fn write(&mut self, data: Option<T>, fresh: bool) {
        self.data = data;
        self.fresh = fresh;
        self.epoch += 1;
    }

    /// Mark stale while keeping the last-known data for display.
    pub fn invalidate(&mut self) {
        self.fresh = false;
        self.epoch += 1;
    }

    pub fn view(&self) -> Cached<T> {
        Cached {
            data: self.data.clone(),
            fresh: self.fresh,
        }
    }

    /// Record the state needed to undo a local write.
    pub fn snapshot(&self) -> Cached<T> {
        self.view()
    }

    /// Put back a snapshot. Bumps the epoch, so requests started while the
    /// optimistic data was visible are discarded as well.
    pub fn restore(&mut self, snapshot: Cached<T>) {
        self.write(snapshot.data, snapshot.fresh);
    }

    /// Whether a request with this id is the current one.
    pub fn is_current(&self, request_id: u64) -> bool {
        self.in_flight.as_ref().map(|f| f.id) == Some(request_id)
    }
}
