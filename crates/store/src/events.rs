//! Store notifications and callback subscriptions.

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use notekeep_core::error::ErrorRecord;
use notekeep_core::query::ListKey;
use notekeep_core::types::NoteId;

/// Which store operation produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    FetchList,
    FetchDetail,
    Create,
    Update,
    Delete,
}

/// A change announced by the store.
///
/// Events carry keys, not data; read the current value back from the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// A list entry's data changed.
    ListChanged { key: ListKey },
    /// A detail entry's data changed.
    DetailChanged { id: NoteId },
    /// A detail entry was dropped because its note is gone.
    DetailRemoved { id: NoteId },
    /// The selected note changed.
    SelectionChanged { selected: Option<NoteId> },
    /// An operation failed. Cancellations are never reported.
    Error {
        operation: Operation,
        error: ErrorRecord,
    },
}

/// A callback subscription. Dropping it, or calling
/// [`unsubscribe`](Self::unsubscribe), stops delivery.
pub struct Subscription {
    cancel: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Forward every event from `rx` to `callback`, in order, on a
    /// dedicated task.
    pub(crate) fn spawn<F>(mut rx: broadcast::Receiver<StoreEvent>, callback: F) -> Self
    where
        F: Fn(StoreEvent) + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        let task_handle = tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    biased;
                    _ = task_cancel.cancelled() => break,
                    received = rx.recv() => received,
                };
                match received {
                    Ok(event) => callback(event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Store subscriber lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Self {
            cancel,
            task_handle: Some(task_handle),
        }
    }

    /// Stop delivery and wait for the forwarding task to exit. No callback
    /// runs after this returns.
    pub async fn unsubscribe(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.task_handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
