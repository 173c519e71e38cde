//! Client-side cache of notes lists and details.
//!
//! [`Store`] sits between views and the REST client:
//!
//! - fetches return fresh cached data or go to the backend, with
//!   concurrent fetches of one key coalesced onto a single request;
//! - mutations are applied optimistically and rolled back on failure;
//! - live-update events invalidate and re-fetch what is in view.
//!
//! Changes are announced as [`StoreEvent`]s in the order they were applied.
//! [`ListController`] owns the query state of one list view.

pub mod cache;
pub mod controller;
pub mod events;
pub mod optimistic;
pub mod store;

pub use cache::Cached;
pub use controller::ListController;
pub use events::{Operation, StoreEvent, Subscription};
pub use store::{FetchOptions, Store};
