//! REST client for the notes backend.
//!
//! [`ApiClient`] wraps the `/notes` endpoints with a per-request timeout,
//! bounded retry on transient failures, cancellation, and normalization of
//! every failure into a [`ClientError`]. The [`NotesApi`] trait is the seam
//! the store is written against.

pub mod api;
pub mod error;

pub use api::{ApiClient, NotesApi};
pub use error::{ClientBuildError, ClientError};
