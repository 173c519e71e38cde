//! Shared building blocks for the notekeep data layer.
//!
//! Holds the wire data model, list query state, the user-facing error
//! record, environment/config resolution, the backoff state machines used by
//! both the REST client and the live-update client, and the live message
//! codec. Nothing in this crate performs I/O.

pub mod backoff;
pub mod config;
pub mod env;
pub mod error;
pub mod messages;
pub mod query;
pub mod types;
