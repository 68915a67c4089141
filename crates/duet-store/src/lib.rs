//! # duet-store
//!
//! Local backend for the Duet client: SQLite persistence for every
//! domain table plus an in-process change feed, together implementing
//! the collaborator traits from `duet_shared::backend`.
//!
//! In production those traits are backed by a managed remote service;
//! this crate is the stand-in used for local development and by the
//! test suite, which is why it enforces the same observable contract
//! (two-member cap, unique couple codes, couple-scoped push filtering).

pub mod backend;
pub mod couples;
pub mod database;
pub mod events;
pub mod feed;
pub mod memories;
pub mod migrations;
pub mod notes;
pub mod profiles;
pub mod session;

mod error;

pub use backend::LocalBackend;
pub use database::Database;
pub use error::StoreError;
pub use feed::ChangeFeed;
pub use session::LocalSession;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
