//! # duet-shared
//!
//! Domain types shared by every crate in the workspace: identifier
//! newtypes, the canonical row models for couples / profiles / events /
//! love notes / memories, input validation, the common error taxonomy,
//! and the collaborator traits the client core consumes.
//!
//! Rows cross the backend boundary exactly once, as these structs, with
//! a single snake_case field spelling.  Nothing deeper in the client
//! ever inspects raw payloads.

pub mod backend;
pub mod constants;
pub mod error;
pub mod models;
pub mod types;
pub mod validate;

pub use error::DuetError;
pub use models::*;
pub use types::{typing_topic, CoupleCode, CoupleId, EventId, EventKind, MemoryId, NoteId, UserId};

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, DuetError>;
