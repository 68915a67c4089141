//! Client core for Duet: reactive stores over the backend traits in
//! `duet-shared`.
//!
//! Each store owns a [`tokio::sync::watch`] channel carrying its
//! current state; UI layers subscribe to the receivers and re-render on
//! change.  [`client::DuetClient`] wires the stores together and keeps
//! them attached to whatever couple the session resolves to.

pub mod client;
pub mod config;
pub mod derived;
pub mod events;
pub mod memories;
pub mod notes;
pub mod presence;
pub mod session;
pub mod telemetry;

pub use client::DuetClient;
pub use config::ClientConfig;
pub use events::EventStore;
pub use memories::MemoryStore;
pub use notes::NoteStore;
pub use presence::PresenceChannel;
pub use session::{CoupleSession, SessionSnapshot, SessionState};

pub use duet_shared::{DuetError, Result};
