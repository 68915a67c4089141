//! Collaborator interfaces the client core consumes.
//!
//! Authentication, relational data access with row-level authorization,
//! the push/subscribe channel, blob storage, and the notification
//! permission gate are all external services.  The core talks to them
//! exclusively through these traits and never bypasses them.
//!
//! `duet-store` ships a local implementation backed by SQLite and
//! in-process broadcast channels, which is what the test suite runs
//! against.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::DuetError;
use crate::models::{
    AuthState, Couple, Event, EventChange, EventPatch, LoveNote, Memory, MemoryPatch, NewEvent,
    NewLoveNote, NewMemory, NoteChange, TypingSignal, UserProfile,
};
use crate::types::{CoupleCode, CoupleId, EventId, MemoryId, NoteId, UserId};
use crate::Result;

// ---------------------------------------------------------------------------
// Subscription handle
// ---------------------------------------------------------------------------

/// A live push subscription delivering items of type `T`.
///
/// The handle owns the forwarding task behind the subscription; calling
/// [`Subscription::close`] (or dropping the handle) aborts it, so
/// teardown is deterministic rather than dependent on channel garbage
/// collection.  A closed subscription still drains items already
/// buffered.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::Receiver<T>,
    task: Option<JoinHandle<()>>,
}

impl<T> Subscription<T> {
    pub fn new(rx: mpsc::Receiver<T>, task: JoinHandle<()>) -> Self {
        Self {
            rx,
            task: Some(task),
        }
    }

    /// Receive the next pushed item, or `None` once the subscription
    /// is closed and drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Stop the subscription.  Idempotent.
    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.rx.close();
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Identity / session
// ---------------------------------------------------------------------------

/// Source of the current authenticated identity.
///
/// Session issuance (sign-in, sign-up, token refresh) lives entirely in
/// the collaborator; the core only observes `{user, ready}` and its
/// transitions.
pub trait SessionProvider: Send + Sync {
    /// Watch channel carrying the current [`AuthState`].  `ready` is
    /// false until the collaborator's initial session check completes.
    fn auth_state(&self) -> watch::Receiver<AuthState>;
}

// ---------------------------------------------------------------------------
// Relational data access
// ---------------------------------------------------------------------------

/// Typed row access for the tables the core owns views over.
///
/// Which rows a given identity may read or write is enforced entirely
/// on this side of the boundary.
#[async_trait]
pub trait DataBackend: Send + Sync {
    // -- profiles --

    /// Load a profile by identity.  `NotFound` if none exists.
    async fn profile(&self, id: UserId) -> Result<UserProfile>;

    /// Load the one other profile sharing `couple_id`, if any.
    async fn partner_of(&self, couple_id: CoupleId, user_id: UserId)
        -> Result<Option<UserProfile>>;

    /// All profiles currently linked to a couple (0, 1 or 2 rows).
    async fn couple_members(&self, couple_id: CoupleId) -> Result<Vec<UserProfile>>;

    /// Point a profile at a couple, or unlink it with `None`.
    ///
    /// Backends enforcing the two-member cap reject a third link with
    /// [`DuetError::CoupleFull`].
    async fn link_profile(&self, user_id: UserId, couple_id: Option<CoupleId>) -> Result<()>;

    // -- couples --

    async fn couple(&self, id: CoupleId) -> Result<Couple>;

    /// Look up a couple by its (already normalized) invite code.
    async fn couple_by_code(&self, code: &CoupleCode) -> Result<Option<Couple>>;

    /// Produce an invite code guaranteed unique among stored couples.
    async fn generate_couple_code(&self) -> Result<CoupleCode>;

    async fn insert_couple(
        &self,
        code: CoupleCode,
        anniversary_date: Option<NaiveDate>,
    ) -> Result<Couple>;

    async fn set_anniversary(
        &self,
        id: CoupleId,
        anniversary_date: Option<NaiveDate>,
    ) -> Result<Couple>;

    // -- events --

    /// All events for a couple, ordered by `event_date` ascending.
    async fn events_for(&self, couple_id: CoupleId) -> Result<Vec<Event>>;

    async fn insert_event(
        &self,
        couple_id: CoupleId,
        created_by: UserId,
        event: NewEvent,
    ) -> Result<Event>;

    /// Apply a partial update.  `NotFound` if the id is unknown.
    async fn update_event(&self, id: EventId, patch: EventPatch) -> Result<Event>;

    async fn delete_event(&self, id: EventId) -> Result<()>;

    // -- love notes --

    /// All notes for a couple, ordered by `created_at` ascending.
    async fn notes_for(&self, couple_id: CoupleId) -> Result<Vec<LoveNote>>;

    async fn insert_note(&self, note: NewLoveNote) -> Result<LoveNote>;

    /// Set the read pair on one note.  Marking an already-read note is
    /// a no-op on the stored row.
    async fn mark_note_read(&self, id: NoteId, read_at: DateTime<Utc>) -> Result<()>;

    /// Mark every unread note addressed to `to_user` within the
    /// couple.  Returns the number of rows that actually transitioned.
    async fn mark_all_notes_read(
        &self,
        couple_id: CoupleId,
        to_user: UserId,
        read_at: DateTime<Utc>,
    ) -> Result<u64>;

    async fn delete_note(&self, id: NoteId) -> Result<()>;

    // -- memories --

    /// All memories for a couple, ordered by `memory_date` descending.
    async fn memories_for(&self, couple_id: CoupleId) -> Result<Vec<Memory>>;

    async fn memory(&self, id: MemoryId) -> Result<Memory>;

    async fn insert_memory(
        &self,
        couple_id: CoupleId,
        created_by: UserId,
        memory: NewMemory,
    ) -> Result<Memory>;

    async fn update_memory(&self, id: MemoryId, patch: MemoryPatch) -> Result<Memory>;

    async fn delete_memory(&self, id: MemoryId) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Push / subscribe
// ---------------------------------------------------------------------------

/// Change notifications scoped to one couple id, plus the ephemeral
/// typing broadcast.
#[async_trait]
pub trait RealtimeBackend: Send + Sync {
    /// Row changes on `events`, filtered to the couple.
    async fn subscribe_events(&self, couple_id: CoupleId) -> Result<Subscription<EventChange>>;

    /// Row changes on `love_notes`, filtered to the couple.
    async fn subscribe_notes(&self, couple_id: CoupleId) -> Result<Subscription<NoteChange>>;

    /// Fire-and-forget typing broadcast.  Delivery is best-effort and
    /// never retried.
    async fn broadcast_typing(&self, couple_id: CoupleId, signal: TypingSignal) -> Result<()>;

    /// Typing signals on the couple's channel, including the caller's
    /// own (receivers filter out self).
    async fn subscribe_typing(&self, couple_id: CoupleId) -> Result<Subscription<TypingSignal>>;
}

// ---------------------------------------------------------------------------
// Blob storage
// ---------------------------------------------------------------------------

/// Image blob storage for the memories timeline.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key` and return a public URL.
    async fn upload(&self, bytes: Vec<u8>, key: &str) -> Result<String>;

    /// Delete a previously uploaded blob by its public URL.
    async fn delete(&self, url: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// System notifications
// ---------------------------------------------------------------------------

/// Permission-gated system notifications.  Never required for
/// correctness; callers skip silently when permission is missing.
#[async_trait]
pub trait NotificationGate: Send + Sync {
    fn is_granted(&self) -> bool;

    /// Prompt the user for permission; returns the resulting grant.
    async fn request_permission(&self) -> bool;

    /// Display a notification.  Best-effort.
    fn notify(&self, title: &str, body: &str);
}

/// Everything a full backend provides.  Blanket-implemented for any
/// type carrying all three capabilities, so stores can share one
/// `Arc<dyn Backend>`.
pub trait Backend: DataBackend + RealtimeBackend + BlobStore {}

impl<T: DataBackend + RealtimeBackend + BlobStore> Backend for T {}

/// Errors from a backing store, mapped into the shared taxonomy at the
/// boundary.
pub fn backend_err<E: std::fmt::Display>(err: E) -> DuetError {
    DuetError::Backend(err.to_string())
}
