//! Canonical row models for every table the client touches.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can cross
//! the backend boundary and be handed to a UI layer as-is.  Field names
//! are the single source of truth; backends that speak another spelling
//! normalize here and nowhere else.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CoupleCode, CoupleId, EventId, EventKind, MemoryId, NoteId, UserId};

// ---------------------------------------------------------------------------
// Couple
// ---------------------------------------------------------------------------

/// A two-member relationship, identified by a unique short invite code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Couple {
    pub id: CoupleId,
    /// 6-character unique invite code, uppercase.
    pub couple_code: CoupleCode,
    /// The date the couple counts from; drives the days-together view.
    pub anniversary_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// User profile
// ---------------------------------------------------------------------------

/// App-specific data for one identity.  `couple_id` is null until the
/// user creates or joins a couple; at most two profiles ever share a
/// couple id (enforced by the backend at link time).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub couple_id: Option<CoupleId>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A dated calendar entry owned collectively by a couple.  Either
/// member may create, edit, or delete any event of their couple.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    pub id: EventId,
    pub couple_id: CoupleId,
    pub title: String,
    pub description: Option<String>,
    pub event_date: NaiveDate,
    pub event_time: Option<NaiveTime>,
    pub event_type: EventKind,
    /// Display color, `#RRGGBB`.
    pub color: String,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating an event.  The backend assigns id and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub event_date: NaiveDate,
    pub event_time: Option<NaiveTime>,
    pub event_type: EventKind,
    pub color: String,
}

/// Partial update for an event; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub event_date: Option<NaiveDate>,
    pub event_time: Option<Option<NaiveTime>>,
    pub event_type: Option<EventKind>,
    pub color: Option<String>,
}

// ---------------------------------------------------------------------------
// Love note
// ---------------------------------------------------------------------------

/// A direct text message between the two members of a couple.
///
/// Immutable once created except for the read-state pair, which
/// transitions `false -> true` exactly once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoveNote {
    pub id: NoteId,
    pub couple_id: CoupleId,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub message: String,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Input for sending a love note.  The backend assigns id and
/// `created_at`; `is_read` starts false.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLoveNote {
    pub couple_id: CoupleId,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

/// A photo memory in the couple's shared timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Memory {
    pub id: MemoryId,
    pub couple_id: CoupleId,
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub memory_date: NaiveDate,
    pub category: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMemory {
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub memory_date: NaiveDate,
    pub category: Option<String>,
}

/// Partial update for a memory; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub image_url: Option<Option<String>>,
    pub memory_date: Option<NaiveDate>,
    pub category: Option<Option<String>>,
}

// ---------------------------------------------------------------------------
// Ephemeral / session types
// ---------------------------------------------------------------------------

/// Ephemeral typing indicator, broadcast on a per-couple channel and
/// never persisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypingSignal {
    pub user_id: UserId,
    pub is_typing: bool,
}

/// The identity the auth collaborator reports for the current session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthUser {
    pub id: UserId,
    pub email: String,
}

/// Session state as published by the auth collaborator.
///
/// `ready` stays false until the initial session check completes; no
/// conclusion about "signed out" may be drawn before that.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    pub user: Option<AuthUser>,
    pub ready: bool,
}

// ---------------------------------------------------------------------------
// Realtime change events
// ---------------------------------------------------------------------------

/// A discrete change pushed for a watched table, carrying the full row
/// for inserts and updates and only the id for deletes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowChange<T, Id> {
    Insert(T),
    Update(T),
    Delete(Id),
}

pub type EventChange = RowChange<Event, EventId>;
pub type NoteChange = RowChange<LoveNote, NoteId>;
