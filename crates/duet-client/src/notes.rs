//! Reactive cache over a couple's love notes.
//!
//! Notes are kept oldest-first, the order a chat view renders them.
//! The unread counter is never stored; it is derived from the cache on
//! demand, so replayed pushes and repeated read-marks cannot drift it.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use duet_shared::backend::{Backend, DataBackend, RealtimeBackend};
use duet_shared::{
    validate, CoupleId, DuetError, LoveNote, NewLoveNote, NoteChange, NoteId, Result, RowChange,
    UserId,
};

pub struct NoteStore {
    backend: Arc<dyn Backend>,
    cache: watch::Sender<Vec<LoveNote>>,
    attached: Mutex<Option<(CoupleId, UserId)>>,
    feed_task: Mutex<Option<JoinHandle<()>>>,
}

/// Apply one pushed change, keeping notes in `created_at` order.
/// Idempotent under replay, same contract as the event cache.
pub(crate) fn apply(cache: &mut Vec<LoveNote>, change: NoteChange) {
    match change {
        RowChange::Insert(note) | RowChange::Update(note) => {
            match cache.iter_mut().find(|n| n.id == note.id) {
                Some(slot) => *slot = note,
                None => cache.push(note),
            }
        }
        RowChange::Delete(id) => cache.retain(|n| n.id != id),
    }
    cache.sort_by(|a, b| a.created_at.cmp(&b.created_at));
}

impl NoteStore {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let (cache, _) = watch::channel(Vec::new());
        Self {
            backend,
            cache,
            attached: Mutex::new(None),
            feed_task: Mutex::new(None),
        }
    }

    /// Subscribe to the note cache.
    pub fn watch(&self) -> watch::Receiver<Vec<LoveNote>> {
        self.cache.subscribe()
    }

    /// The user the store is attached on behalf of, if any.
    pub fn attached_user(&self) -> Option<UserId> {
        self.attached.lock().ok().and_then(|g| *g).map(|(_, u)| u)
    }

    fn attachment(&self) -> Result<(CoupleId, UserId)> {
        self.attached
            .lock()
            .ok()
            .and_then(|guard| *guard)
            .ok_or(DuetError::NotFound)
    }

    fn stop_feed(&self) {
        if let Ok(mut slot) = self.feed_task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }

    /// Point the store at a couple on behalf of `user_id`, load the
    /// history, and follow pushed changes until detached.
    pub async fn attach(&self, couple_id: CoupleId, user_id: UserId) -> Result<()> {
        self.stop_feed();

        let mut sub = self.backend.subscribe_notes(couple_id).await?;
        let notes = self.backend.notes_for(couple_id).await?;
        info!(couple = %couple_id, count = notes.len(), "note store attached");
        self.cache.send_replace(notes);

        let cache = self.cache.clone();
        let task = tokio::spawn(async move {
            while let Some(change) = sub.recv().await {
                cache.send_modify(|notes| apply(notes, change));
            }
            debug!("note feed closed");
        });

        if let Ok(mut slot) = self.attached.lock() {
            *slot = Some((couple_id, user_id));
        }
        if let Ok(mut slot) = self.feed_task.lock() {
            *slot = Some(task);
        }
        Ok(())
    }

    pub fn detach(&self) {
        self.stop_feed();
        if let Ok(mut slot) = self.attached.lock() {
            *slot = None;
        }
        self.cache.send_replace(Vec::new());
    }

    /// Send a note to `to`.  The body is validated before any backend
    /// round trip; whitespace-only input never leaves the client.
    pub async fn send(&self, to: UserId, message: &str) -> Result<LoveNote> {
        validate::note_message(message)?;
        let (couple_id, from) = self.attachment()?;

        let note = self
            .backend
            .insert_note(NewLoveNote {
                couple_id,
                from_user_id: from,
                to_user_id: to,
                message: message.to_string(),
            })
            .await?;

        self.cache
            .send_modify(|notes| apply(notes, RowChange::Insert(note.clone())));
        Ok(note)
    }

    /// Mark one note read.
    ///
    /// Idempotent: if the cached row is already read, this returns
    /// without touching the backend at all.
    pub async fn mark_as_read(&self, id: NoteId) -> Result<()> {
        let already_read = self
            .cache
            .borrow()
            .iter()
            .find(|n| n.id == id)
            .is_some_and(|n| n.is_read);
        if already_read {
            return Ok(());
        }

        let read_at = Utc::now();
        self.backend.mark_note_read(id, read_at).await?;
        self.cache.send_modify(|notes| {
            if let Some(note) = notes.iter_mut().find(|n| n.id == id) {
                if !note.is_read {
                    note.is_read = true;
                    note.read_at = Some(read_at);
                }
            }
        });
        Ok(())
    }

    /// Mark every unread note addressed to the attached user.  Returns
    /// how many rows actually transitioned.
    pub async fn mark_all_read(&self) -> Result<u64> {
        let (couple_id, user_id) = self.attachment()?;

        let read_at = Utc::now();
        let count = self
            .backend
            .mark_all_notes_read(couple_id, user_id, read_at)
            .await?;

        self.cache.send_modify(|notes| {
            for note in notes.iter_mut() {
                if note.to_user_id == user_id && !note.is_read {
                    note.is_read = true;
                    note.read_at = Some(read_at);
                }
            }
        });
        Ok(count)
    }

    /// Delete a note.
    pub async fn remove(&self, id: NoteId) -> Result<()> {
        self.backend.delete_note(id).await?;
        self.cache
            .send_modify(|notes| apply(notes, RowChange::Delete(id)));
        Ok(())
    }

    /// Unread inbound notes for the attached user, derived from the
    /// cache.
    pub fn unread_count(&self) -> usize {
        let user_id = match self.attached.lock().ok().and_then(|g| *g) {
            Some((_, user_id)) => user_id,
            None => return 0,
        };
        self.cache
            .borrow()
            .iter()
            .filter(|n| n.to_user_id == user_id && !n.is_read)
            .count()
    }
}

impl Drop for NoteStore {
    fn drop(&mut self) {
        self.stop_feed();
    }
}
