//! [`LocalBackend`] -- the collaborator traits implemented over the
//! local SQLite database, the in-process [`ChangeFeed`], and a blob
//! directory on disk.
//!
//! Writes publish to the feed only after the database has confirmed
//! them, so subscribers never observe a row the store would not return
//! from a fresh load.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;
use tracing::info;

use duet_shared::backend::{backend_err, BlobStore, DataBackend, RealtimeBackend, Subscription};
use duet_shared::validate;
use duet_shared::{
    Couple, CoupleCode, CoupleId, DuetError, Event, EventChange, EventId, EventPatch, LoveNote,
    Memory, MemoryId, MemoryPatch, NewEvent, NewLoveNote, NewMemory, NoteChange, NoteId,
    RowChange, TypingSignal, UserId, UserProfile,
};

use crate::database::Database;
use crate::feed::ChangeFeed;

/// How many random codes to try before giving up on a unique one.
const MAX_CODE_ATTEMPTS: usize = 16;

type Result<T> = std::result::Result<T, DuetError>;

/// Local implementation of the full backend surface.
pub struct LocalBackend {
    db: Arc<Mutex<Database>>,
    feed: ChangeFeed,
    blob_dir: PathBuf,
}

impl LocalBackend {
    /// Open the backend over an explicit database path and blob
    /// directory (tests, custom layouts).
    pub fn open_at(db_path: &std::path::Path, blob_dir: PathBuf) -> crate::Result<Self> {
        let db = Database::open_at(db_path)?;
        std::fs::create_dir_all(&blob_dir)?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            feed: ChangeFeed::new(),
            blob_dir,
        })
    }

    /// Seed a profile row for a fresh identity.
    ///
    /// In production the auth collaborator creates the profile during
    /// sign-up; locally somebody has to do it.
    pub async fn register_profile(&self, id: UserId, name: &str) -> Result<UserProfile> {
        validate::profile_name(name)?;
        let profile = UserProfile {
            id,
            name: name.to_string(),
            couple_id: None,
            avatar_url: None,
            created_at: Utc::now(),
        };
        self.db.lock().await.insert_profile(&profile)?;
        Ok(profile)
    }

    /// Direct access to the change feed (publishing side), used by
    /// tests to simulate pushes from another device.
    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }
}

#[async_trait]
impl DataBackend for LocalBackend {
    // -- profiles --

    async fn profile(&self, id: UserId) -> Result<UserProfile> {
        Ok(self.db.lock().await.get_profile(id)?)
    }

    async fn partner_of(
        &self,
        couple_id: CoupleId,
        user_id: UserId,
    ) -> Result<Option<UserProfile>> {
        Ok(self.db.lock().await.get_partner(couple_id, user_id)?)
    }

    async fn couple_members(&self, couple_id: CoupleId) -> Result<Vec<UserProfile>> {
        Ok(self.db.lock().await.list_couple_members(couple_id)?)
    }

    async fn link_profile(&self, user_id: UserId, couple_id: Option<CoupleId>) -> Result<()> {
        let db = self.db.lock().await;

        // The two-member cap is enforced here, inside the same lock as
        // the link write, standing in for the remote schema constraint.
        if let Some(cid) = couple_id {
            let members = db.list_couple_members(cid)?;
            if members.len() >= 2 && !members.iter().any(|m| m.id == user_id) {
                return Err(DuetError::CoupleFull);
            }
        }

        db.set_profile_couple(user_id, couple_id)?;
        Ok(())
    }

    // -- couples --

    async fn couple(&self, id: CoupleId) -> Result<Couple> {
        Ok(self.db.lock().await.get_couple(id)?)
    }

    async fn couple_by_code(&self, code: &CoupleCode) -> Result<Option<Couple>> {
        Ok(self.db.lock().await.get_couple_by_code(code)?)
    }

    async fn generate_couple_code(&self) -> Result<CoupleCode> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = CoupleCode::generate(&mut rand::thread_rng());
            let exists = self.db.lock().await.couple_code_exists(&code)?;
            if !exists {
                return Ok(code);
            }
        }
        Err(DuetError::backend("could not generate a unique couple code"))
    }

    async fn insert_couple(
        &self,
        code: CoupleCode,
        anniversary_date: Option<NaiveDate>,
    ) -> Result<Couple> {
        let couple = Couple {
            id: CoupleId::new(),
            couple_code: code,
            anniversary_date,
            created_at: Utc::now(),
        };
        self.db.lock().await.insert_couple(&couple)?;
        info!(couple = %couple.id, code = %couple.couple_code, "couple created");
        Ok(couple)
    }

    async fn set_anniversary(
        &self,
        id: CoupleId,
        anniversary_date: Option<NaiveDate>,
    ) -> Result<Couple> {
        Ok(self
            .db
            .lock()
            .await
            .update_couple_anniversary(id, anniversary_date)?)
    }

    // -- events --

    async fn events_for(&self, couple_id: CoupleId) -> Result<Vec<Event>> {
        Ok(self.db.lock().await.list_events_for_couple(couple_id)?)
    }

    async fn insert_event(
        &self,
        couple_id: CoupleId,
        created_by: UserId,
        event: NewEvent,
    ) -> Result<Event> {
        let now = Utc::now();
        let event = Event {
            id: EventId::new(),
            couple_id,
            title: event.title,
            description: event.description,
            event_date: event.event_date,
            event_time: event.event_time,
            event_type: event.event_type,
            color: event.color,
            created_by,
            created_at: now,
            updated_at: now,
        };
        self.db.lock().await.insert_event(&event)?;
        self.feed
            .publish_event(couple_id, RowChange::Insert(event.clone()));
        Ok(event)
    }

    async fn update_event(&self, id: EventId, patch: EventPatch) -> Result<Event> {
        let event = self.db.lock().await.update_event(id, &patch)?;
        self.feed
            .publish_event(event.couple_id, RowChange::Update(event.clone()));
        Ok(event)
    }

    async fn delete_event(&self, id: EventId) -> Result<()> {
        let db = self.db.lock().await;
        let event = db.get_event(id)?;
        db.delete_event(id)?;
        self.feed
            .publish_event(event.couple_id, RowChange::Delete(id));
        Ok(())
    }

    // -- love notes --

    async fn notes_for(&self, couple_id: CoupleId) -> Result<Vec<LoveNote>> {
        Ok(self.db.lock().await.list_notes_for_couple(couple_id)?)
    }

    async fn insert_note(&self, note: NewLoveNote) -> Result<LoveNote> {
        let note = LoveNote {
            id: NoteId::new(),
            couple_id: note.couple_id,
            from_user_id: note.from_user_id,
            to_user_id: note.to_user_id,
            message: note.message,
            is_read: false,
            read_at: None,
            created_at: Utc::now(),
        };
        self.db.lock().await.insert_note(&note)?;
        self.feed
            .publish_note(note.couple_id, RowChange::Insert(note.clone()));
        Ok(note)
    }

    async fn mark_note_read(&self, id: NoteId, read_at: DateTime<Utc>) -> Result<()> {
        let db = self.db.lock().await;
        let note = db.get_note(id)?;
        if note.is_read {
            return Ok(());
        }
        db.mark_note_read(id, read_at)?;
        let fresh = db.get_note(id)?;
        self.feed
            .publish_note(fresh.couple_id, RowChange::Update(fresh));
        Ok(())
    }

    async fn mark_all_notes_read(
        &self,
        couple_id: CoupleId,
        to_user: UserId,
        read_at: DateTime<Utc>,
    ) -> Result<u64> {
        let db = self.db.lock().await;
        let unread = db.list_unread_notes(couple_id, to_user)?;
        let count = db.mark_all_notes_read(couple_id, to_user, read_at)?;
        for note in unread {
            let fresh = db.get_note(note.id)?;
            self.feed.publish_note(couple_id, RowChange::Update(fresh));
        }
        Ok(count)
    }

    async fn delete_note(&self, id: NoteId) -> Result<()> {
        let db = self.db.lock().await;
        let note = db.get_note(id)?;
        db.delete_note(id)?;
        self.feed.publish_note(note.couple_id, RowChange::Delete(id));
        Ok(())
    }

    // -- memories --

    async fn memories_for(&self, couple_id: CoupleId) -> Result<Vec<Memory>> {
        Ok(self.db.lock().await.list_memories_for_couple(couple_id)?)
    }

    async fn memory(&self, id: MemoryId) -> Result<Memory> {
        Ok(self.db.lock().await.get_memory(id)?)
    }

    async fn insert_memory(
        &self,
        couple_id: CoupleId,
        created_by: UserId,
        memory: NewMemory,
    ) -> Result<Memory> {
        let memory = Memory {
            id: MemoryId::new(),
            couple_id,
            title: memory.title,
            description: memory.description,
            image_url: memory.image_url,
            memory_date: memory.memory_date,
            category: memory.category,
            created_by,
            created_at: Utc::now(),
        };
        self.db.lock().await.insert_memory(&memory)?;
        Ok(memory)
    }

    async fn update_memory(&self, id: MemoryId, patch: MemoryPatch) -> Result<Memory> {
        Ok(self.db.lock().await.update_memory(id, &patch)?)
    }

    async fn delete_memory(&self, id: MemoryId) -> Result<()> {
        let db = self.db.lock().await;
        db.get_memory(id)?;
        db.delete_memory(id)?;
        Ok(())
    }
}

#[async_trait]
impl RealtimeBackend for LocalBackend {
    async fn subscribe_events(&self, couple_id: CoupleId) -> Result<Subscription<EventChange>> {
        Ok(self.feed.subscribe_events(couple_id))
    }

    async fn subscribe_notes(&self, couple_id: CoupleId) -> Result<Subscription<NoteChange>> {
        Ok(self.feed.subscribe_notes(couple_id))
    }

    async fn broadcast_typing(&self, couple_id: CoupleId, signal: TypingSignal) -> Result<()> {
        self.feed.publish_typing(couple_id, signal);
        Ok(())
    }

    async fn subscribe_typing(&self, couple_id: CoupleId) -> Result<Subscription<TypingSignal>> {
        Ok(self.feed.subscribe_typing(couple_id))
    }
}

#[async_trait]
impl BlobStore for LocalBackend {
    async fn upload(&self, bytes: Vec<u8>, key: &str) -> Result<String> {
        let path = self.blob_dir.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(backend_err)?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(backend_err)?;
        Ok(format!("file://{}", path.display()))
    }

    async fn delete(&self, url: &str) -> Result<()> {
        let path = url
            .strip_prefix("file://")
            .ok_or_else(|| DuetError::validation("not a local blob url"))?;
        tokio::fs::remove_file(path)
            .await
            .map_err(backend_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_backend() -> (tempfile::TempDir, LocalBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend =
            LocalBackend::open_at(&dir.path().join("test.db"), dir.path().join("blobs")).unwrap();
        (dir, backend)
    }

    #[tokio::test]
    async fn register_profile_validates_the_name() {
        let (_dir, backend) = test_backend();

        assert!(matches!(
            backend.register_profile(UserId::new(), "J").await,
            Err(DuetError::Validation(_))
        ));
        assert!(matches!(
            backend
                .register_profile(UserId::new(), &"n".repeat(101))
                .await,
            Err(DuetError::Validation(_))
        ));
        backend.register_profile(UserId::new(), "Jo").await.unwrap();
    }

    #[tokio::test]
    async fn two_member_cap_enforced() {
        let (_dir, backend) = test_backend();

        let (a, b, c) = (UserId::new(), UserId::new(), UserId::new());
        backend.register_profile(a, "Ana").await.unwrap();
        backend.register_profile(b, "Ben").await.unwrap();
        backend.register_profile(c, "Caz").await.unwrap();

        let code = backend.generate_couple_code().await.unwrap();
        let couple = backend.insert_couple(code, None).await.unwrap();

        backend.link_profile(a, Some(couple.id)).await.unwrap();
        backend.link_profile(b, Some(couple.id)).await.unwrap();

        assert!(matches!(
            backend.link_profile(c, Some(couple.id)).await,
            Err(DuetError::CoupleFull)
        ));

        // Re-linking an existing member is not a third member.
        backend.link_profile(a, Some(couple.id)).await.unwrap();
    }

    #[tokio::test]
    async fn generated_codes_are_unique() {
        let (_dir, backend) = test_backend();

        let first = backend.generate_couple_code().await.unwrap();
        backend.insert_couple(first.clone(), None).await.unwrap();

        let second = backend.generate_couple_code().await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn insert_note_reaches_subscribers() {
        let (_dir, backend) = test_backend();

        let (a, b) = (UserId::new(), UserId::new());
        let code = backend.generate_couple_code().await.unwrap();
        let couple = backend.insert_couple(code, None).await.unwrap();

        let mut sub = backend.subscribe_notes(couple.id).await.unwrap();

        let sent = backend
            .insert_note(NewLoveNote {
                couple_id: couple.id,
                from_user_id: a,
                to_user_id: b,
                message: "hello".into(),
            })
            .await
            .unwrap();

        match sub.recv().await {
            Some(RowChange::Insert(note)) => assert_eq!(note.id, sent.id),
            other => panic!("unexpected delivery: {other:?}"),
        }
    }

    #[tokio::test]
    async fn blob_round_trip() {
        let (_dir, backend) = test_backend();

        let url = backend
            .upload(b"image-bytes".to_vec(), "memories/a.jpg")
            .await
            .unwrap();
        assert!(url.starts_with("file://"));

        backend.delete(&url).await.unwrap();
        assert!(backend.delete(&url).await.is_err());
    }
}
