//! Reactive cache over the couple's photo-memory timeline.
//!
//! Memories change rarely, so there is no push subscription here; the
//! cache reloads on attach and tracks local writes.  Image blobs live
//! in the blob store and rows only carry their URL.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{info, warn};

use duet_shared::backend::{Backend, BlobStore, DataBackend};
use duet_shared::{
    validate, CoupleId, DuetError, Memory, MemoryId, MemoryPatch, NewMemory, Result, UserId,
};

pub struct MemoryStore {
    backend: Arc<dyn Backend>,
    cache: watch::Sender<Vec<Memory>>,
    attached: Mutex<Option<CoupleId>>,
}

fn upsert(cache: &mut Vec<Memory>, memory: Memory) {
    match cache.iter_mut().find(|m| m.id == memory.id) {
        Some(slot) => *slot = memory,
        None => cache.push(memory),
    }
    // Newest first, the order the timeline renders.
    cache.sort_by(|a, b| {
        b.memory_date
            .cmp(&a.memory_date)
            .then(b.created_at.cmp(&a.created_at))
    });
}

impl MemoryStore {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let (cache, _) = watch::channel(Vec::new());
        Self {
            backend,
            cache,
            attached: Mutex::new(None),
        }
    }

    pub fn watch(&self) -> watch::Receiver<Vec<Memory>> {
        self.cache.subscribe()
    }

    fn attached_couple(&self) -> Result<CoupleId> {
        self.attached
            .lock()
            .ok()
            .and_then(|guard| *guard)
            .ok_or(DuetError::NotFound)
    }

    /// Load the timeline for a couple.
    pub async fn attach(&self, couple_id: CoupleId) -> Result<()> {
        let memories = self.backend.memories_for(couple_id).await?;
        info!(couple = %couple_id, count = memories.len(), "memory store attached");
        self.cache.send_replace(memories);
        if let Ok(mut slot) = self.attached.lock() {
            *slot = Some(couple_id);
        }
        Ok(())
    }

    pub fn detach(&self) {
        if let Ok(mut slot) = self.attached.lock() {
            *slot = None;
        }
        self.cache.send_replace(Vec::new());
    }

    /// Refresh the timeline from the backend.
    pub async fn reload(&self) -> Result<()> {
        let couple_id = self.attached_couple()?;
        let memories = self.backend.memories_for(couple_id).await?;
        self.cache.send_replace(memories);
        Ok(())
    }

    /// Create a memory without an image.
    pub async fn create(&self, created_by: UserId, memory: NewMemory) -> Result<Memory> {
        validate::new_memory(&memory)?;
        let couple_id = self.attached_couple()?;

        let memory = self
            .backend
            .insert_memory(couple_id, created_by, memory)
            .await?;
        self.cache
            .send_modify(|cache| upsert(cache, memory.clone()));
        Ok(memory)
    }

    /// Create a memory with an image: upload the blob first, then
    /// insert the row pointing at it.
    pub async fn create_with_image(
        &self,
        created_by: UserId,
        mut memory: NewMemory,
        image: Vec<u8>,
    ) -> Result<Memory> {
        validate::new_memory(&memory)?;
        let couple_id = self.attached_couple()?;

        let key = format!("memories/{}/{}.jpg", couple_id, MemoryId::new());
        let url = self.backend.upload(image, &key).await?;
        memory.image_url = Some(url);

        let memory = self
            .backend
            .insert_memory(couple_id, created_by, memory)
            .await?;
        self.cache
            .send_modify(|cache| upsert(cache, memory.clone()));
        Ok(memory)
    }

    /// Apply a partial update to one memory.
    pub async fn update(&self, id: MemoryId, patch: MemoryPatch) -> Result<Memory> {
        if let Some(title) = &patch.title {
            validate::event_title(title)?;
        }

        // If the image is being replaced or cleared, drop the old blob.
        // Best-effort only; an orphaned blob is not an error.
        if let Some(new_image) = patch.image_url.as_ref() {
            let old = self.backend.memory(id).await?;
            if let Some(old_url) = old.image_url {
                if new_image.as_deref() != Some(old_url.as_str()) {
                    if let Err(err) = self.backend.delete(&old_url).await {
                        warn!(%err, "stale memory image not deleted");
                    }
                }
            }
        }

        let memory = self.backend.update_memory(id, patch).await?;
        self.cache
            .send_modify(|cache| upsert(cache, memory.clone()));
        Ok(memory)
    }

    /// Delete a memory and, best-effort, its image blob.
    pub async fn remove(&self, id: MemoryId) -> Result<()> {
        let memory = self.backend.memory(id).await?;
        self.backend.delete_memory(id).await?;

        if let Some(url) = memory.image_url {
            if let Err(err) = self.backend.delete(&url).await {
                warn!(%err, "memory image not deleted");
            }
        }
        self.cache.send_modify(|cache| cache.retain(|m| m.id != id));
        Ok(())
    }
}
