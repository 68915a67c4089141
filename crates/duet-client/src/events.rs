//! Reactive cache over a couple's calendar events.
//!
//! The cache holds every event of the attached couple, sorted by
//! `event_date` then `created_at`.  Pushed row changes from the backend
//! are applied with [`apply`], which is idempotent: replaying a change
//! (the local echo of our own write arriving as a push, a reconnect
//! re-delivering a burst) leaves the cache unchanged.

use std::sync::{Arc, Mutex};

use chrono::{Datelike, NaiveDate};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use duet_shared::backend::{Backend, DataBackend, RealtimeBackend};
use duet_shared::{
    validate, CoupleId, DuetError, Event, EventChange, EventId, EventPatch, NewEvent, Result,
    RowChange, UserId,
};

use crate::derived;

pub struct EventStore {
    backend: Arc<dyn Backend>,
    cache: watch::Sender<Vec<Event>>,
    attached: Mutex<Option<CoupleId>>,
    feed_task: Mutex<Option<JoinHandle<()>>>,
}

/// Apply one pushed change to the cache, keeping it sorted.
///
/// Insert and update are both an upsert by id; deleting an id that is
/// not present is a no-op.
pub(crate) fn apply(cache: &mut Vec<Event>, change: EventChange) {
    match change {
        RowChange::Insert(event) | RowChange::Update(event) => {
            match cache.iter_mut().find(|e| e.id == event.id) {
                Some(slot) => *slot = event,
                None => cache.push(event),
            }
        }
        RowChange::Delete(id) => cache.retain(|e| e.id != id),
    }
    cache.sort_by(|a, b| {
        a.event_date
            .cmp(&b.event_date)
            .then(a.created_at.cmp(&b.created_at))
    });
}

impl EventStore {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let (cache, _) = watch::channel(Vec::new());
        Self {
            backend,
            cache,
            attached: Mutex::new(None),
            feed_task: Mutex::new(None),
        }
    }

    /// Subscribe to the event cache.
    pub fn watch(&self) -> watch::Receiver<Vec<Event>> {
        self.cache.subscribe()
    }

    fn attached_couple(&self) -> Result<CoupleId> {
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

    /// Point the store at a couple: load its events, then keep the
    /// cache in sync with pushed changes until detached.
    pub async fn attach(&self, couple_id: CoupleId) -> Result<()> {
        self.stop_feed();

        // Subscribe before the initial load so a write landing in
        // between is not lost; replaying it over the loaded snapshot
        // is harmless.
        let mut sub = self.backend.subscribe_events(couple_id).await?;
        let events = self.backend.events_for(couple_id).await?;
        info!(couple = %couple_id, count = events.len(), "event store attached");
        self.cache.send_replace(events);

        let cache = self.cache.clone();
        let task = tokio::spawn(async move {
            while let Some(change) = sub.recv().await {
                cache.send_modify(|events| apply(events, change));
            }
            debug!("event feed closed");
        });

        if let Ok(mut slot) = self.attached.lock() {
            *slot = Some(couple_id);
        }
        if let Ok(mut slot) = self.feed_task.lock() {
            *slot = Some(task);
        }
        Ok(())
    }

    /// Drop the subscription and clear the cache.
    pub fn detach(&self) {
        self.stop_feed();
        if let Ok(mut slot) = self.attached.lock() {
            *slot = None;
        }
        self.cache.send_replace(Vec::new());
    }

    /// Create an event for the attached couple.
    ///
    /// The created row lands in the cache before this returns; the
    /// pushed echo of the same insert replays harmlessly.
    pub async fn create(&self, created_by: UserId, event: NewEvent) -> Result<Event> {
        validate::new_event(&event)?;
        let couple_id = self.attached_couple()?;

        let event = self.backend.insert_event(couple_id, created_by, event).await?;
        self.cache
            .send_modify(|events| apply(events, RowChange::Insert(event.clone())));
        Ok(event)
    }

    /// Apply a partial update to one event.
    pub async fn update(&self, id: EventId, patch: EventPatch) -> Result<Event> {
        if let Some(title) = &patch.title {
            validate::event_title(title)?;
        }
        if let Some(color) = &patch.color {
            validate::hex_color(color)?;
        }

        let event = self.backend.update_event(id, patch).await?;
        self.cache
            .send_modify(|events| apply(events, RowChange::Update(event.clone())));
        Ok(event)
    }

    /// Delete an event.  The cache drops the row once the backend has
    /// confirmed the delete.
    pub async fn remove(&self, id: EventId) -> Result<()> {
        self.backend.delete_event(id).await?;
        self.cache
            .send_modify(|events| apply(events, RowChange::Delete(id)));
        Ok(())
    }

    /// The next `limit` events on or after `today`.
    pub fn upcoming(&self, today: NaiveDate, limit: usize) -> Vec<Event> {
        derived::upcoming_events(&self.cache.borrow(), today, limit)
    }

    /// Events on one calendar day.
    pub fn on_date(&self, date: NaiveDate) -> Vec<Event> {
        self.cache
            .borrow()
            .iter()
            .filter(|e| e.event_date == date)
            .cloned()
            .collect()
    }

    /// Events within one calendar month.
    pub fn in_month(&self, year: i32, month: u32) -> Vec<Event> {
        self.cache
            .borrow()
            .iter()
            .filter(|e| e.event_date.year() == year && e.event_date.month() == month)
            .cloned()
            .collect()
    }
}

impl Drop for EventStore {
    fn drop(&mut self) {
        self.stop_feed();
    }
}
