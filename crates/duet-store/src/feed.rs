//! In-process change feed.
//!
//! Confirmed writes are fanned out on per-table broadcast channels
//! tagged with the owning couple id; subscriptions run a forwarder task
//! that drops rows for other couples before they reach the client.
//! Typing signals get their own lazily created per-couple channel,
//! mirroring the ephemeral broadcast topic of the remote service.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use duet_shared::backend::Subscription;
use duet_shared::{typing_topic, CoupleId, EventChange, NoteChange, TypingSignal};

/// Capacity of the per-table broadcast channels.  A lagging subscriber
/// loses the oldest changes, which degrades to the last known cache
/// state until the next full load.
const FEED_CAPACITY: usize = 256;

/// Fan-out hub for row changes and typing signals.
pub struct ChangeFeed {
    events: broadcast::Sender<(CoupleId, EventChange)>,
    notes: broadcast::Sender<(CoupleId, NoteChange)>,
    typing: Mutex<HashMap<CoupleId, broadcast::Sender<TypingSignal>>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(FEED_CAPACITY);
        let (notes, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            events,
            notes,
            typing: Mutex::new(HashMap::new()),
        }
    }

    // ------------------------------------------------------------------
    // Publishing
    // ------------------------------------------------------------------

    /// Publish a confirmed change on the `events` table.
    pub fn publish_event(&self, couple_id: CoupleId, change: EventChange) {
        // A send error only means nobody is subscribed right now.
        let _ = self.events.send((couple_id, change));
    }

    /// Publish a confirmed change on the `love_notes` table.
    pub fn publish_note(&self, couple_id: CoupleId, change: NoteChange) {
        let _ = self.notes.send((couple_id, change));
    }

    /// Broadcast an ephemeral typing signal on the couple's channel.
    pub fn publish_typing(&self, couple_id: CoupleId, signal: TypingSignal) {
        let sender = self.typing_sender(couple_id);
        let _ = sender.send(signal);
    }

    // ------------------------------------------------------------------
    // Subscribing
    // ------------------------------------------------------------------

    /// Subscribe to event-row changes for one couple.
    pub fn subscribe_events(&self, couple_id: CoupleId) -> Subscription<EventChange> {
        subscribe_filtered(&self.events, couple_id, "events")
    }

    /// Subscribe to love-note-row changes for one couple.
    pub fn subscribe_notes(&self, couple_id: CoupleId) -> Subscription<NoteChange> {
        subscribe_filtered(&self.notes, couple_id, "love_notes")
    }

    /// Subscribe to typing signals on the couple's channel.
    pub fn subscribe_typing(&self, couple_id: CoupleId) -> Subscription<TypingSignal> {
        let mut rx = self.typing_sender(couple_id).subscribe();
        let (tx, out_rx) = mpsc::channel(FEED_CAPACITY);

        let topic = typing_topic(couple_id);
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(signal) => {
                        if tx.send(signal).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // Typing signals are ephemeral; losing some is fine.
                        debug!(topic = %topic, missed, "typing subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Subscription::new(out_rx, task)
    }

    fn typing_sender(&self, couple_id: CoupleId) -> broadcast::Sender<TypingSignal> {
        let mut topics = self.typing.lock().unwrap_or_else(|e| e.into_inner());
        topics
            .entry(couple_id)
            .or_insert_with(|| broadcast::channel(FEED_CAPACITY).0)
            .clone()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn a forwarder that keeps only changes tagged with `couple_id`.
fn subscribe_filtered<T: Clone + Send + 'static>(
    sender: &broadcast::Sender<(CoupleId, T)>,
    couple_id: CoupleId,
    table: &'static str,
) -> Subscription<T> {
    let mut rx = sender.subscribe();
    let (tx, out_rx) = mpsc::channel(FEED_CAPACITY);

    let task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok((tagged, change)) if tagged == couple_id => {
                    if tx.send(change).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(table, %couple_id, missed, "change feed subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    Subscription::new(out_rx, task)
}
