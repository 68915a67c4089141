//! [`DuetClient`] wires the individual stores to the session.
//!
//! The session store resolves who is signed in and which couple they
//! belong to; this aggregate reacts to those transitions by attaching
//! or detaching every other store, and runs the two cross-store
//! behaviors: system notifications for inbound notes and the delayed
//! automatic read receipt.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use duet_shared::backend::{Backend, NotificationGate, SessionProvider};
use duet_shared::{CoupleId, LoveNote, NoteId, UserId};

use crate::config::ClientConfig;
use crate::events::EventStore;
use crate::memories::MemoryStore;
use crate::notes::NoteStore;
use crate::presence::PresenceChannel;
use crate::session::{CoupleSession, SessionState};

pub struct DuetClient {
    session: Arc<CoupleSession>,
    events: Arc<EventStore>,
    notes: Arc<NoteStore>,
    presence: Arc<PresenceChannel>,
    memories: Arc<MemoryStore>,
    tasks: Vec<JoinHandle<()>>,
}

impl DuetClient {
    pub fn new(
        backend: Arc<dyn Backend>,
        provider: &dyn SessionProvider,
        config: ClientConfig,
    ) -> Self {
        Self::build(backend, provider, config, None)
    }

    /// Like [`DuetClient::new`], with system notifications for inbound
    /// notes when permission is granted.
    pub fn with_notifier(
        backend: Arc<dyn Backend>,
        provider: &dyn SessionProvider,
        config: ClientConfig,
        notifier: Arc<dyn NotificationGate>,
    ) -> Self {
        Self::build(backend, provider, config, Some(notifier))
    }

    fn build(
        backend: Arc<dyn Backend>,
        provider: &dyn SessionProvider,
        config: ClientConfig,
        notifier: Option<Arc<dyn NotificationGate>>,
    ) -> Self {
        let session = CoupleSession::new(backend.clone(), provider);
        let events = Arc::new(EventStore::new(backend.clone()));
        let notes = Arc::new(NoteStore::new(backend.clone()));
        let presence = Arc::new(PresenceChannel::new(backend.clone(), config.typing_expiry));
        let memories = Arc::new(MemoryStore::new(backend));

        let tasks = vec![
            Self::spawn_wiring(
                session.clone(),
                events.clone(),
                notes.clone(),
                presence.clone(),
                memories.clone(),
            ),
            Self::spawn_inbox(notes.clone(), notifier, config.clone()),
        ];

        Self {
            session,
            events,
            notes,
            presence,
            memories,
            tasks,
        }
    }

    pub fn session(&self) -> &Arc<CoupleSession> {
        &self.session
    }

    pub fn events(&self) -> &Arc<EventStore> {
        &self.events
    }

    pub fn notes(&self) -> &Arc<NoteStore> {
        &self.notes
    }

    pub fn presence(&self) -> &Arc<PresenceChannel> {
        &self.presence
    }

    pub fn memories(&self) -> &Arc<MemoryStore> {
        &self.memories
    }

    /// Follow session transitions and keep the stores attached to the
    /// resolved couple.
    fn spawn_wiring(
        session: Arc<CoupleSession>,
        events: Arc<EventStore>,
        notes: Arc<NoteStore>,
        presence: Arc<PresenceChannel>,
        memories: Arc<MemoryStore>,
    ) -> JoinHandle<()> {
        let mut state_rx = session.state();
        tokio::spawn(async move {
            let mut current: Option<(CoupleId, UserId)> = None;
            loop {
                let target = match &*state_rx.borrow_and_update() {
                    SessionState::Ready(snap) => match (&snap.profile, &snap.couple) {
                        (Some(profile), Some(couple)) => Some((couple.id, profile.id)),
                        _ => None,
                    },
                    _ => None,
                };

                if target != current {
                    if let Some((couple_id, user_id)) = target {
                        debug!(couple = %couple_id, "attaching stores");
                        if let Err(err) = events.attach(couple_id).await {
                            warn!(%err, "event store attach failed");
                        }
                        if let Err(err) = notes.attach(couple_id, user_id).await {
                            warn!(%err, "note store attach failed");
                        }
                        if let Err(err) = presence.attach(couple_id, user_id).await {
                            warn!(%err, "presence attach failed");
                        }
                        if let Err(err) = memories.attach(couple_id).await {
                            warn!(%err, "memory store attach failed");
                        }
                    } else {
                        debug!("detaching stores");
                        events.detach();
                        notes.detach();
                        presence.detach();
                        memories.detach();
                    }
                    current = target;
                }

                if state_rx.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    /// Watch the note cache for inbound traffic: raise a system
    /// notification per new unread note, then issue the delayed read
    /// receipt once the view has settled.
    fn spawn_inbox(
        notes: Arc<NoteStore>,
        notifier: Option<Arc<dyn NotificationGate>>,
        config: ClientConfig,
    ) -> JoinHandle<()> {
        let mut cache_rx = notes.watch();
        tokio::spawn(async move {
            let mut seen: HashSet<NoteId> =
                cache_rx.borrow_and_update().iter().map(|n| n.id).collect();
            loop {
                if cache_rx.changed().await.is_err() {
                    break;
                }
                let me = notes.attached_user();

                let fresh: Vec<LoveNote> = {
                    let cache = cache_rx.borrow_and_update();
                    let fresh = cache
                        .iter()
                        .filter(|n| !seen.contains(&n.id))
                        .cloned()
                        .collect();
                    seen = cache.iter().map(|n| n.id).collect();
                    fresh
                };

                // Notes addressed to us and still unread when they
                // landed in the cache.  The reload on attach counts,
                // the same as opening a chat onto unread history.
                let delivered_unread = me
                    .map(|me| fresh.iter().any(|n| n.to_user_id == me && !n.is_read))
                    .unwrap_or(false);

                if let (Some(me), Some(gate)) = (me, notifier.as_ref()) {
                    for note in &fresh {
                        if note.to_user_id == me && !note.is_read && gate.is_granted() {
                            gate.notify("New love note", &note.message);
                        }
                    }
                }

                if delivered_unread && notes.unread_count() > 0 {
                    tokio::time::sleep(config.auto_read_delay).await;
                    // Re-checked inside; notes read elsewhere meanwhile
                    // are left alone.
                    if let Err(err) = notes.mark_all_read().await {
                        warn!(%err, "auto read receipt failed");
                    }
                }
            }
        })
    }
}

impl Drop for DuetClient {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
