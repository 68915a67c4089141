//! Ephemeral typing presence on the couple's broadcast channel.
//!
//! Signals are fire-and-forget and never persisted.  The receive side
//! filters out our own broadcasts and auto-hides a stale indicator
//! after [`TYPING_EXPIRY`](duet_shared::constants::TYPING_EXPIRY)
//! without a fresh signal, so a partner whose connection dropped
//! mid-keystroke does not appear to type forever.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use duet_shared::backend::{Backend, RealtimeBackend};
use duet_shared::{CoupleId, Result, TypingSignal, UserId};

pub struct PresenceChannel {
    backend: Arc<dyn Backend>,
    expiry: Duration,
    partner_typing: watch::Sender<bool>,
    attached: Mutex<Option<(CoupleId, UserId)>>,
    recv_task: Mutex<Option<JoinHandle<()>>>,
}

impl PresenceChannel {
    pub fn new(backend: Arc<dyn Backend>, expiry: Duration) -> Self {
        let (partner_typing, _) = watch::channel(false);
        Self {
            backend,
            expiry,
            partner_typing,
            attached: Mutex::new(None),
            recv_task: Mutex::new(None),
        }
    }

    /// Whether the partner is currently typing.
    pub fn partner_typing(&self) -> watch::Receiver<bool> {
        self.partner_typing.subscribe()
    }

    fn stop(&self) {
        if let Ok(mut slot) = self.recv_task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }

    /// Join the couple's typing channel on behalf of `user_id`.
    pub async fn attach(&self, couple_id: CoupleId, user_id: UserId) -> Result<()> {
        self.stop();
        self.partner_typing.send_replace(false);

        let mut sub = self.backend.subscribe_typing(couple_id).await?;
        let flag = self.partner_typing.clone();
        let expiry = self.expiry;

        let task = tokio::spawn(async move {
            // Deadline for auto-hiding the indicator; armed only while
            // it is visible.
            let mut deadline: Option<Instant> = None;
            loop {
                let expired = async move {
                    match deadline {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                };
                tokio::select! {
                    signal = sub.recv() => match signal {
                        None => break,
                        Some(signal) if signal.user_id == user_id => {}
                        Some(signal) => {
                            flag.send_replace(signal.is_typing);
                            deadline = signal
                                .is_typing
                                .then(|| Instant::now() + expiry);
                        }
                    },
                    _ = expired => {
                        debug!("typing indicator expired");
                        flag.send_replace(false);
                        deadline = None;
                    }
                }
            }
        });

        if let Ok(mut slot) = self.attached.lock() {
            *slot = Some((couple_id, user_id));
        }
        if let Ok(mut slot) = self.recv_task.lock() {
            *slot = Some(task);
        }
        Ok(())
    }

    /// Leave the channel and hide any indicator.
    pub fn detach(&self) {
        self.stop();
        if let Ok(mut slot) = self.attached.lock() {
            *slot = None;
        }
        self.partner_typing.send_replace(false);
    }

    /// Broadcast our own typing state.  Best-effort: failures are
    /// logged, never surfaced.  Send again to keep the partner's
    /// indicator alive past the expiry window.
    pub async fn set_typing(&self, is_typing: bool) {
        let attached = self.attached.lock().ok().and_then(|guard| *guard);
        let (couple_id, user_id) = match attached {
            Some(pair) => pair,
            None => {
                debug!("typing signal dropped, channel not attached");
                return;
            }
        };

        if let Err(err) = self
            .backend
            .broadcast_typing(couple_id, TypingSignal { user_id, is_typing })
            .await
        {
            warn!(%err, "typing broadcast failed");
        }
    }
}

impl Drop for PresenceChannel {
    fn drop(&mut self) {
        self.stop();
    }
}
