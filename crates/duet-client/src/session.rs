//! Couple session store: resolves the signed-in identity to its
//! profile, couple, and partner, and republishes the result on a watch
//! channel.
//!
//! The store distinguishes "still loading" from "resolved with no
//! couple".  Consumers deciding whether to send the user to couple
//! setup must see [`SessionState::Loading`] until both the auth check
//! and the profile resolution have finished, otherwise a signed-in
//! user with a couple gets bounced to setup on every cold start.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use duet_shared::backend::{Backend, DataBackend, SessionProvider};
use duet_shared::{
    AuthState, AuthUser, Couple, CoupleCode, CoupleId, DuetError, Result, UserId, UserProfile,
};

/// Everything the session resolved for the current identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// The signed-in user's profile row, if one exists.
    pub profile: Option<UserProfile>,
    pub couple: Option<Couple>,
    pub partner: Option<UserProfile>,
}

impl SessionSnapshot {
    pub fn couple_id(&self) -> Option<CoupleId> {
        self.couple.as_ref().map(|c| c.id)
    }
}

/// Published session state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    /// Auth check or profile resolution still in flight.  Draw a
    /// spinner; conclude nothing.
    #[default]
    Loading,
    /// Auth settled with no user.
    SignedOut,
    /// Signed in and fully resolved.
    Ready(SessionSnapshot),
}

impl SessionState {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// True once it is safe to conclude the user has no couple.
    pub fn needs_couple(&self) -> bool {
        matches!(self, Self::Ready(snap) if snap.couple.is_none())
    }

    pub fn snapshot(&self) -> Option<&SessionSnapshot> {
        match self {
            Self::Ready(snap) => Some(snap),
            _ => None,
        }
    }
}

/// Reactive store resolving auth transitions into [`SessionState`].
pub struct CoupleSession {
    backend: Arc<dyn Backend>,
    auth: watch::Receiver<AuthState>,
    state: watch::Sender<SessionState>,
    /// Bumped on every resolve; a finished resolve only publishes if it
    /// is still the newest, so a stale load can never clobber the
    /// result of a later sign-in.
    generation: AtomicU64,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl CoupleSession {
    /// Build the store and start following the auth channel.
    pub fn new(backend: Arc<dyn Backend>, provider: &dyn SessionProvider) -> Arc<Self> {
        let (state_tx, _) = watch::channel(SessionState::Loading);
        let session = Arc::new(Self {
            backend,
            auth: provider.auth_state(),
            state: state_tx,
            generation: AtomicU64::new(0),
            watcher: Mutex::new(None),
        });

        let weak = Arc::downgrade(&session);
        let mut auth_rx = session.auth.clone();
        let handle = tokio::spawn(async move {
            loop {
                let auth = auth_rx.borrow_and_update().clone();
                match weak.upgrade() {
                    Some(session) => session.on_auth_change(auth).await,
                    None => break,
                }
                if auth_rx.changed().await.is_err() {
                    break;
                }
            }
        });
        if let Ok(mut slot) = session.watcher.lock() {
            *slot = Some(handle);
        }
        session
    }

    /// Subscribe to session state.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// The signed-in user, if auth has produced one.
    pub fn current_user(&self) -> Option<AuthUser> {
        self.auth.borrow().user.clone()
    }

    fn require_user(&self) -> Result<AuthUser> {
        self.current_user().ok_or(DuetError::NotAuthenticated)
    }

    async fn on_auth_change(&self, auth: AuthState) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if !auth.ready {
            self.state.send_replace(SessionState::Loading);
            return;
        }
        let user = match auth.user {
            Some(user) => user,
            None => {
                debug!("auth settled signed out");
                self.state.send_replace(SessionState::SignedOut);
                return;
            }
        };

        self.state.send_replace(SessionState::Loading);
        match self.resolve(user.id).await {
            Ok(snapshot) => self.publish(generation, SessionState::Ready(snapshot)),
            Err(err) => {
                warn!(%err, "session resolution failed");
                self.publish(generation, SessionState::Ready(SessionSnapshot::default()));
            }
        }
    }

    /// Only the newest resolve may publish.
    fn publish(&self, generation: u64, state: SessionState) {
        if self.generation.load(Ordering::SeqCst) == generation {
            self.state.send_replace(state);
        } else {
            debug!("dropping stale session resolution");
        }
    }

    async fn resolve(&self, user_id: UserId) -> Result<SessionSnapshot> {
        let profile = match self.backend.profile(user_id).await {
            Ok(profile) => profile,
            Err(DuetError::NotFound) => return Ok(SessionSnapshot::default()),
            Err(err) => return Err(err),
        };

        let mut snapshot = SessionSnapshot {
            profile: Some(profile.clone()),
            couple: None,
            partner: None,
        };
        if let Some(couple_id) = profile.couple_id {
            match self.backend.couple(couple_id).await {
                Ok(couple) => {
                    snapshot.partner = self.backend.partner_of(couple_id, user_id).await?;
                    snapshot.couple = Some(couple);
                }
                // A dangling couple_id is logged and resolved as "no
                // couple" so the caller can recover through setup.
                Err(DuetError::NotFound) => {
                    let err = DuetError::Integrity(format!(
                        "profile {user_id} linked to missing couple {couple_id}"
                    ));
                    warn!(%err, "resolving as no couple");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(snapshot)
    }

    /// Re-resolve against the backend with the current identity.
    pub async fn refresh(&self) -> Result<()> {
        let user = self.require_user()?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = self.resolve(user.id).await?;
        self.publish(generation, SessionState::Ready(snapshot));
        Ok(())
    }

    /// Create a fresh couple and link the current profile to it.
    ///
    /// The new state is re-resolved from the backend before this
    /// returns, so a caller observing `Ok` can also observe the couple
    /// in [`CoupleSession::state`].
    pub async fn create_couple(&self, anniversary_date: Option<NaiveDate>) -> Result<Couple> {
        let user = self.require_user()?;

        let code = self.backend.generate_couple_code().await?;
        let couple = self.backend.insert_couple(code, anniversary_date).await?;
        self.backend
            .link_profile(user.id, Some(couple.id))
            .await?;

        info!(couple = %couple.id, "couple created");
        self.refresh().await?;
        Ok(couple)
    }

    /// Join an existing couple by invite code.
    ///
    /// Input is normalized (trimmed, uppercased) before lookup.
    /// Malformed or unknown codes surface [`DuetError::InvalidCode`]; a
    /// couple that already has two members surfaces
    /// [`DuetError::CoupleFull`].
    pub async fn join_couple(&self, code: &str) -> Result<Couple> {
        let user = self.require_user()?;

        let code = CoupleCode::parse(code).map_err(|_| DuetError::InvalidCode)?;
        let couple = self
            .backend
            .couple_by_code(&code)
            .await?
            .ok_or(DuetError::InvalidCode)?;

        // Client-side pre-check.  The backend re-checks under its own
        // lock, so a race between two joiners still ends with exactly
        // one of them in the couple.
        let members = self.backend.couple_members(couple.id).await?;
        if members.len() >= 2 && !members.iter().any(|m| m.id == user.id) {
            return Err(DuetError::CoupleFull);
        }

        self.backend
            .link_profile(user.id, Some(couple.id))
            .await?;

        info!(couple = %couple.id, "joined couple");
        self.refresh().await?;
        Ok(couple)
    }

    /// Unlink the current profile from its couple.  The couple row and
    /// its data stay behind for the remaining member.
    pub async fn leave_couple(&self) -> Result<()> {
        let user = self.require_user()?;
        self.backend.link_profile(user.id, None).await?;
        info!("left couple");
        self.refresh().await
    }

    /// Change the couple's anniversary date.
    pub async fn set_anniversary(&self, date: Option<NaiveDate>) -> Result<Couple> {
        self.require_user()?;
        let couple_id = self
            .state
            .borrow()
            .snapshot()
            .and_then(|s| s.couple_id())
            .ok_or(DuetError::NotFound)?;

        let couple = self.backend.set_anniversary(couple_id, date).await?;
        self.state.send_modify(|state| {
            if let SessionState::Ready(snap) = state {
                snap.couple = Some(couple.clone());
            }
        });
        Ok(couple)
    }
}

impl Drop for CoupleSession {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.watcher.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}
