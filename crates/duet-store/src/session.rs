//! Local stand-in for the external identity collaborator.
//!
//! Real deployments get their session from the managed auth service;
//! this implementation drives the same `AuthState` watch channel by
//! hand, which is exactly what the tests need to exercise the
//! ready-gating in the client core.

use tokio::sync::watch;

use duet_shared::backend::SessionProvider;
use duet_shared::{AuthState, AuthUser};

/// Manually driven [`SessionProvider`].
///
/// Starts out not ready with no user, the same shape a real provider
/// has while its initial session check is in flight.
pub struct LocalSession {
    tx: watch::Sender<AuthState>,
}

impl LocalSession {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(AuthState::default());
        Self { tx }
    }

    /// Create a session that is already signed in and ready.
    pub fn signed_in(user: AuthUser) -> Self {
        let session = Self::new();
        session.sign_in(user);
        session
    }

    /// Report the initial session check as complete (with no user,
    /// unless one was already signed in).
    pub fn set_ready(&self) {
        self.tx.send_modify(|state| state.ready = true);
    }

    /// Sign a user in; implies ready.
    pub fn sign_in(&self, user: AuthUser) {
        self.tx.send_replace(AuthState {
            user: Some(user),
            ready: true,
        });
    }

    /// Sign the current user out; stays ready.
    pub fn sign_out(&self) {
        self.tx.send_replace(AuthState {
            user: None,
            ready: true,
        });
    }
}

impl Default for LocalSession {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionProvider for LocalSession {
    fn auth_state(&self) -> watch::Receiver<AuthState> {
        self.tx.subscribe()
    }
}
