//! Session state: the single source of truth for the current credential.
//!
//! DESIGN
//! ======
//! `SessionContext` is constructed once per tab and cloned into every
//! component that needs it. All reads and writes go through one
//! `std::sync::Mutex`, and no guard is ever held across an `.await`, so every
//! mutation is one synchronous step: requests stamped concurrently always see
//! either the old or the new credential, never a partial write.
//!
//! `is_authenticated` is derived on read. It is true when a credential is held
//! or when a cookie-only profile fetch succeeded since the last reset.
//!
//! Every mutation mirrors `{credential, profile}` into `SessionPersistence`
//! before the lock is released.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::profile::Profile;
use crate::refresh::PendingRefresh;
use crate::storage::{PersistedSession, SessionPersistence};

// =============================================================================
// STATE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    InFlight,
}

#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub(crate) credential: Option<String>,
    pub(crate) profile: Option<Profile>,
    /// A cookie-only profile fetch succeeded since the last reset.
    pub(crate) cookie_confirmed: bool,
    /// Bumped by every reset; refreshes started in an older epoch must not
    /// write into a newer one.
    pub(crate) epoch: u64,
    pub(crate) pending: Option<PendingRefresh>,
    /// Someone already ran the sign-out side effects for this epoch.
    pub(crate) sign_out_claimed: bool,
}

impl SessionState {
    pub(crate) fn is_authenticated(&self) -> bool {
        self.credential.is_some() || (self.cookie_confirmed && self.profile.is_some())
    }

    pub(crate) fn refresh_phase(&self) -> RefreshPhase {
        if self.pending.is_some() { RefreshPhase::InFlight } else { RefreshPhase::Idle }
    }

    pub(crate) fn set_credential(&mut self, credential: Option<String>) {
        if credential.is_none() {
            self.cookie_confirmed = false;
        }
        self.credential = credential;
    }

    /// The cookie now carries the session; any held credential is stale.
    pub(crate) fn confirm_cookie_session(&mut self, profile: Profile) {
        self.credential = None;
        self.profile = Some(profile);
        self.cookie_confirmed = true;
    }

    /// Back to the initial state. Any pending refresh is dropped, not awaited.
    pub(crate) fn reset(&mut self) {
        *self = Self { epoch: self.epoch.wrapping_add(1), ..Self::default() };
    }

    fn projection(&self) -> PersistedSession {
        PersistedSession { credential: self.credential.clone(), profile: self.profile.clone() }
    }
}

/// Point-in-time copy of the session for observers.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub credential: Option<String>,
    pub profile: Option<Profile>,
    pub is_authenticated: bool,
    pub refresh_phase: RefreshPhase,
}

// =============================================================================
// CONTEXT
// =============================================================================

#[derive(Clone)]
pub struct SessionContext {
    state: Arc<Mutex<SessionState>>,
    persistence: SessionPersistence,
}

impl SessionContext {
    /// Empty session that mirrors into `persistence`.
    #[must_use]
    pub fn new(persistence: SessionPersistence) -> Self {
        Self { state: Arc::new(Mutex::new(SessionState::default())), persistence }
    }

    /// Session restored verbatim from the persisted projection.
    #[must_use]
    pub fn restore(persistence: SessionPersistence) -> Self {
        let persisted = persistence.load();
        let restored = persisted.credential.is_some();
        let state = SessionState { credential: persisted.credential, profile: persisted.profile, ..SessionState::default() };
        tracing::debug!(key = persistence.key(), restored, "session context restored");
        Self { state: Arc::new(Mutex::new(state)), persistence }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` under the state lock without touching persistence.
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        f(&mut self.lock())
    }

    /// Run `f` under the state lock, then mirror the projection before unlocking.
    pub(crate) fn mutate<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut state = self.lock();
        let result = f(&mut state);
        self.persistence.save(&state.projection());
        result
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.lock();
        SessionSnapshot {
            credential: state.credential.clone(),
            profile: state.profile.clone(),
            is_authenticated: state.is_authenticated(),
            refresh_phase: state.refresh_phase(),
        }
    }

    #[must_use]
    pub fn credential(&self) -> Option<String> {
        self.lock().credential.clone()
    }

    #[must_use]
    pub fn profile(&self) -> Option<Profile> {
        self.lock().profile.clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.lock().is_authenticated()
    }

    #[must_use]
    pub fn refresh_phase(&self) -> RefreshPhase {
        self.lock().refresh_phase()
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    pub fn set_credential(&self, credential: Option<String>) {
        self.mutate(|state| state.set_credential(credential));
    }

    /// Store the profile. Authentication derivation is unaffected.
    pub fn set_profile(&self, profile: Option<Profile>) {
        self.mutate(|state| state.profile = profile);
    }

    /// Mutate the stored profile in place, if there is one.
    pub fn update_profile(&self, f: impl FnOnce(&mut Profile)) {
        self.mutate(|state| {
            if let Some(profile) = state.profile.as_mut() {
                f(profile);
            }
        });
    }

    /// Record a successful cookie-only profile fetch.
    pub fn confirm_cookie_session(&self, profile: Profile) {
        self.mutate(|state| state.confirm_cookie_session(profile));
    }

    /// Clear every field, drop any pending refresh and the persisted projection.
    pub fn reset(&self) {
        self.mutate(SessionState::reset);
        tracing::debug!("session reset");
    }

    /// Claim the sign-out side effects for a session that ended in `epoch`.
    /// Only the first caller gets `true`, and only while the session is still
    /// in that epoch and nobody has signed in since. State is left untouched.
    pub(crate) fn claim_sign_out(&self, epoch: u64) -> bool {
        self.with_state(|state| {
            let claimable = state.epoch == epoch && !state.sign_out_claimed && !state.is_authenticated();
            if claimable {
                state.sign_out_claimed = true;
            }
            claimable
        })
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
