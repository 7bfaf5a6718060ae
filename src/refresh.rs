//! Single-flight credential refresh.
//!
//! DESIGN
//! ======
//! The coordinator is a two-state machine held in `SessionState::pending`:
//! `None` is Idle, `Some(PendingRefresh)` is InFlight. `refresh()` performs one
//! synchronous check-and-set under the state lock before any suspension:
//! either clone the pending shared future (join) or create one and store it
//! (start). A burst of callers therefore issues exactly one refresh call, and
//! every caller observes the same outcome.
//!
//! The attempt settles in a single critical section. It is tagged with the
//! session epoch it started in; if the session was reset meanwhile, nothing
//! is applied and joiners see `Superseded`. A reset drops the pending slot, so
//! a refresh requested after a reset always starts a fresh attempt.
//!
//! The shared future is also spawned on the runtime, so it settles even if
//! every caller awaiting it is cancelled.

use std::fmt;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::config::{REFRESH_PATH, RefreshMode, SessionConfig};
use crate::error::RefreshFailure;
use crate::profile::{Profile, enrich_with_health, fetch_profile};
use crate::request::ApiRequest;
use crate::state::SessionContext;
use crate::token::extract_credential;
use crate::transport::Transport;

/// `Some(credential)` for a credential refresh, `None` for a cookie-only one.
pub type RefreshOutcome = Result<Option<String>, RefreshFailure>;

pub(crate) type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

/// The in-flight refresh attempt. At most one exists per session.
pub(crate) struct PendingRefresh {
    pub(crate) epoch: u64,
    pub(crate) future: SharedRefresh,
}

impl fmt::Debug for PendingRefresh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRefresh").field("epoch", &self.epoch).finish_non_exhaustive()
    }
}

/// What a successful refresh call produced, before it is applied.
enum Renewal {
    Credential(String),
    CookieSession(Profile),
}

struct RefreshSettings {
    mode: RefreshMode,
    token_fields: Vec<String>,
}

// =============================================================================
// COORDINATOR
// =============================================================================

#[derive(Clone)]
pub struct RefreshCoordinator {
    ctx: SessionContext,
    transport: Arc<dyn Transport>,
    settings: Arc<RefreshSettings>,
}

impl RefreshCoordinator {
    #[must_use]
    pub fn new(ctx: SessionContext, transport: Arc<dyn Transport>, config: &SessionConfig) -> Self {
        let settings = RefreshSettings { mode: config.refresh_mode, token_fields: config.token_fields.clone() };
        Self { ctx, transport, settings: Arc::new(settings) }
    }

    /// Obtain a fresh credential, joining the in-flight attempt if there is one.
    ///
    /// # Errors
    ///
    /// Returns the shared `RefreshFailure`; by then the session has been reset.
    pub async fn refresh(&self) -> RefreshOutcome {
        self.join_or_start().await
    }

    fn join_or_start(&self) -> SharedRefresh {
        self.ctx.with_state(|state| {
            if let Some(pending) = &state.pending {
                tracing::debug!(epoch = pending.epoch, "joining in-flight refresh");
                return pending.future.clone();
            }

            let epoch = state.epoch;
            let future =
                run_refresh(self.ctx.clone(), Arc::clone(&self.transport), Arc::clone(&self.settings), epoch)
                    .boxed()
                    .shared();
            state.pending = Some(PendingRefresh { epoch, future: future.clone() });
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(future.clone().map(|_| ()));
            }
            tracing::info!(epoch, "refresh started");
            future
        })
    }
}

// =============================================================================
// ATTEMPT
// =============================================================================

async fn run_refresh(
    ctx: SessionContext,
    transport: Arc<dyn Transport>,
    settings: Arc<RefreshSettings>,
    epoch: u64,
) -> RefreshOutcome {
    let renewal = renew(transport.as_ref(), &settings).await;
    settle(&ctx, epoch, renewal)
}

/// `POST /user/refresh` with the cookie only, then interpret the response.
async fn renew(transport: &dyn Transport, settings: &RefreshSettings) -> Result<Renewal, RefreshFailure> {
    let response = transport
        .send(&ApiRequest::post(REFRESH_PATH))
        .await
        .map_err(|e| RefreshFailure::Network(e.to_string()))?;
    if !response.is_success() {
        return Err(RefreshFailure::Rejected { status: response.status });
    }

    if let Some(credential) = extract_credential(&response.body, &settings.token_fields) {
        return Ok(Renewal::Credential(credential));
    }

    match settings.mode {
        RefreshMode::TokenRequired => Err(RefreshFailure::MissingCredential),
        RefreshMode::CookieFallback => {
            let mut profile = fetch_profile(transport, None)
                .await
                .map_err(|e| RefreshFailure::CookieUnconfirmed(e.to_string()))?;
            enrich_with_health(transport, None, &mut profile).await;
            Ok(Renewal::CookieSession(profile))
        }
    }
}

/// Apply the attempt's result and return to Idle, unless the session moved on.
fn settle(ctx: &SessionContext, epoch: u64, renewal: Result<Renewal, RefreshFailure>) -> RefreshOutcome {
    ctx.mutate(|state| {
        if state.epoch != epoch {
            tracing::warn!(started = epoch, current = state.epoch, "refresh outlived its session; discarding");
            return Err(RefreshFailure::Superseded);
        }
        state.pending = None;

        match renewal {
            Ok(Renewal::Credential(credential)) => {
                state.set_credential(Some(credential.clone()));
                tracing::info!(epoch, "refresh issued new credential");
                Ok(Some(credential))
            }
            Ok(Renewal::CookieSession(profile)) => {
                state.confirm_cookie_session(profile);
                tracing::info!(epoch, "refresh confirmed cookie session");
                Ok(None)
            }
            Err(failure) => {
                state.reset();
                tracing::warn!(epoch, error = %failure, "refresh failed; session reset");
                Err(failure)
            }
        }
    })
}

#[cfg(test)]
#[path = "refresh_test.rs"]
mod tests;
