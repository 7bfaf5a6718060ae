//! Response authorization guard: authenticate, recover from 401 once.
//!
//! DESIGN
//! ======
//! Every authenticated request goes through `ResponseAuthGuard::execute`:
//!
//! ```text
//! stamp ─► send ─► 401? ──no──► classified result
//!                   │
//!                  yes ─► marker set? ──yes──► Unauthorized
//!                   │
//!                   └─► set marker ─► refresh ─► ok ─► restamp ─► resend once
//!                                        │
//!                                      failed ─► end session ─► SessionInvalid
//! ```
//!
//! Network failures propagate unchanged at every step and never trigger a
//! refresh. The retry marker travels with the request, so a request that was
//! already retried fails fast even if it re-enters the guard.
//!
//! ERROR HANDLING
//! ==============
//! When several requests share one failed refresh, only the first to observe
//! the failure runs the sign-out side effects (sign-out call, broadcast). The
//! others return `SessionInvalid` without repeating them.

use std::sync::Arc;

use uuid::Uuid;

use crate::channel::LogoutChannel;
use crate::error::{AuthError, RefreshFailure};
use crate::refresh::RefreshCoordinator;
use crate::request::{TrackedRequest, restamp, stamp};
use crate::session::post_sign_out;
use crate::state::SessionContext;
use crate::transport::{ApiResponse, Transport};

#[derive(Clone)]
pub struct ResponseAuthGuard {
    ctx: SessionContext,
    transport: Arc<dyn Transport>,
    refresher: RefreshCoordinator,
    channel: LogoutChannel,
    tab_id: Uuid,
}

impl ResponseAuthGuard {
    #[must_use]
    pub fn new(
        ctx: SessionContext,
        transport: Arc<dyn Transport>,
        refresher: RefreshCoordinator,
        channel: LogoutChannel,
        tab_id: Uuid,
    ) -> Self {
        Self { ctx, transport, refresher, channel, tab_id }
    }

    /// Send `request` with the current credential, refreshing and retrying at
    /// most once on an authorization failure.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` when the retry (or an already-retried request) is rejected.
    /// - `SessionInvalid` when the refresh failed; the session has been ended.
    /// - `Network`, `Status` and friends as classified by the transport.
    pub async fn execute(&self, request: impl Into<TrackedRequest>) -> Result<ApiResponse, AuthError> {
        let mut tracked = request.into();
        stamp(&mut tracked.request, self.ctx.credential().as_deref())?;

        let response = self.transport.send(&tracked.request).await?;
        if !response.is_unauthorized() {
            return response.into_result();
        }
        if tracked.retry.is_set() {
            tracing::debug!(path = %tracked.request.path, "unauthorized after retry; giving up");
            return response.into_result();
        }

        tracked.retry.set();
        tracing::debug!(path = %tracked.request.path, "unauthorized; refreshing before retry");
        let epoch = self.ctx.epoch();
        let credential = match self.refresher.refresh().await {
            Ok(credential) => credential,
            Err(failure) => {
                self.end_session(epoch, &failure).await;
                return Err(AuthError::SessionInvalid(failure));
            }
        };

        restamp(&mut tracked.request, credential.as_deref())?;
        self.transport.send(&tracked.request).await?.into_result()
    }

    /// Sign-out side effects after a failed refresh. The refresh already reset
    /// the session out of `epoch`; whoever claims the follow-up epoch owns the
    /// sign-out call and the broadcast.
    async fn end_session(&self, epoch: u64, failure: &RefreshFailure) {
        if *failure == RefreshFailure::Superseded {
            return;
        }
        if !self.ctx.claim_sign_out(epoch.wrapping_add(1)) {
            return;
        }
        tracing::warn!(tab_id = %self.tab_id, error = %failure, "refresh failed during request; signing out");
        post_sign_out(self.transport.as_ref(), None).await;
        self.channel.broadcast_logout(self.tab_id);
    }
}

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;
