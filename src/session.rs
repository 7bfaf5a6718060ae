//! `SessionManager`: one tab's session, wired end to end.
//!
//! ARCHITECTURE
//! ============
//! ```text
//!              SessionManager
//!   ┌──────────────┼───────────────┬──────────────┐
//!   ▼              ▼               ▼              ▼
//! login/logout  ResponseAuthGuard  SessionBootstrap  LogoutChannel
//!   │              │               │              │
//!   └──────► RefreshCoordinator ◄──┘              │
//!                  │                              │
//!                  ▼                              ▼
//!            SessionContext ◄──────────── logout listener
//!                  │
//!                  ▼
//!           SessionPersistence
//! ```
//!
//! Every component shares the same `SessionContext` and `Transport`. The
//! manager is cheap to clone; clones drive the same session.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::bootstrap::{RouteGuard, RouteTable, SessionBootstrap};
use crate::channel::{LogoutChannel, Navigator, spawn_logout_listener};
use crate::config::{SIGNIN_PATH, SIGNOUT_PATH, SessionConfig};
use crate::error::AuthError;
use crate::guard::ResponseAuthGuard;
use crate::profile::{Profile, enrich_with_health, fetch_profile};
use crate::refresh::RefreshCoordinator;
use crate::request::{ApiRequest, TrackedRequest, stamp};
use crate::state::{SessionContext, SessionSnapshot};
use crate::storage::{KeyValueStore, MemoryStore, SessionPersistence};
use crate::token::extract_credential;
use crate::transport::{ApiResponse, HttpTransport, Transport};

/// Sign-in payload for `POST /user/signin`.
#[derive(Debug, Clone, Serialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Clone)]
pub struct SessionManager {
    tab_id: Uuid,
    config: Arc<SessionConfig>,
    ctx: SessionContext,
    transport: Arc<dyn Transport>,
    refresher: RefreshCoordinator,
    guard: ResponseAuthGuard,
    bootstrap: SessionBootstrap,
    channel: LogoutChannel,
}

impl SessionManager {
    /// Wire a session around `transport`, restoring whatever `store` holds
    /// under the configured key.
    #[must_use]
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn KeyValueStore>,
        channel: LogoutChannel,
    ) -> Self {
        let tab_id = Uuid::new_v4();
        let ctx = SessionContext::restore(SessionPersistence::new(store, config.storage_key.clone()));
        let refresher = RefreshCoordinator::new(ctx.clone(), Arc::clone(&transport), &config);
        let guard = ResponseAuthGuard::new(ctx.clone(), Arc::clone(&transport), refresher.clone(), channel.clone(), tab_id);
        let bootstrap = SessionBootstrap::new(ctx.clone(), Arc::clone(&transport), refresher.clone());
        tracing::info!(%tab_id, base_url = %config.base_url, mode = ?config.refresh_mode, "session manager ready");
        Self { tab_id, config: Arc::new(config), ctx, transport, refresher, guard, bootstrap, channel }
    }

    /// Standalone session over HTTP with in-memory persistence.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::HttpClientBuild` if the HTTP client cannot be built.
    pub fn from_config(config: SessionConfig) -> Result<Self, AuthError> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Ok(Self::new(config, transport, Arc::new(MemoryStore::new()), LogoutChannel::new()))
    }

    // =========================================================================
    // SIGN-IN / SIGN-OUT
    // =========================================================================

    /// Sign in and adopt whatever session the server hands back. Returns the
    /// sign-in response body.
    ///
    /// A response with neither a credential nor a `user` is followed by a
    /// cookie-only profile fetch; if that fails the sign-in still succeeds but
    /// the session stays unauthenticated.
    ///
    /// # Errors
    ///
    /// Returns the classified error for a failed sign-in. No refresh is attempted.
    pub async fn login(&self, credentials: &SignInRequest) -> Result<Value, AuthError> {
        let request = ApiRequest::post(SIGNIN_PATH).with_json(credentials)?;
        let body = self.transport.send(&request).await?.into_result()?.body;

        let credential = extract_credential(&body, &self.config.token_fields);
        if let Some(credential) = &credential {
            self.ctx.set_credential(Some(credential.clone()));
        }

        let user = body.get("user").cloned().filter(Value::is_object);
        if let Some(user) = user.clone() {
            let mut profile = Profile::from_value(user)?;
            enrich_with_health(self.transport.as_ref(), credential.as_deref(), &mut profile).await;
            self.ctx.set_profile(Some(profile));
        }

        if credential.is_none() && user.is_none() {
            match fetch_profile(self.transport.as_ref(), None).await {
                Ok(mut profile) => {
                    enrich_with_health(self.transport.as_ref(), None, &mut profile).await;
                    self.ctx.confirm_cookie_session(profile);
                }
                Err(e) => tracing::debug!(tab_id = %self.tab_id, error = %e, "no cookie session after sign-in"),
            }
        }

        tracing::info!(
            tab_id = %self.tab_id,
            credential = credential.is_some(),
            authenticated = self.ctx.is_authenticated(),
            "signed in"
        );
        Ok(body)
    }

    /// Sign out here and in every other tab. Never fails.
    pub async fn logout(&self) {
        post_sign_out(self.transport.as_ref(), self.ctx.credential().as_deref()).await;
        self.ctx.reset();
        self.channel.broadcast_logout(self.tab_id);
        tracing::info!(tab_id = %self.tab_id, "signed out");
    }

    // =========================================================================
    // SESSION
    // =========================================================================

    pub async fn check_auth(&self) -> bool {
        self.bootstrap.check_auth().await
    }

    /// Refresh the credential, joining any refresh already in flight.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Refresh` when the attempt failed; the session is reset.
    pub async fn refresh(&self) -> Result<Option<String>, AuthError> {
        self.refresher.refresh().await.map_err(AuthError::from)
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.ctx.snapshot()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.ctx.is_authenticated()
    }

    #[must_use]
    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    #[must_use]
    pub fn channel(&self) -> &LogoutChannel {
        &self.channel
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn tab_id(&self) -> Uuid {
        self.tab_id
    }

    // =========================================================================
    // REQUESTS
    // =========================================================================

    /// Send an authenticated request through the response guard.
    ///
    /// # Errors
    ///
    /// See [`ResponseAuthGuard::execute`].
    pub async fn send(&self, request: impl Into<TrackedRequest>) -> Result<ApiResponse, AuthError> {
        self.guard.execute(request).await
    }

    /// # Errors
    ///
    /// See [`ResponseAuthGuard::execute`].
    pub async fn get(&self, path: &str) -> Result<ApiResponse, AuthError> {
        self.send(ApiRequest::get(path)).await
    }

    /// # Errors
    ///
    /// See [`ResponseAuthGuard::execute`]; also `Parse` if `payload` cannot be serialized.
    pub async fn post<T: Serialize>(&self, path: &str, payload: &T) -> Result<ApiResponse, AuthError> {
        self.send(ApiRequest::post(path).with_json(payload)?).await
    }

    // =========================================================================
    // WIRING
    // =========================================================================

    /// Apply logout signals from other tabs to this session.
    pub fn spawn_logout_listener(&self, navigator: Arc<dyn Navigator>) -> JoinHandle<()> {
        spawn_logout_listener(
            self.ctx.clone(),
            self.channel.subscribe(),
            navigator,
            self.config.landing_path.clone(),
            self.tab_id,
        )
    }

    #[must_use]
    pub fn route_guard(&self, table: RouteTable) -> RouteGuard {
        RouteGuard::new(self.bootstrap.clone(), table, self.config.login_path.clone())
    }
}

/// Best-effort `POST /user/signout`; failures are logged and dropped.
pub(crate) async fn post_sign_out(transport: &dyn Transport, credential: Option<&str>) {
    let mut request = ApiRequest::post(SIGNOUT_PATH);
    if let Err(e) = stamp(&mut request, credential) {
        tracing::debug!(error = %e, "sign-out sent without credential");
    }
    match transport.send(&request).await.and_then(ApiResponse::into_result) {
        Ok(_) => tracing::debug!("sign-out acknowledged"),
        Err(e) => tracing::debug!(error = %e, "sign-out call failed; ignoring"),
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
