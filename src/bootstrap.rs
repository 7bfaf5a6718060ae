//! Session bootstrap and navigation guard.
//!
//! SYSTEM CONTEXT
//! ==============
//! On startup, and before entering a protected route, the UI asks whether the
//! session is usable. `SessionBootstrap::check_auth` answers with a plain
//! bool and never errors: a persisted credential is validated against the
//! profile endpoint, a rejected one is refreshed once, and a missing one is
//! recovered from the refresh cookie when possible.
//!
//! `RouteGuard` applies that answer to a `RouteTable`: unprotected routes
//! always proceed, protected ones redirect to the login page when
//! `check_auth` says no.

use std::sync::Arc;

use crate::error::AuthError;
use crate::profile::{Profile, enrich_with_health, fetch_profile};
use crate::refresh::RefreshCoordinator;
use crate::state::SessionContext;
use crate::transport::Transport;

// =============================================================================
// BOOTSTRAP
// =============================================================================

#[derive(Clone)]
pub struct SessionBootstrap {
    ctx: SessionContext,
    transport: Arc<dyn Transport>,
    refresher: RefreshCoordinator,
}

impl SessionBootstrap {
    #[must_use]
    pub fn new(ctx: SessionContext, transport: Arc<dyn Transport>, refresher: RefreshCoordinator) -> Self {
        Self { ctx, transport, refresher }
    }

    /// Establish whether the session is authenticated, refreshing if needed.
    pub async fn check_auth(&self) -> bool {
        if let Some(credential) = self.ctx.credential() {
            match self.validate(Some(&credential)).await {
                Ok(()) => {
                    tracing::debug!("persisted credential validated");
                    return true;
                }
                Err(e) if e.is_unauthorized() => {
                    tracing::debug!("persisted credential rejected; refreshing");
                }
                Err(e) => {
                    tracing::warn!(error = %e, code = e.error_code(), "credential validation failed");
                    self.ctx.reset();
                    return false;
                }
            }
        }
        self.recover().await
    }

    /// Refresh, then validate whatever the refresh produced.
    async fn recover(&self) -> bool {
        match self.refresher.refresh().await {
            // A cookie-only refresh already confirmed the session with a profile fetch.
            Ok(None) => self.ctx.is_authenticated(),
            Ok(Some(credential)) => match self.validate(Some(&credential)).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "refreshed credential failed validation");
                    self.ctx.reset();
                    false
                }
            },
            Err(failure) => {
                tracing::debug!(error = %failure, "no session to recover");
                false
            }
        }
    }

    /// Fetch the profile with `credential` (cookie only when `None`) and
    /// store it, unless the session was reset meanwhile.
    async fn validate(&self, credential: Option<&str>) -> Result<(), AuthError> {
        let epoch = self.ctx.epoch();
        let mut profile = fetch_profile(self.transport.as_ref(), credential).await?;
        enrich_with_health(self.transport.as_ref(), credential, &mut profile).await;
        self.store_profile(epoch, credential.is_none(), profile);
        Ok(())
    }

    fn store_profile(&self, epoch: u64, cookie_only: bool, profile: Profile) {
        self.ctx.mutate(|state| {
            if state.epoch != epoch {
                tracing::debug!("session reset during validation; profile discarded");
                return;
            }
            if cookie_only {
                state.confirm_cookie_session(profile);
            } else {
                state.profile = Some(profile);
            }
        });
    }
}

// =============================================================================
// ROUTES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub pattern: String,
    pub requires_auth: bool,
    pub redirect: Option<String>,
}

impl Route {
    /// Segment-wise match; `:name` segments match any single segment.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        let mut pattern = segments(&self.pattern);
        let mut actual = segments(strip_query(path));
        loop {
            match (pattern.next(), actual.next()) {
                (None, None) => return true,
                (Some(p), Some(a)) if p.starts_with(':') || p == a => {}
                _ => return false,
            }
        }
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn strip_query(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or(path)
}

/// Ordered route declarations; the first match wins.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn public(self, pattern: &str) -> Self {
        self.push(pattern, false, None)
    }

    #[must_use]
    pub fn protected(self, pattern: &str) -> Self {
        self.push(pattern, true, None)
    }

    #[must_use]
    pub fn redirect(self, pattern: &str, target: &str) -> Self {
        self.push(pattern, false, Some(target.to_owned()))
    }

    fn push(mut self, pattern: &str, requires_auth: bool, redirect: Option<String>) -> Self {
        self.routes.push(Route { pattern: pattern.to_owned(), requires_auth, redirect });
        self
    }

    #[must_use]
    pub fn find(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.matches(path))
    }

    /// Unknown paths are treated as public.
    #[must_use]
    pub fn requires_auth(&self, path: &str) -> bool {
        self.find(path).is_some_and(|r| r.requires_auth)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Proceed,
    Redirect(String),
}

#[derive(Clone)]
pub struct RouteGuard {
    bootstrap: SessionBootstrap,
    table: RouteTable,
    login_path: String,
}

impl RouteGuard {
    #[must_use]
    pub fn new(bootstrap: SessionBootstrap, table: RouteTable, login_path: impl Into<String>) -> Self {
        Self { bootstrap, table, login_path: login_path.into() }
    }

    /// Decide whether navigation to `path` may proceed.
    pub async fn before_enter(&self, path: &str) -> Navigation {
        let Some(route) = self.table.find(path) else {
            return Navigation::Proceed;
        };
        if let Some(target) = &route.redirect {
            return Navigation::Redirect(target.clone());
        }
        if !route.requires_auth || self.bootstrap.check_auth().await {
            return Navigation::Proceed;
        }
        tracing::info!(path, login = %self.login_path, "unauthenticated; redirecting");
        Navigation::Redirect(self.login_path.clone())
    }
}

#[cfg(test)]
#[path = "bootstrap_test.rs"]
mod tests;
