//! Outgoing request descriptors and credential stamping.
//!
//! DESIGN
//! ======
//! `ApiRequest` is what the transport sends. Coordinator bookkeeping (the
//! retry marker) travels next to it in `TrackedRequest` rather than inside
//! it, so transport-owned data is only ever touched for the auth header.

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Serialize;

use crate::error::AuthError;

/// A request relative to the configured API base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path below the API base, starting with `/`.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), headers: HeaderMap::new(), body: None }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Parse` if the payload cannot be serialized.
    pub fn with_json<T: Serialize>(mut self, payload: &T) -> Result<Self, AuthError> {
        let value = serde_json::to_value(payload).map_err(|e| AuthError::Parse(e.to_string()))?;
        self.body = Some(value);
        Ok(self)
    }

    /// The bearer credential currently attached, if any.
    #[must_use]
    pub fn bearer(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
    }
}

// =============================================================================
// STAMPING
// =============================================================================

fn bearer_value(credential: &str) -> Result<HeaderValue, AuthError> {
    let mut value = HeaderValue::from_str(&format!("Bearer {credential}"))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Attach `Authorization: Bearer <credential>` when a credential exists.
/// Without one the request passes through unmodified and the cookie carries auth.
///
/// # Errors
///
/// Returns `AuthError::InvalidHeader` if the credential is not a valid header value.
pub fn stamp(request: &mut ApiRequest, credential: Option<&str>) -> Result<(), AuthError> {
    if let Some(credential) = credential {
        request.headers.insert(AUTHORIZATION, bearer_value(credential)?);
    }
    Ok(())
}

/// Re-stamp a request before its retry. A cookie-only refresh yields no
/// credential, so the stale header is removed instead of kept.
///
/// # Errors
///
/// Returns `AuthError::InvalidHeader` if the credential is not a valid header value.
pub fn restamp(request: &mut ApiRequest, credential: Option<&str>) -> Result<(), AuthError> {
    match credential {
        Some(credential) => {
            request.headers.insert(AUTHORIZATION, bearer_value(credential)?);
        }
        None => {
            request.headers.remove(AUTHORIZATION);
        }
    }
    Ok(())
}

// =============================================================================
// RETRY MARKER
// =============================================================================

/// Set the first time a request is retried after an authorization failure.
/// Once set it never clears.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryMarker(bool);

impl RetryMarker {
    #[must_use]
    pub fn is_set(self) -> bool {
        self.0
    }

    pub fn set(&mut self) {
        self.0 = true;
    }
}

/// A request plus the coordinator's per-request metadata.
#[derive(Debug, Clone)]
pub struct TrackedRequest {
    pub request: ApiRequest,
    pub retry: RetryMarker,
}

impl From<ApiRequest> for TrackedRequest {
    fn from(request: ApiRequest) -> Self {
        Self { request, retry: RetryMarker::default() }
    }
}

#[cfg(test)]
#[path = "request_test.rs"]
mod tests;
