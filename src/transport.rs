//! HTTP transport seam.
//!
//! DESIGN
//! ======
//! The coordinator never talks to reqwest directly; it goes through the
//! `Transport` trait so tests can script responses and count calls. A
//! transport reports every HTTP response as `Ok`, whatever its status;
//! classification into auth failures happens in the coordinator.
//!
//! The reqwest client keeps its own cookie store. The refresh cookie is set
//! and replayed there and is never visible to coordinator code.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::SessionConfig;
use crate::error::AuthError;
use crate::request::ApiRequest;

/// Status the server uses for a missing or expired credential.
pub const UNAUTHORIZED_STATUS: u16 = 401;

// =============================================================================
// RESPONSE
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    #[must_use]
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status == UNAUTHORIZED_STATUS
    }

    /// Deserialize the body.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Parse` if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, AuthError> {
        serde_json::from_value(self.body.clone()).map_err(|e| AuthError::Parse(e.to_string()))
    }

    /// Classify the response: 2xx passes, 401 is `Unauthorized`, anything
    /// else is `Status`.
    ///
    /// # Errors
    ///
    /// Returns the classified error for any non-success status.
    pub fn into_result(self) -> Result<Self, AuthError> {
        if self.is_success() {
            Ok(self)
        } else if self.is_unauthorized() {
            Err(AuthError::Unauthorized { body: self.body })
        } else {
            Err(AuthError::Status { status: self.status, body: self.body })
        }
    }
}

// =============================================================================
// TRAIT
// =============================================================================

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send one request. Only transport-level failures are `Err`.
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, AuthError>;
}

// =============================================================================
// REQWEST TRANSPORT
// =============================================================================

pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Build a cookie-keeping reqwest client from config.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::HttpClientBuild` if the client cannot be built.
    pub fn new(config: &SessionConfig) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| AuthError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: config.base_url.trim_end_matches('/').to_owned() })
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, AuthError> {
        let mut builder = self
            .http
            .request(request.method.clone(), self.url(&request.path))
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        tracing::debug!(method = %request.method, path = %request.path, status, "api response");
        Ok(ApiResponse { status, body: parse_body(&text) })
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// Empty bodies become `Null`; bodies that are not JSON are kept as a string.
pub(crate) fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_owned()))
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
