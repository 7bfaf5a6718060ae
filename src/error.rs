//! Error taxonomy for the session coordinator.
//!
//! DESIGN
//! ======
//! `AuthError` is what callers of the coordinator see. `RefreshFailure` is the
//! outcome of one refresh attempt; it is `Clone` because a single attempt is
//! shared by every request that joined it.

// =============================================================================
// REFRESH FAILURE
// =============================================================================

/// Why a refresh attempt did not produce a usable session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshFailure {
    /// The refresh endpoint rejected the cookie.
    #[error("refresh rejected: status {status}")]
    Rejected { status: u16 },

    /// The refresh request never produced a response.
    #[error("refresh request failed: {0}")]
    Network(String),

    /// The endpoint succeeded without a credential and the deployment
    /// requires one.
    #[error("refresh returned no credential")]
    MissingCredential,

    /// The endpoint succeeded without a credential and the confirming
    /// profile fetch failed.
    #[error("cookie session could not be confirmed: {0}")]
    CookieUnconfirmed(String),

    /// The session was reset while the refresh was in flight.
    #[error("session was reset while refresh was in flight")]
    Superseded,
}

// =============================================================================
// AUTH ERROR
// =============================================================================

/// Errors surfaced by session operations and authenticated requests.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The server rejected the request for a missing or expired credential.
    #[error("unauthorized")]
    Unauthorized { body: serde_json::Value },

    /// A refresh invoked directly (not through the response guard) failed.
    #[error("refresh failed: {0}")]
    Refresh(#[from] RefreshFailure),

    /// Refresh failed while recovering a request; the session was reset.
    #[error("session invalid: {0}")]
    SessionInvalid(RefreshFailure),

    /// Transport-level failure unrelated to auth.
    #[error("network failure: {0}")]
    Network(String),

    /// Any other non-success HTTP status.
    #[error("request failed: status {status}")]
    Status { status: u16, body: serde_json::Value },

    /// A response body could not be interpreted.
    #[error("response parse failed: {0}")]
    Parse(String),

    /// The credential could not be encoded as a header value.
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// A configuration value could not be parsed.
    #[error("config parse failed: {0}")]
    Config(String),
}

impl AuthError {
    /// Stable machine-readable code for this error.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "E_UNAUTHORIZED",
            Self::Refresh(_) => "E_REFRESH_FAILED",
            Self::SessionInvalid(_) => "E_SESSION_INVALID",
            Self::Network(_) => "E_NETWORK",
            Self::Status { .. } => "E_STATUS",
            Self::Parse(_) => "E_PARSE",
            Self::InvalidHeader(_) => "E_INVALID_HEADER",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
            Self::Config(_) => "E_CONFIG_PARSE",
        }
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// True when the error means the user has to sign in again.
    #[must_use]
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::SessionInvalid(_) | Self::Refresh(_))
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
