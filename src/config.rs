//! Session coordinator configuration parsed from environment variables.

use crate::error::AuthError;

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8080/api";
pub const DEFAULT_STORAGE_KEY: &str = "auth";
pub const DEFAULT_LOGIN_PATH: &str = "/login";
pub const DEFAULT_LANDING_PATH: &str = "/landing";
pub const DEFAULT_TOKEN_FIELDS: [&str; 3] = ["accessToken", "token", "jwt"];
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// ENDPOINTS
// =============================================================================

pub const SIGNIN_PATH: &str = "/user/signin";
pub const REFRESH_PATH: &str = "/user/refresh";
pub const PROFILE_PATH: &str = "/user/me";
pub const HEALTH_PATH: &str = "/user/health";
pub const SIGNOUT_PATH: &str = "/user/signout";

// =============================================================================
// TYPES
// =============================================================================

/// How a refresh response without a credential is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshMode {
    /// The server must return a credential; its absence is a failure.
    TokenRequired,
    /// The cookie alone may carry the session; confirm it with a profile fetch.
    #[default]
    CookieFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub base_url: String,
    pub refresh_mode: RefreshMode,
    /// Response fields checked for a credential, highest precedence first.
    pub token_fields: Vec<String>,
    /// Namespace of the persisted session entry.
    pub storage_key: String,
    pub login_path: String,
    pub landing_path: String,
    pub timeouts: SessionTimeouts,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_owned(),
            refresh_mode: RefreshMode::default(),
            token_fields: DEFAULT_TOKEN_FIELDS.iter().map(|f| (*f).to_owned()).collect(),
            storage_key: DEFAULT_STORAGE_KEY.to_owned(),
            login_path: DEFAULT_LOGIN_PATH.to_owned(),
            landing_path: DEFAULT_LANDING_PATH.to_owned(),
            timeouts: SessionTimeouts::default(),
        }
    }
}

impl SessionConfig {
    /// Build typed session config from environment variables.
    ///
    /// All optional:
    /// - `SESSION_API_BASE_URL`: default `http://127.0.0.1:8080/api`
    /// - `SESSION_REFRESH_MODE`: `cookie_fallback` (default) or `token_required`
    /// - `SESSION_TOKEN_FIELDS`: comma list, default `accessToken,token,jwt`
    /// - `SESSION_STORAGE_KEY`: default `auth`
    /// - `SESSION_LOGIN_PATH`: default `/login`
    /// - `SESSION_LANDING_PATH`: default `/landing`
    /// - `SESSION_REQUEST_TIMEOUT_SECS`: default 30
    /// - `SESSION_CONNECT_TIMEOUT_SECS`: default 10
    pub fn from_env() -> Result<Self, AuthError> {
        let base_url = std::env::var("SESSION_API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let refresh_mode = parse_refresh_mode(std::env::var("SESSION_REFRESH_MODE").ok().as_deref())?;
        let token_fields = match std::env::var("SESSION_TOKEN_FIELDS") {
            Ok(raw) => parse_token_fields(&raw)?,
            Err(_) => DEFAULT_TOKEN_FIELDS.iter().map(|f| (*f).to_owned()).collect(),
        };
        let timeouts = SessionTimeouts {
            request_secs: env_parse_u64("SESSION_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse_u64("SESSION_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };

        Ok(Self {
            base_url,
            refresh_mode,
            token_fields,
            storage_key: env_or("SESSION_STORAGE_KEY", DEFAULT_STORAGE_KEY),
            login_path: env_or("SESSION_LOGIN_PATH", DEFAULT_LOGIN_PATH),
            landing_path: env_or("SESSION_LANDING_PATH", DEFAULT_LANDING_PATH),
            timeouts,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_refresh_mode(raw: Option<&str>) -> Result<RefreshMode, AuthError> {
    match raw.unwrap_or("cookie_fallback") {
        "cookie_fallback" => Ok(RefreshMode::CookieFallback),
        "token_required" => Ok(RefreshMode::TokenRequired),
        other => Err(AuthError::Config(format!(
            "unknown SESSION_REFRESH_MODE '{other}' (expected 'cookie_fallback' or 'token_required')"
        ))),
    }
}

fn parse_token_fields(raw: &str) -> Result<Vec<String>, AuthError> {
    let fields: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_owned)
        .collect();
    if fields.is_empty() {
        return Err(AuthError::Config("SESSION_TOKEN_FIELDS names no fields".into()));
    }
    Ok(fields)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
