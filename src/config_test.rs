use super::*;
use std::sync::{Mutex, MutexGuard, PoisonError};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// # Safety
/// Callers must hold `env_lock()` so no other test touches the env concurrently.
unsafe fn clear_session_env() {
    unsafe {
        std::env::remove_var("SESSION_API_BASE_URL");
        std::env::remove_var("SESSION_REFRESH_MODE");
        std::env::remove_var("SESSION_TOKEN_FIELDS");
        std::env::remove_var("SESSION_STORAGE_KEY");
        std::env::remove_var("SESSION_LOGIN_PATH");
        std::env::remove_var("SESSION_LANDING_PATH");
        std::env::remove_var("SESSION_REQUEST_TIMEOUT_SECS");
        std::env::remove_var("SESSION_CONNECT_TIMEOUT_SECS");
    }
}

#[test]
fn from_env_defaults_match_default() {
    let _env = env_lock();
    unsafe { clear_session_env() };

    let cfg = SessionConfig::from_env().unwrap();
    assert_eq!(cfg, SessionConfig::default());
    assert_eq!(cfg.base_url, DEFAULT_API_BASE_URL);
    assert_eq!(cfg.refresh_mode, RefreshMode::CookieFallback);
    assert_eq!(cfg.token_fields, vec!["accessToken", "token", "jwt"]);
    assert_eq!(
        cfg.timeouts,
        SessionTimeouts { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    );
}

#[test]
fn from_env_parses_overrides() {
    let _env = env_lock();
    unsafe {
        clear_session_env();
        std::env::set_var("SESSION_API_BASE_URL", "https://api.example.test/api/");
        std::env::set_var("SESSION_REFRESH_MODE", "token_required");
        std::env::set_var("SESSION_TOKEN_FIELDS", " jwt , accessToken ,");
        std::env::set_var("SESSION_STORAGE_KEY", "tab-auth");
        std::env::set_var("SESSION_LOGIN_PATH", "/signin");
        std::env::set_var("SESSION_REQUEST_TIMEOUT_SECS", "5");
        std::env::set_var("SESSION_CONNECT_TIMEOUT_SECS", "2");
    }

    let cfg = SessionConfig::from_env().unwrap();
    assert_eq!(cfg.base_url, "https://api.example.test/api");
    assert_eq!(cfg.refresh_mode, RefreshMode::TokenRequired);
    assert_eq!(cfg.token_fields, vec!["jwt", "accessToken"]);
    assert_eq!(cfg.storage_key, "tab-auth");
    assert_eq!(cfg.login_path, "/signin");
    assert_eq!(cfg.landing_path, DEFAULT_LANDING_PATH);
    assert_eq!(cfg.timeouts, SessionTimeouts { request_secs: 5, connect_secs: 2 });

    unsafe { clear_session_env() };
}

#[test]
fn from_env_unknown_refresh_mode_errors() {
    let _env = env_lock();
    unsafe {
        clear_session_env();
        std::env::set_var("SESSION_REFRESH_MODE", "sometimes");
    }

    let err = SessionConfig::from_env().unwrap_err().to_string();
    assert!(err.contains("unknown SESSION_REFRESH_MODE"));

    unsafe { clear_session_env() };
}

#[test]
fn from_env_empty_token_fields_errors() {
    let _env = env_lock();
    unsafe {
        clear_session_env();
        std::env::set_var("SESSION_TOKEN_FIELDS", " , ");
    }

    let err = SessionConfig::from_env().unwrap_err();
    assert!(matches!(err, AuthError::Config(_)));

    unsafe { clear_session_env() };
}

#[test]
fn invalid_timeout_falls_back_to_default() {
    let _env = env_lock();
    unsafe {
        clear_session_env();
        std::env::set_var("SESSION_REQUEST_TIMEOUT_SECS", "soon");
    }

    let cfg = SessionConfig::from_env().unwrap();
    assert_eq!(cfg.timeouts.request_secs, DEFAULT_REQUEST_TIMEOUT_SECS);

    unsafe { clear_session_env() };
}
