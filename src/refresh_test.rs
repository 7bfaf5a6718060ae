use super::*;
use std::time::Duration;

use crate::config::{HEALTH_PATH, PROFILE_PATH};
use crate::state::RefreshPhase;
use crate::storage::{KeyValueStore, MemoryStore};
use crate::test_helpers::{MockTransport, Reply, test_context};
use serde_json::json;

fn coordinator(ctx: &SessionContext, transport: &Arc<MockTransport>, mode: RefreshMode) -> RefreshCoordinator {
    let config = SessionConfig { refresh_mode: mode, ..SessionConfig::default() };
    RefreshCoordinator::new(ctx.clone(), Arc::clone(transport) as Arc<dyn Transport>, &config)
}

fn issuing(token: &'static str) -> MockTransport {
    MockTransport::new(move |req| match req.path.as_str() {
        REFRESH_PATH => Reply::ok(json!({ "accessToken": token })),
        _ => Reply::status(404),
    })
}

// =============================================================================
// Outcomes
// =============================================================================

#[tokio::test]
async fn successful_refresh_installs_credential() {
    let store = MemoryStore::new();
    let ctx = test_context(&store);
    let transport = Arc::new(issuing("t-2"));

    let outcome = coordinator(&ctx, &transport, RefreshMode::CookieFallback).refresh().await;

    assert_eq!(outcome, Ok(Some("t-2".into())));
    assert_eq!(ctx.credential().as_deref(), Some("t-2"));
    assert_eq!(ctx.refresh_phase(), RefreshPhase::Idle);
    assert!(store.get("auth").unwrap().contains("t-2"));
}

#[tokio::test]
async fn refresh_request_is_cookie_only() {
    let ctx = test_context(&MemoryStore::new());
    ctx.set_credential(Some("t-stale".into()));
    let transport = Arc::new(issuing("t-2"));

    coordinator(&ctx, &transport, RefreshMode::CookieFallback).refresh().await.unwrap();

    let sent = transport.requests_to(REFRESH_PATH);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].method, reqwest::Method::POST);
    assert_eq!(sent[0].bearer(), None);
    assert!(sent[0].body.is_none());
}

#[tokio::test]
async fn alternate_token_field_is_accepted() {
    let ctx = test_context(&MemoryStore::new());
    let transport = Arc::new(MockTransport::new(|_| Reply::ok(json!({ "jwt": "t-jwt" }))));

    let outcome = coordinator(&ctx, &transport, RefreshMode::TokenRequired).refresh().await;

    assert_eq!(outcome, Ok(Some("t-jwt".into())));
}

#[tokio::test]
async fn cookie_only_refresh_confirms_session_via_profile() {
    let ctx = test_context(&MemoryStore::new());
    let transport = Arc::new(MockTransport::new(|req| match req.path.as_str() {
        REFRESH_PATH => Reply::ok(json!({})),
        PROFILE_PATH => Reply::ok(json!({ "id": 1, "name": "Mina" })),
        HEALTH_PATH => Reply::ok(json!({ "height": 170 })),
        _ => Reply::status(404),
    }));

    let outcome = coordinator(&ctx, &transport, RefreshMode::CookieFallback).refresh().await;

    assert_eq!(outcome, Ok(None));
    let snap = ctx.snapshot();
    assert!(snap.is_authenticated);
    assert_eq!(snap.credential, None);
    let profile = snap.profile.unwrap();
    assert_eq!(profile.name(), Some("Mina"));
    assert_eq!(profile.get("height"), Some(&json!(170)));
    assert_eq!(transport.requests_to(PROFILE_PATH)[0].bearer(), None);
}

#[tokio::test]
async fn cookie_only_refresh_fails_when_profile_rejected() {
    let ctx = test_context(&MemoryStore::new());
    ctx.set_credential(Some("t-stale".into()));
    let transport = Arc::new(MockTransport::new(|req| match req.path.as_str() {
        REFRESH_PATH => Reply::ok(json!({})),
        _ => Reply::status(401),
    }));

    let outcome = coordinator(&ctx, &transport, RefreshMode::CookieFallback).refresh().await;

    assert!(matches!(outcome, Err(RefreshFailure::CookieUnconfirmed(_))));
    assert!(!ctx.is_authenticated());
    assert_eq!(ctx.credential(), None);
}

#[tokio::test]
async fn token_required_mode_rejects_tokenless_success() {
    let ctx = test_context(&MemoryStore::new());
    ctx.set_credential(Some("t-stale".into()));
    let transport = Arc::new(MockTransport::new(|_| Reply::ok(json!({ "ok": true }))));

    let outcome = coordinator(&ctx, &transport, RefreshMode::TokenRequired).refresh().await;

    assert_eq!(outcome, Err(RefreshFailure::MissingCredential));
    assert_eq!(ctx.credential(), None);
    assert_eq!(transport.calls_to(PROFILE_PATH), 0);
}

#[tokio::test]
async fn rejected_refresh_resets_session() {
    let store = MemoryStore::new();
    let ctx = test_context(&store);
    ctx.set_credential(Some("t-stale".into()));
    let transport = Arc::new(MockTransport::new(|_| Reply::status(401)));

    let outcome = coordinator(&ctx, &transport, RefreshMode::CookieFallback).refresh().await;

    assert_eq!(outcome, Err(RefreshFailure::Rejected { status: 401 }));
    assert!(!ctx.is_authenticated());
    assert!(store.get("auth").is_none());
    assert_eq!(ctx.refresh_phase(), RefreshPhase::Idle);
}

#[tokio::test]
async fn network_failure_is_reported() {
    let ctx = test_context(&MemoryStore::new());
    let transport = Arc::new(MockTransport::new(|_| Reply::Fail("connection refused".into())));

    let outcome = coordinator(&ctx, &transport, RefreshMode::CookieFallback).refresh().await;

    assert!(matches!(outcome, Err(RefreshFailure::Network(msg)) if msg.contains("connection refused")));
}

// =============================================================================
// Single flight
// =============================================================================

#[tokio::test]
async fn concurrent_refreshes_share_one_call() {
    let ctx = test_context(&MemoryStore::new());
    let transport = Arc::new(issuing("t-2").with_delay(REFRESH_PATH, Duration::from_millis(20)));
    let refresher = coordinator(&ctx, &transport, RefreshMode::CookieFallback);

    let outcomes = futures::future::join_all((0..5).map(|_| refresher.refresh())).await;

    assert_eq!(transport.calls_to(REFRESH_PATH), 1);
    assert!(outcomes.iter().all(|o| *o == Ok(Some("t-2".into()))));
}

#[tokio::test]
async fn in_flight_phase_is_observable() {
    let ctx = test_context(&MemoryStore::new());
    let transport = Arc::new(issuing("t-2").with_delay(REFRESH_PATH, Duration::from_millis(50)));
    let refresher = coordinator(&ctx, &transport, RefreshMode::CookieFallback);

    let task = tokio::spawn({
        let refresher = refresher.clone();
        async move { refresher.refresh().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(ctx.refresh_phase(), RefreshPhase::InFlight);

    task.await.unwrap().unwrap();
    assert_eq!(ctx.refresh_phase(), RefreshPhase::Idle);
}

#[tokio::test]
async fn sequential_refreshes_each_hit_the_network() {
    let ctx = test_context(&MemoryStore::new());
    let transport = Arc::new(issuing("t-2"));
    let refresher = coordinator(&ctx, &transport, RefreshMode::CookieFallback);

    refresher.refresh().await.unwrap();
    refresher.refresh().await.unwrap();

    assert_eq!(transport.calls_to(REFRESH_PATH), 2);
}

#[tokio::test]
async fn reset_during_refresh_discards_result() {
    let ctx = test_context(&MemoryStore::new());
    let transport = Arc::new(issuing("t-late").with_delay(REFRESH_PATH, Duration::from_millis(50)));
    let refresher = coordinator(&ctx, &transport, RefreshMode::CookieFallback);

    let task = tokio::spawn({
        let refresher = refresher.clone();
        async move { refresher.refresh().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    ctx.reset();

    assert_eq!(task.await.unwrap(), Err(RefreshFailure::Superseded));
    assert_eq!(ctx.credential(), None);
    assert!(!ctx.is_authenticated());
}

#[tokio::test]
async fn refresh_after_reset_starts_fresh_attempt() {
    let ctx = test_context(&MemoryStore::new());
    let transport = Arc::new(issuing("t-2").with_delay(REFRESH_PATH, Duration::from_millis(30)));
    let refresher = coordinator(&ctx, &transport, RefreshMode::CookieFallback);

    let stale = tokio::spawn({
        let refresher = refresher.clone();
        async move { refresher.refresh().await }
    });
    tokio::time::sleep(Duration::from_millis(5)).await;
    ctx.reset();

    let fresh = refresher.refresh().await;

    assert_eq!(fresh, Ok(Some("t-2".into())));
    assert_eq!(stale.await.unwrap(), Err(RefreshFailure::Superseded));
    assert_eq!(transport.calls_to(REFRESH_PATH), 2);
    assert_eq!(ctx.credential().as_deref(), Some("t-2"));
}

#[tokio::test]
async fn refresh_settles_even_if_caller_is_cancelled() {
    let ctx = test_context(&MemoryStore::new());
    let transport = Arc::new(issuing("t-2").with_delay(REFRESH_PATH, Duration::from_millis(20)));
    let refresher = coordinator(&ctx, &transport, RefreshMode::CookieFallback);

    let cancelled = tokio::time::timeout(Duration::from_millis(5), refresher.refresh()).await;
    assert!(cancelled.is_err());

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(ctx.refresh_phase(), RefreshPhase::Idle);
    assert_eq!(ctx.credential().as_deref(), Some("t-2"));
}
