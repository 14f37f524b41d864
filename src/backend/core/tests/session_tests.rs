//! Session inspection and transparent token renewal.
//!
//! Tests cover:
//! - Classification boundaries
//! - Renew-once, 401 short-circuit and swallowed transient failures
//! - Requests without credentials never renewing
//! - End-to-end renewal through the refresh token store

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{body::Body, http::Request, http::StatusCode, routing::get, Router};
use tower::ServiceExt;

use common::{authenticator, body_json, mint, now, Behaviour, StubSession, TestApp};
use lendit_core::middleware::{AuthLayer, ExceptionBoundaryLayer, TokenRefreshLayer, TokenRefresher};
use lendit_core::session::{
    JwtSessionService, Principal, RefreshTokenStore, SessionPolicy, SessionService,
    TokenInspector, TokenState,
};

// ============================================================================
// Classification
// ============================================================================

fn expiring_at(secs: i64) -> Principal {
    Principal::builder()
        .subject("7d1f6a52-3a8e-4f0e-9c6b-2d4b8f1e0a11")
        .expires_at(secs)
        .build()
}

#[test]
fn test_classification_boundaries() {
    let inspector = TokenInspector::default();
    let now = 1_700_000_000;
    let at = |remaining: i64| inspector.classify_at(&expiring_at(now + remaining), now);

    assert_eq!(at(301), TokenState::Fresh);
    assert_eq!(at(300), TokenState::NearExpiry);
    assert_eq!(at(1), TokenState::NearExpiry);
    assert_eq!(at(0), TokenState::GracePeriodExpired);
    assert_eq!(at(-5), TokenState::GracePeriodExpired);
    assert_eq!(at(-6), TokenState::HardExpired);
}

#[test]
fn test_classification_follows_policy() {
    let inspector = TokenInspector::new(SessionPolicy {
        near_expiry_secs: 60,
        grace_secs: 30,
    });
    let now = 1_700_000_000;
    let at = |remaining: i64| inspector.classify_at(&expiring_at(now + remaining), now);

    assert_eq!(at(61), TokenState::Fresh);
    assert_eq!(at(60), TokenState::NearExpiry);
    assert_eq!(at(-30), TokenState::GracePeriodExpired);
    assert_eq!(at(-31), TokenState::HardExpired);
}

#[test]
fn test_classification_without_usable_expiry() {
    let inspector = TokenInspector::default();

    assert_eq!(inspector.classify(&Principal::anonymous()), TokenState::Unauthenticated);

    let no_expiry = Principal::builder().subject("someone").build();
    assert_eq!(inspector.classify(&no_expiry), TokenState::Fresh);
}

// ============================================================================
// Orchestrator
// ============================================================================

struct Pipeline {
    router: Router,
    hits: Arc<AtomicUsize>,
}

impl Pipeline {
    fn new(session: Arc<dyn SessionService>) -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        let router = Router::new()
            .route(
                "/downstream",
                get(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        "ok"
                    }
                }),
            )
            .layer(TokenRefreshLayer::new(Arc::new(TokenRefresher::new(session))))
            .layer(AuthLayer::new(authenticator()))
            .layer(ExceptionBoundaryLayer::new());

        Self { router, hits }
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    async fn call(&self, token: Option<&str>) -> axum::response::Response {
        self.router
            .clone()
            .oneshot(common::get("/downstream", token))
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_near_expiry_renews_once() {
    let session = StubSession::new(Behaviour::Issue);
    let pipeline = Pipeline::new(session.clone());
    let token = mint(&authenticator(), "user-1", &["Member"], 5);

    let response = pipeline.call(Some(&token)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(session.calls(), 1);
    assert_eq!(pipeline.hits(), 1);
    assert_eq!(
        response.headers()["x-new-access-token"],
        "renewed-access-token"
    );
    let expires: i64 = response.headers()["x-new-access-token-expires"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(expires > now());
}

#[tokio::test]
async fn test_grace_period_expired_renews() {
    let session = StubSession::new(Behaviour::Issue);
    let pipeline = Pipeline::new(session.clone());
    let token = mint(&authenticator(), "user-1", &[], -2);

    let response = pipeline.call(Some(&token)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(session.calls(), 1);
    assert!(response.headers().contains_key("x-new-access-token"));
}

#[tokio::test]
async fn test_rejected_renewal_short_circuits_with_401() {
    let session = StubSession::new(Behaviour::Reject);
    let pipeline = Pipeline::new(session.clone());
    let token = mint(&authenticator(), "user-1", &["Member"], 5);

    let response = pipeline.call(Some(&token)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(session.calls(), 1);
    assert_eq!(pipeline.hits(), 0);
    assert!(!response.headers().contains_key("x-new-access-token"));

    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Session is no longer valid"));
    assert!(body["data"].is_null());
    assert!(body["errors"].is_null());
}

#[tokio::test]
async fn test_transient_failure_is_swallowed() {
    let session = StubSession::new(Behaviour::Unavailable);
    let pipeline = Pipeline::new(session.clone());
    let token = mint(&authenticator(), "user-1", &["Member"], 5);

    let response = pipeline.call(Some(&token)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(session.calls(), 1);
    assert_eq!(pipeline.hits(), 1);
    assert!(!response.headers().contains_key("x-new-access-token"));
}

#[tokio::test]
async fn test_no_credentials_never_renew() {
    let session = StubSession::new(Behaviour::Issue);
    let pipeline = Pipeline::new(session.clone());

    for _ in 0..3 {
        let response = pipeline.call(None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let forged = mint(&authenticator(), "user-1", &[], 5) + "tampered";
    let response = pipeline.call(Some(&forged)).await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(session.calls(), 0);
    assert_eq!(pipeline.hits(), 4);
}

#[tokio::test]
async fn test_fresh_and_hard_expired_tokens_are_left_alone() {
    let session = StubSession::new(Behaviour::Issue);
    let pipeline = Pipeline::new(session.clone());
    let auth = authenticator();

    let fresh = mint(&auth, "user-1", &[], 3_600);
    let stale = mint(&auth, "user-1", &[], -3_600);

    for token in [fresh, stale] {
        let response = pipeline.call(Some(&token)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key("x-new-access-token"));
    }

    assert_eq!(session.calls(), 0);
    assert_eq!(pipeline.hits(), 2);
}

// ============================================================================
// End to end with the refresh token store
// ============================================================================

fn with_refresh_token(uri: &str, access: &str, refresh: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("Authorization", format!("Bearer {}", access))
        .header("X-Refresh-Token", refresh)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_profile_request_renews_through_refresh_store() {
    let session = Arc::new(JwtSessionService::new(authenticator(), RefreshTokenStore::new()));
    let app = TestApp::new(session.clone());
    let user = app.add_user(&["Member"]);

    let refresh = session.issue_refresh_token(user.id.to_string(), user.roles.clone());
    let access = app.token_for(&user, 60);

    let response = app
        .router()
        .oneshot(with_refresh_token(
            &format!("/api/v1/users/{}", user.id),
            &access,
            &refresh,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let renewed = response.headers()["x-new-access-token"]
        .to_str()
        .unwrap()
        .to_string();
    let claims = app.authenticator.decode(&renewed).unwrap();
    assert_eq!(claims.sub.as_deref(), Some(user.id.to_string().as_str()));
    assert_eq!(claims.roles, vec!["Member"]);
    assert!(claims.expiry().timestamp().unwrap() > now() + 300);

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["id"], user.id.to_string());

    // The renewed token is fresh and needs no further renewal.
    let response = app
        .router()
        .oneshot(common::get(&format!("/api/v1/users/{}", user.id), Some(&renewed)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!response.headers().contains_key("x-new-access-token"));
}

#[tokio::test]
async fn test_revoked_refresh_token_is_rejected() {
    let session = Arc::new(JwtSessionService::new(authenticator(), RefreshTokenStore::new()));
    let app = TestApp::new(session.clone());
    let user = app.add_user(&["Member"]);

    let refresh = session.issue_refresh_token(user.id.to_string(), vec![]);
    assert!(session.revoke(&refresh));

    let response = app
        .router()
        .oneshot(with_refresh_token(
            &format!("/api/v1/users/{}", user.id),
            &app.token_for(&user, 30),
            &refresh,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(
        body["message"],
        "Session is no longer valid: refresh token has been revoked"
    );
}

#[tokio::test]
async fn test_missing_refresh_token_is_rejected_near_expiry() {
    let session = Arc::new(JwtSessionService::new(authenticator(), RefreshTokenStore::new()));
    let app = TestApp::new(session);
    let user = app.add_user(&["Member"]);

    let response = app
        .router()
        .oneshot(common::get(
            &format!("/api/v1/users/{}", user.id),
            Some(&app.token_for(&user, 30)),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_hard_expired_session_is_refused_downstream() {
    let session = StubSession::new(Behaviour::Issue);
    let app = TestApp::new(session.clone());
    let user = app.add_user(&["Member"]);

    let response = app
        .router()
        .oneshot(common::get(
            &format!("/api/v1/users/{}", user.id),
            Some(&app.token_for(&user, -600)),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(session.calls(), 0);
    let body = body_json(response).await;
    assert_eq!(body["message"], "The authentication token has expired");
}
