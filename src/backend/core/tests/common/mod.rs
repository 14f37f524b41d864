//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
};
use lendit_core::api::{AppState, LendingDirectory, UserProfile};
use lendit_core::middleware::{AuthConfig, Authenticator, Claims, TokenRefresher};
use lendit_core::rbac::AuthorizationEngine;
use lendit_core::session::{IssuedToken, RefreshRequest, SessionError, SessionService};
use serde_json::Value;
use uuid::Uuid;

pub const SECRET: &str = "integration-test-secret-0123456789";

pub fn authenticator() -> Arc<Authenticator> {
    Arc::new(
        Authenticator::new(AuthConfig::builder().jwt_secret(SECRET).build())
            .expect("HMAC authenticator"),
    )
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Sign an access token for `subject` expiring `expires_in` seconds from now.
pub fn mint(auth: &Authenticator, subject: &str, roles: &[&str], expires_in: i64) -> String {
    let claims = Claims::builder(subject)
        .roles(roles.iter().map(|r| r.to_string()).collect())
        .expires_at(now() + expires_in)
        .build();
    auth.generate_token(&claims).expect("token")
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    builder.body(Body::empty()).expect("request")
}

pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

pub fn assert_status(response: &Response, status: StatusCode) {
    assert_eq!(response.status(), status, "unexpected status");
}

// ============================================================================
// Session service double
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub enum Behaviour {
    Issue,
    Reject,
    Unavailable,
}

/// Counts renewal calls and answers according to its [`Behaviour`].
pub struct StubSession {
    behaviour: Behaviour,
    calls: AtomicUsize,
}

impl StubSession {
    pub fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionService for StubSession {
    async fn refresh_token(&self, _request: RefreshRequest<'_>) -> Result<IssuedToken, SessionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::Issue => Ok(IssuedToken {
                access_token: "renewed-access-token".to_string(),
                expires_at: now() + 900,
            }),
            Behaviour::Reject => Err(SessionError::SessionInvalid("refresh token revoked".into())),
            Behaviour::Unavailable => Err(SessionError::Unavailable("session store offline".into())),
        }
    }
}

// ============================================================================
// Application fixture
// ============================================================================

pub struct TestApp {
    pub state: AppState,
    pub authenticator: Arc<Authenticator>,
}

impl TestApp {
    pub fn new(session: Arc<dyn SessionService>) -> Self {
        let authenticator = authenticator();
        let state = AppState {
            engine: AuthorizationEngine::with_defaults(),
            directory: LendingDirectory::new(),
            authenticator: authenticator.clone(),
            refresher: Arc::new(TokenRefresher::new(session)),
            metrics: None,
        };
        Self {
            state,
            authenticator,
        }
    }

    pub fn router(&self) -> axum::Router {
        lendit_core::api::build_router(self.state.clone())
    }

    pub fn add_user(&self, roles: &[&str]) -> UserProfile {
        let user = UserProfile {
            id: Uuid::new_v4(),
            display_name: "Test User".to_string(),
            email: "user@example.com".to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        };
        self.state.directory.insert_user(user.clone());
        user
    }

    pub fn token_for(&self, user: &UserProfile, expires_in: i64) -> String {
        let roles: Vec<&str> = user.roles.iter().map(String::as_str).collect();
        mint(&self.authenticator, &user.id.to_string(), &roles, expires_in)
    }
}
