//! Session renewal service.
//!
//! The token refresh orchestrator talks to renewal through the
//! [`SessionService`] trait. [`JwtSessionService`] is the default
//! implementation: opaque refresh tokens kept in an in-memory store,
//! exchanged for freshly signed access tokens.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use super::principal::Principal;
use crate::config::JwtConfig;
use crate::middleware::auth::{Authenticator, Claims};

// ═══════════════════════════════════════════════════════════════════════════════
// Contract
// ═══════════════════════════════════════════════════════════════════════════════

/// Failures of a renewal attempt.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The refresh credential itself is missing, expired or revoked.
    #[error("Session is no longer valid: {0}")]
    SessionInvalid(String),

    /// Anything else; the orchestrator treats it as transient.
    #[error("Session renewal failed: {0}")]
    Unavailable(String),
}

/// A newly minted access credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub access_token: String,
    /// Unix-epoch seconds.
    pub expires_at: i64,
}

/// What a renewal attempt can see of the in-flight request.
#[derive(Debug, Clone, Copy)]
pub struct RefreshRequest<'a> {
    pub principal: &'a Principal,
    pub headers: &'a HeaderMap,
}

/// Mints replacement access tokens.
#[async_trait]
pub trait SessionService: Send + Sync {
    /// Renew the caller's access token. Called at most once per request.
    async fn refresh_token(&self, request: RefreshRequest<'_>) -> Result<IssuedToken, SessionError>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Refresh token store
// ═══════════════════════════════════════════════════════════════════════════════

/// A stored refresh token.
#[derive(Debug, Clone)]
pub struct RefreshRecord {
    pub subject: String,
    pub roles: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

impl RefreshRecord {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Thread-safe refresh token store.
#[derive(Debug, Clone, Default)]
pub struct RefreshTokenStore {
    tokens: Arc<DashMap<String, RefreshRecord>>,
}

impl RefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, token: impl Into<String>, record: RefreshRecord) {
        self.tokens.insert(token.into(), record);
    }

    pub fn get(&self, token: &str) -> Option<RefreshRecord> {
        self.tokens.get(token).map(|r| r.clone())
    }

    /// Mark a token revoked. Returns `false` if it is unknown.
    pub fn revoke(&self, token: &str) -> bool {
        match self.tokens.get_mut(token) {
            Some(mut record) => {
                record.revoked = true;
                true
            }
            None => false,
        }
    }

    /// Drop expired and revoked tokens.
    pub fn purge_expired(&self) -> usize {
        let before = self.tokens.len();
        self.tokens.retain(|_, record| !record.revoked && !record.is_expired());
        before - self.tokens.len()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Sweep the store every `period` on the current runtime.
    ///
    /// The task runs until its handle is aborted or the runtime shuts down.
    pub fn spawn_purge_task(&self, period: std::time::Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let purged = store.purge_expired();
                if purged > 0 {
                    info!(purged, remaining = store.len(), "Purged refresh tokens");
                } else {
                    debug!(remaining = store.len(), "No refresh tokens to purge");
                }
            }
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// JWT-backed session service
// ═══════════════════════════════════════════════════════════════════════════════

/// Default refresh token header.
pub const DEFAULT_REFRESH_TOKEN_HEADER: &str = "X-Refresh-Token";

/// Exchanges stored refresh tokens for new signed access tokens.
///
/// This crate exposes no login route. The login flow that authenticates
/// credentials lives outside it and populates the store, either through
/// [`JwtSessionService::issue_refresh_token`] or by inserting into a shared
/// [`RefreshTokenStore`].
pub struct JwtSessionService {
    authenticator: Arc<Authenticator>,
    store: RefreshTokenStore,
    refresh_header: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtSessionService {
    pub fn new(authenticator: Arc<Authenticator>, store: RefreshTokenStore) -> Self {
        Self {
            authenticator,
            store,
            refresh_header: DEFAULT_REFRESH_TOKEN_HEADER.to_string(),
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
        }
    }

    /// Build from the `[auth]` configuration section.
    pub fn from_config(
        authenticator: Arc<Authenticator>,
        store: RefreshTokenStore,
        config: &JwtConfig,
    ) -> Self {
        Self::new(authenticator, store)
            .with_refresh_header(config.refresh_token_header.clone())
            .with_access_ttl(Duration::seconds(config.access_token_ttl_secs))
            .with_refresh_ttl(Duration::seconds(config.refresh_token_ttl_secs))
    }

    pub fn with_refresh_header(mut self, header: impl Into<String>) -> Self {
        self.refresh_header = header.into();
        self
    }

    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    pub fn store(&self) -> &RefreshTokenStore {
        &self.store
    }

    /// Issue a refresh token for a subject. The returned string is opaque.
    ///
    /// Called by the external login flow after it has verified credentials.
    pub fn issue_refresh_token(&self, subject: impl Into<String>, roles: Vec<String>) -> String {
        let token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        self.store.insert(
            token.clone(),
            RefreshRecord {
                subject: subject.into(),
                roles,
                expires_at: Utc::now() + self.refresh_ttl,
                revoked: false,
            },
        );
        token
    }

    /// Revoke a refresh token.
    pub fn revoke(&self, token: &str) -> bool {
        self.store.revoke(token)
    }

    fn lookup(&self, headers: &HeaderMap) -> Result<RefreshRecord, SessionError> {
        let token = headers
            .get(self.refresh_header.as_str())
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SessionError::SessionInvalid("refresh token is missing".into()))?;

        let record = self
            .store
            .get(token)
            .ok_or_else(|| SessionError::SessionInvalid("refresh token is not recognised".into()))?;

        if record.revoked {
            return Err(SessionError::SessionInvalid("refresh token has been revoked".into()));
        }
        if record.is_expired() {
            return Err(SessionError::SessionInvalid("refresh token has expired".into()));
        }

        Ok(record)
    }
}

#[async_trait]
impl SessionService for JwtSessionService {
    async fn refresh_token(&self, request: RefreshRequest<'_>) -> Result<IssuedToken, SessionError> {
        let record = self.lookup(request.headers)?;

        if request.principal.subject() != Some(record.subject.as_str()) {
            return Err(SessionError::SessionInvalid(
                "refresh token was issued to a different subject".into(),
            ));
        }

        let claims = Claims::builder(record.subject.clone())
            .roles(record.roles.clone())
            .expires_in(self.access_ttl)
            .build();
        let expires_at = claims.expiry().timestamp().unwrap_or_default();

        let access_token = self
            .authenticator
            .generate_token(&claims)
            .map_err(|e| SessionError::Unavailable(e.to_string()))?;

        debug!(subject = %record.subject, expires_at, "Minted renewed access token");

        Ok(IssuedToken {
            access_token,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::auth::AuthConfig;

    fn service() -> JwtSessionService {
        let config = AuthConfig::builder()
            .jwt_secret("session-service-test-secret")
            .build();
        let authenticator = Arc::new(Authenticator::new(config).unwrap());
        JwtSessionService::new(authenticator, RefreshTokenStore::new())
    }

    fn principal(subject: &str) -> Principal {
        Principal::builder().subject(subject).build()
    }

    fn headers_with(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(DEFAULT_REFRESH_TOKEN_HEADER, token.parse().unwrap());
        headers
    }

    #[tokio::test]
    async fn test_refresh_mints_token_for_subject() {
        let service = service();
        let token = service.issue_refresh_token("alice", vec!["Member".to_string()]);
        let headers = headers_with(&token);
        let principal = principal("alice");

        let issued = service
            .refresh_token(RefreshRequest { principal: &principal, headers: &headers })
            .await
            .unwrap();

        assert!(!issued.access_token.is_empty());
        assert!(issued.expires_at > Utc::now().timestamp());
    }

    #[tokio::test]
    async fn test_missing_refresh_token_is_session_invalid() {
        let service = service();
        let headers = HeaderMap::new();
        let principal = principal("alice");

        let err = service
            .refresh_token(RefreshRequest { principal: &principal, headers: &headers })
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::SessionInvalid(_)));
    }

    #[tokio::test]
    async fn test_revoked_refresh_token_is_session_invalid() {
        let service = service();
        let token = service.issue_refresh_token("alice", vec![]);
        assert!(service.revoke(&token));

        let headers = headers_with(&token);
        let principal = principal("alice");
        let err = service
            .refresh_token(RefreshRequest { principal: &principal, headers: &headers })
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::SessionInvalid(ref m) if m.contains("revoked")));
    }

    #[tokio::test]
    async fn test_expired_refresh_token_is_session_invalid() {
        let service = service().with_refresh_ttl(Duration::seconds(-1));
        let token = service.issue_refresh_token("alice", vec![]);

        let headers = headers_with(&token);
        let principal = principal("alice");
        let err = service
            .refresh_token(RefreshRequest { principal: &principal, headers: &headers })
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::SessionInvalid(ref m) if m.contains("expired")));
    }

    #[tokio::test]
    async fn test_refresh_token_bound_to_subject() {
        let service = service();
        let token = service.issue_refresh_token("alice", vec![]);

        let headers = headers_with(&token);
        let principal = principal("mallory");
        let err = service
            .refresh_token(RefreshRequest { principal: &principal, headers: &headers })
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::SessionInvalid(_)));
    }

    #[test]
    fn test_purge_expired() {
        let store = RefreshTokenStore::new();
        store.insert(
            "live",
            RefreshRecord {
                subject: "a".into(),
                roles: vec![],
                expires_at: Utc::now() + Duration::hours(1),
                revoked: false,
            },
        );
        store.insert(
            "stale",
            RefreshRecord {
                subject: "b".into(),
                roles: vec![],
                expires_at: Utc::now() - Duration::hours(1),
                revoked: false,
            },
        );
        store.insert(
            "revoked",
            RefreshRecord {
                subject: "c".into(),
                roles: vec![],
                expires_at: Utc::now() + Duration::hours(1),
                revoked: true,
            },
        );

        assert_eq!(store.purge_expired(), 2);
        assert_eq!(store.len(), 1);
        assert!(store.get("live").is_some());
    }

    #[tokio::test]
    async fn test_purge_task_sweeps_store() {
        let store = RefreshTokenStore::new();
        store.insert(
            "stale",
            RefreshRecord {
                subject: "b".into(),
                roles: vec![],
                expires_at: Utc::now() - Duration::hours(1),
                revoked: false,
            },
        );

        let handle = store.spawn_purge_task(std::time::Duration::from_millis(10));
        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        handle.abort();

        assert!(store.is_empty());
    }
}
