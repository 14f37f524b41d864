//! Sliding-session token refresh.
//!
//! Runs once per request, before the handler:
//!
//! ```text
//!   classify ──┬── NearExpiry / GracePeriodExpired ── renew ──┬── ok ──────── next ── attach token
//!              │                                              ├── rejected ── 401 (next not called)
//!              │                                              └── error ───── next
//!              └── anything else ───────────────────────────────────────────── next
//! ```
//!
//! The renewed credential is written to the response as
//! `X-New-Access-Token` and `X-New-Access-Token-Expires` (names
//! configurable). Both headers are set together or not at all.

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use metrics::counter;
use std::{
    future::Future,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::{error, info, warn};

use crate::config::SessionConfig;
use crate::error::{LendError, Result};
use crate::session::{
    IssuedToken, Principal, RefreshRequest, SessionError, SessionPolicy, SessionService,
    TokenInspector, TokenState,
};

/// Default response header carrying a renewed access token.
pub const DEFAULT_NEW_TOKEN_HEADER: &str = "X-New-Access-Token";

// ═══════════════════════════════════════════════════════════════════════════════
// Outcome
// ═══════════════════════════════════════════════════════════════════════════════

/// What the orchestrator did with the request's credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// No renewal was warranted.
    NotAttempted(TokenState),
    Renewed(IssuedToken),
    /// The session service declared the session invalid.
    RenewalRejected(String),
    /// Renewal failed for another reason and was swallowed.
    RenewalFailed(String),
}

impl RefreshOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotAttempted(_) => "not_attempted",
            Self::Renewed(_) => "renewed",
            Self::RenewalRejected(_) => "rejected",
            Self::RenewalFailed(_) => "failed",
        }
    }

    /// Whether the handler must be skipped.
    pub fn short_circuits(&self) -> bool {
        matches!(self, Self::RenewalRejected(_))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Refresher
// ═══════════════════════════════════════════════════════════════════════════════

/// The token refresh orchestrator.
pub struct TokenRefresher {
    inspector: TokenInspector,
    session: Arc<dyn SessionService>,
    token_header: HeaderName,
    expires_header: HeaderName,
}

impl TokenRefresher {
    /// Create a refresher with the default thresholds and header names.
    pub fn new(session: Arc<dyn SessionService>) -> Self {
        Self {
            inspector: TokenInspector::default(),
            session,
            token_header: HeaderName::from_static("x-new-access-token"),
            expires_header: HeaderName::from_static("x-new-access-token-expires"),
        }
    }

    /// Build from the `[session]` configuration section.
    pub fn from_config(session: Arc<dyn SessionService>, config: &SessionConfig) -> Result<Self> {
        Self::new(session)
            .with_policy(SessionPolicy::from(config))
            .with_token_header(&config.new_token_header)
    }

    pub fn with_policy(mut self, policy: SessionPolicy) -> Self {
        self.inspector = TokenInspector::new(policy);
        self
    }

    /// Set the token header; the expiry header is `<name>-Expires`.
    pub fn with_token_header(mut self, name: &str) -> Result<Self> {
        let invalid = |e: axum::http::header::InvalidHeaderName| {
            LendError::configuration(format!("invalid session header name '{}': {}", name, e))
        };
        self.token_header = HeaderName::from_bytes(name.as_bytes()).map_err(invalid)?;
        self.expires_header =
            HeaderName::from_bytes(format!("{}-Expires", name).as_bytes()).map_err(invalid)?;
        Ok(self)
    }

    pub fn inspector(&self) -> &TokenInspector {
        &self.inspector
    }

    pub fn token_header(&self) -> &HeaderName {
        &self.token_header
    }

    pub fn expires_header(&self) -> &HeaderName {
        &self.expires_header
    }

    /// Classify the request's credential and renew it when warranted.
    ///
    /// Makes at most one call to the session service.
    pub async fn renew(&self, principal: &Principal, headers: &HeaderMap) -> RefreshOutcome {
        let state = self.inspector.classify(principal);
        self.renew_classified(state, principal, headers).await
    }

    async fn renew_classified(
        &self,
        state: TokenState,
        principal: &Principal,
        headers: &HeaderMap,
    ) -> RefreshOutcome {
        if !state.is_renewable() {
            return RefreshOutcome::NotAttempted(state);
        }

        let attempt = RefreshRequest { principal, headers };

        let outcome = match self.session.refresh_token(attempt).await {
            Ok(token) => {
                info!(
                    user_id = ?principal.subject(),
                    token_state = %state,
                    expires_at = token.expires_at,
                    "Access token renewed"
                );
                RefreshOutcome::Renewed(token)
            }
            Err(SessionError::SessionInvalid(reason)) => {
                warn!(
                    user_id = ?principal.subject(),
                    token_state = %state,
                    reason = %reason,
                    "Token renewal rejected, session is no longer valid"
                );
                RefreshOutcome::RenewalRejected(reason)
            }
            Err(e) => {
                error!(
                    user_id = ?principal.subject(),
                    token_state = %state,
                    error = %e,
                    "Token renewal failed, continuing with current credential"
                );
                RefreshOutcome::RenewalFailed(e.to_string())
            }
        };

        counter!("lendit_token_refresh_total", "outcome" => outcome.as_str()).increment(1);
        outcome
    }

    /// Run the orchestrator around `next`.
    ///
    /// The request's [`TokenState`] is recorded in its extensions for
    /// downstream gates such as
    /// [`RequireSession`](crate::middleware::auth::RequireSession).
    pub async fn handle<F, Fut, E>(
        &self,
        mut request: Request,
        next: F,
    ) -> std::result::Result<Response, E>
    where
        F: FnOnce(Request) -> Fut,
        Fut: Future<Output = std::result::Result<Response, E>>,
    {
        let principal = request
            .extensions()
            .get::<Principal>()
            .cloned()
            .unwrap_or_default();

        let state = self.inspector.classify(&principal);
        request.extensions_mut().insert(state);

        let outcome = self
            .renew_classified(state, &principal, request.headers())
            .await;

        match outcome {
            RefreshOutcome::RenewalRejected(reason) => Ok(LendError::session_invalid(format!(
                "Session is no longer valid: {}",
                reason
            ))
            .into_response()),
            RefreshOutcome::Renewed(token) => {
                let mut response = next(request).await?;
                self.attach(&mut response, &token);
                Ok(response)
            }
            RefreshOutcome::NotAttempted(_) | RefreshOutcome::RenewalFailed(_) => {
                next(request).await
            }
        }
    }

    fn attach(&self, response: &mut Response, token: &IssuedToken) {
        let values = HeaderValue::from_str(&token.access_token)
            .and_then(|t| HeaderValue::from_str(&token.expires_at.to_string()).map(|e| (t, e)));

        match values {
            Ok((token_value, expires_value)) => {
                let headers = response.headers_mut();
                headers.insert(self.token_header.clone(), token_value);
                headers.insert(self.expires_header.clone(), expires_value);
            }
            Err(e) => {
                error!(error = %e, "Renewed token is not a valid header value, dropping it");
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer and Service
// ═══════════════════════════════════════════════════════════════════════════════

/// Token refresh layer for Tower.
#[derive(Clone)]
pub struct TokenRefreshLayer {
    refresher: Arc<TokenRefresher>,
}

impl TokenRefreshLayer {
    pub fn new(refresher: Arc<TokenRefresher>) -> Self {
        Self { refresher }
    }
}

impl<S> Layer<S> for TokenRefreshLayer {
    type Service = TokenRefreshService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TokenRefreshService {
            inner,
            refresher: self.refresher.clone(),
        }
    }
}

/// Token refresh service.
#[derive(Clone)]
pub struct TokenRefreshService<S> {
    inner: S,
    refresher: Arc<TokenRefresher>,
}

impl<S> Service<Request<Body>> for TokenRefreshService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, std::result::Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let refresher = self.refresher.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            refresher
                .handle(request, move |request| inner.call(request))
                .await
        })
    }
}
