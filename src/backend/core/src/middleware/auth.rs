//! Bearer token authentication.
//!
//! Features:
//! - JWT decoding with configurable algorithm, issuer and audience
//! - Expiry is carried through untouched for the session inspector
//! - Per-request [`Principal`] injection
//! - Axum extractors for the principal and for a usable session
//!
//! # Example
//!
//! ```rust,ignore
//! use lendit_core::middleware::auth::{AuthConfig, AuthLayer, RequireSession};
//!
//! let config = AuthConfig::builder()
//!     .jwt_secret("your-secret-key")
//!     .build();
//!
//! let app = Router::new()
//!     .route("/api/v1/items", post(create_item))
//!     .layer(AuthLayer::from_config(config)?);
//! ```

use axum::{
    body::Body,
    extract::{FromRequestParts, Request},
    http::{request::Parts, HeaderMap},
    response::Response,
};
use chrono::{Duration, Utc};
use futures::future::BoxFuture;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use metrics::counter;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::{
    collections::HashSet,
    convert::Infallible,
    sync::Arc,
    task::{Context, Poll},
};
use thiserror::Error;
use tower::{Layer, Service};
use tracing::debug;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::error::LendError;
use crate::session::{ExpiryClaim, Principal, TokenInspector, TokenState};

// ═══════════════════════════════════════════════════════════════════════════════
// Error Types
// ═══════════════════════════════════════════════════════════════════════════════

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("JWT secret required for HMAC algorithms")]
    MissingSecret,

    #[error("Unsupported JWT algorithm: {0:?}")]
    UnsupportedAlgorithm(Algorithm),

    #[error("Invalid authentication token: {0}")]
    InvalidToken(String),

    #[error("Failed to generate token: {0}")]
    Encoding(String),
}

impl From<AuthError> for LendError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::InvalidToken(_) => {
                LendError::unauthenticated("The provided token is invalid").with_source(error)
            }
            AuthError::MissingSecret | AuthError::UnsupportedAlgorithm(_) => {
                LendError::configuration(error.to_string())
            }
            AuthError::Encoding(_) => LendError::internal(error.to_string()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// JWT Claims
// ═══════════════════════════════════════════════════════════════════════════════

/// JWT token claims.
///
/// `sub` and `exp` are kept loosely typed: a token with a malformed subject
/// or expiry still decodes, and the authorization engine and session
/// inspector decide what to make of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// User roles; a single string is accepted as a one-element list
    #[serde(default, deserialize_with = "one_or_many")]
    pub roles: Vec<String>,

    /// Token ID
    #[serde(default = "generate_jti")]
    pub jti: String,

    /// Issued at timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Expiration, as presented
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<Value>,

    /// Issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Audience
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

fn generate_jti() -> String {
    Uuid::new_v4().to_string()
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Null,
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(role) => vec![role],
        OneOrMany::Many(roles) => roles,
        OneOrMany::Null => Vec::new(),
    })
}

impl Claims {
    /// Create claims with builder pattern.
    pub fn builder(subject: impl Into<String>) -> ClaimsBuilder {
        ClaimsBuilder::new(subject)
    }

    /// Interpret the `exp` claim.
    pub fn expiry(&self) -> ExpiryClaim {
        ExpiryClaim::from_json(self.exp.as_ref())
    }

    /// Build the request principal carried by these claims.
    pub fn into_principal(self, token: impl Into<String>) -> Principal {
        let expiry = self.expiry();
        Principal::builder()
            .maybe_subject(self.sub)
            .roles(self.roles)
            .expiry(expiry)
            .token(token)
            .build()
    }
}

/// Builder for JWT claims.
pub struct ClaimsBuilder {
    claims: Claims,
}

impl ClaimsBuilder {
    pub fn new(subject: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            claims: Claims {
                sub: Some(subject.into()),
                roles: Vec::new(),
                jti: generate_jti(),
                iat: Some(now.timestamp()),
                exp: Some(Value::from((now + Duration::hours(1)).timestamp())),
                iss: None,
                aud: None,
            },
        }
    }

    pub fn roles(mut self, roles: Vec<String>) -> Self {
        self.claims.roles = roles;
        self
    }

    pub fn add_role(mut self, role: impl Into<String>) -> Self {
        self.claims.roles.push(role.into());
        self
    }

    pub fn expires_in(mut self, duration: Duration) -> Self {
        self.claims.exp = Some(Value::from((Utc::now() + duration).timestamp()));
        self
    }

    pub fn expires_at(mut self, secs: i64) -> Self {
        self.claims.exp = Some(Value::from(secs));
        self
    }

    /// Set a raw `exp` value, or remove the claim with `None`.
    pub fn raw_expiry(mut self, exp: Option<Value>) -> Self {
        self.claims.exp = exp;
        self
    }

    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.claims.iss = Some(issuer.into());
        self
    }

    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.claims.aud = Some(audience.into());
        self
    }

    pub fn build(self) -> Claims {
        self.claims
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// Authentication configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// JWT secret key (for HS256/HS384/HS512)
    pub jwt_secret: Option<String>,

    /// JWT algorithm
    pub jwt_algorithm: Algorithm,

    /// Token issuer for validation
    pub issuer: Option<String>,

    /// Token audience for validation
    pub audience: Option<String>,

    /// Header name for JWT
    pub jwt_header: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_algorithm: Algorithm::HS256,
            issuer: None,
            audience: None,
            jwt_header: "Authorization".to_string(),
        }
    }
}

impl AuthConfig {
    /// Create a new builder.
    pub fn builder() -> AuthConfigBuilder {
        AuthConfigBuilder::default()
    }
}

impl From<&JwtConfig> for AuthConfig {
    fn from(config: &JwtConfig) -> Self {
        Self {
            jwt_secret: config.jwt_secret.clone(),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            ..Default::default()
        }
    }
}

/// Builder for auth configuration.
#[derive(Default)]
pub struct AuthConfigBuilder {
    config: AuthConfig,
}

impl AuthConfigBuilder {
    pub fn jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.jwt_secret = Some(secret.into());
        self
    }

    pub fn jwt_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.config.jwt_algorithm = algorithm;
        self
    }

    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.config.issuer = Some(issuer.into());
        self
    }

    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.config.audience = Some(audience.into());
        self
    }

    pub fn jwt_header(mut self, header: impl Into<String>) -> Self {
        self.config.jwt_header = header.into();
        self
    }

    pub fn build(self) -> AuthConfig {
        self.config
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Authenticator
// ═══════════════════════════════════════════════════════════════════════════════

/// Decodes bearer tokens into principals and signs new ones.
pub struct Authenticator {
    config: AuthConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl Authenticator {
    /// Create a new authenticator.
    pub fn new(config: AuthConfig) -> Result<Self, AuthError> {
        let (encoding_key, decoding_key) = match config.jwt_algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                let secret = config
                    .jwt_secret
                    .as_ref()
                    .filter(|s| !s.is_empty())
                    .ok_or(AuthError::MissingSecret)?;

                (
                    EncodingKey::from_secret(secret.as_bytes()),
                    DecodingKey::from_secret(secret.as_bytes()),
                )
            }
            other => return Err(AuthError::UnsupportedAlgorithm(other)),
        };

        // Expiry belongs to the session inspector, not to signature checks.
        let mut validation = Validation::new(config.jwt_algorithm);
        validation.validate_exp = false;

        let mut required = HashSet::new();
        if let Some(ref issuer) = config.issuer {
            validation.set_issuer(&[issuer]);
            required.insert("iss".to_string());
        }

        match config.audience {
            Some(ref audience) => {
                validation.set_audience(&[audience]);
                required.insert("aud".to_string());
            }
            None => validation.validate_aud = false,
        }
        validation.required_spec_claims = required;

        Ok(Self {
            config,
            encoding_key,
            decoding_key,
            validation,
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Extract the bearer token from headers.
    pub fn extract_bearer<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        headers
            .get(self.config.jwt_header.as_str())
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer ").or_else(|| s.strip_prefix("bearer ")))
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Verify a token and return its claims.
    pub fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }

    /// Build the principal for a request.
    ///
    /// A missing header or a token that fails verification yields an
    /// anonymous principal; rejecting it is left to downstream gates.
    pub fn principal_from_headers(&self, headers: &HeaderMap) -> Principal {
        let Some(token) = self.extract_bearer(headers) else {
            return Principal::anonymous();
        };

        match self.decode(token) {
            Ok(claims) => {
                counter!("lendit_auth_total", "outcome" => "verified").increment(1);
                claims.into_principal(token)
            }
            Err(e) => {
                debug!(error = %e, "Bearer token failed verification");
                counter!("lendit_auth_total", "outcome" => "rejected").increment(1);
                Principal::anonymous()
            }
        }
    }

    /// Sign a new token. Issuer and audience default to the configured ones.
    pub fn generate_token(&self, claims: &Claims) -> Result<String, AuthError> {
        let mut claims = claims.clone();
        if claims.iss.is_none() {
            claims.iss = self.config.issuer.clone();
        }
        if claims.aud.is_none() {
            claims.aud = self.config.audience.clone();
        }

        let header = Header::new(self.config.jwt_algorithm);
        encode(&header, &claims, &self.encoding_key).map_err(|e| AuthError::Encoding(e.to_string()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer and Service
// ═══════════════════════════════════════════════════════════════════════════════

/// Authentication layer for Tower.
///
/// Installs the request [`Principal`] and the [`TokenInspector`] that
/// downstream gates classify it with.
#[derive(Clone)]
pub struct AuthLayer {
    authenticator: Arc<Authenticator>,
    inspector: TokenInspector,
}

impl AuthLayer {
    /// Create a new auth layer with the default session thresholds.
    pub fn new(authenticator: Arc<Authenticator>) -> Self {
        Self {
            authenticator,
            inspector: TokenInspector::default(),
        }
    }

    /// Classify sessions with these thresholds.
    pub fn with_inspector(mut self, inspector: TokenInspector) -> Self {
        self.inspector = inspector;
        self
    }

    /// Create from configuration.
    pub fn from_config(config: AuthConfig) -> Result<Self, AuthError> {
        let authenticator = Authenticator::new(config)?;
        Ok(Self::new(Arc::new(authenticator)))
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            authenticator: self.authenticator.clone(),
            inspector: self.inspector,
        }
    }
}

/// Authentication service.
#[derive(Clone)]
pub struct AuthService<S> {
    inner: S,
    authenticator: Arc<Authenticator>,
    inspector: TokenInspector,
}

impl<S> Service<Request<Body>> for AuthService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let principal = self.authenticator.principal_from_headers(request.headers());
        request.extensions_mut().insert(principal);
        request.extensions_mut().insert(self.inspector);

        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(request).await })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Axum Extractors
// ═══════════════════════════════════════════════════════════════════════════════

/// The request principal; anonymous when no layer installed one.
#[axum::async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Principal>()
            .cloned()
            .unwrap_or_default())
    }
}

/// Guard that requires a usable session.
///
/// Uses the [`TokenState`] recorded by the refresh orchestrator. Without
/// one, classifies afresh with the [`TokenInspector`] installed by
/// [`AuthLayer`], falling back to the default thresholds.
pub struct RequireSession(pub Principal);

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequireSession
where
    S: Send + Sync,
{
    type Rejection = LendError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let principal = parts
            .extensions
            .get::<Principal>()
            .cloned()
            .unwrap_or_default();

        let state = parts
            .extensions
            .get::<TokenState>()
            .copied()
            .unwrap_or_else(|| {
                parts
                    .extensions
                    .get::<TokenInspector>()
                    .copied()
                    .unwrap_or_default()
                    .classify(&principal)
            });

        match state {
            TokenState::Unauthenticated => {
                Err(LendError::unauthenticated("Authentication credentials are required"))
            }
            TokenState::HardExpired => {
                Err(LendError::unauthenticated("The authentication token has expired"))
            }
            TokenState::MalformedClaim => Err(LendError::unauthenticated(
                "The authentication token carries a malformed expiry",
            )),
            TokenState::Fresh | TokenState::NearExpiry | TokenState::GracePeriodExpired => {
                Ok(RequireSession(principal))
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
