//! Configuration management.
//!
//! Values come from an optional file and from `LENDIT__`-prefixed
//! environment variables, e.g. `LENDIT__SESSION__GRACE_SECS=10`.

use serde::Deserialize;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "LENDIT";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Token signing and refresh configuration
    #[serde(default)]
    pub auth: JwtConfig,

    /// Session renewal thresholds
    #[serde(default)]
    pub session: SessionConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// HMAC signing secret
    pub jwt_secret: Option<String>,

    /// Expected `iss` claim
    pub issuer: Option<String>,

    /// Expected `aud` claim
    pub audience: Option<String>,

    /// Lifetime of minted access tokens
    #[serde(default = "default_access_token_ttl_secs")]
    pub access_token_ttl_secs: i64,

    /// Lifetime of issued refresh tokens
    #[serde(default = "default_refresh_token_ttl_secs")]
    pub refresh_token_ttl_secs: i64,

    /// Request header carrying the refresh token
    #[serde(default = "default_refresh_token_header")]
    pub refresh_token_header: String,

    /// Seconds between sweeps of expired and revoked refresh tokens
    #[serde(default = "default_refresh_purge_interval_secs")]
    pub refresh_purge_interval_secs: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            issuer: None,
            audience: None,
            access_token_ttl_secs: default_access_token_ttl_secs(),
            refresh_token_ttl_secs: default_refresh_token_ttl_secs(),
            refresh_token_header: default_refresh_token_header(),
            refresh_purge_interval_secs: default_refresh_purge_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Renew when this many seconds or fewer remain
    #[serde(default = "default_near_expiry_secs")]
    pub near_expiry_secs: i64,

    /// Still renew up to this many seconds after expiry
    #[serde(default = "default_grace_secs")]
    pub grace_secs: i64,

    /// Response header carrying a renewed access token
    #[serde(default = "default_new_token_header")]
    pub new_token_header: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            near_expiry_secs: default_near_expiry_secs(),
            grace_secs: default_grace_secs(),
            new_token_header: default_new_token_header(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
        }
    }
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_access_token_ttl_secs() -> i64 { 900 }
fn default_refresh_token_ttl_secs() -> i64 { 604_800 }
fn default_refresh_token_header() -> String { "X-Refresh-Token".to_string() }
fn default_refresh_purge_interval_secs() -> u64 { 300 }
fn default_near_expiry_secs() -> i64 { crate::session::inspector::DEFAULT_NEAR_EXPIRY_SECS }
fn default_grace_secs() -> i64 { crate::session::inspector::DEFAULT_GRACE_SECS }
fn default_new_token_header() -> String { crate::middleware::refresh::DEFAULT_NEW_TOKEN_HEADER.to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values the session pipeline cannot work with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.session.near_expiry_secs < 0 {
            anyhow::bail!("session.near_expiry_secs must not be negative");
        }
        if self.session.grace_secs < 0 {
            anyhow::bail!("session.grace_secs must not be negative");
        }
        if self.auth.access_token_ttl_secs <= 0 {
            anyhow::bail!("auth.access_token_ttl_secs must be positive");
        }
        if self.auth.refresh_token_ttl_secs <= 0 {
            anyhow::bail!("auth.refresh_token_ttl_secs must be positive");
        }
        if self.auth.refresh_purge_interval_secs == 0 {
            anyhow::bail!("auth.refresh_purge_interval_secs must be positive");
        }
        Ok(())
    }
}
