//! Error handling for Lendit Core.
//!
//! This module provides:
//! - The crate-wide [`LendError`] type with a stable [`ErrorCode`]
//! - HTTP status mapping used by the exception boundary
//! - Severity-driven logging with tracing integration
//! - Metrics integration for error tracking
//!
//! Handlers return `Result<T, LendError>`. Converting a `LendError` into a
//! response does not render a body: it tags the response with the failure
//! and leaves rendering to the outermost
//! [`ExceptionBoundaryLayer`](crate::middleware::ExceptionBoundaryLayer),
//! so every failure is logged and written exactly once.
//!
//! # Usage
//!
//! ```rust,ignore
//! use lendit_core::error::{LendError, Result, ErrorContext};
//!
//! fn load_item(raw: &str) -> Result<Item> {
//!     let id = uuid::Uuid::parse_str(raw)
//!         .with_error_code(ErrorCode::InvalidArgument)?;
//!     directory.item(id).context("Item not found")
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Lendit operations.
pub type Result<T> = std::result::Result<T, LendError>;

/// Message returned to clients for every unclassified failure.
pub const GENERIC_ERROR_MESSAGE: &str = "An internal error occurred";

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
///
/// These codes are stable and can be used by clients for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Session / authentication (4000-4099)
    SessionInvalid,
    Unauthenticated,
    AuthorizationFailed,
    AccessDenied,

    // Validation (4100-4199)
    ValidationFailed,
    InvalidArgument,
    InvalidOperation,

    // Lookup (4200-4299)
    NotFound,

    // Serialization (2200-2299)
    SerializationError,

    // Configuration (5000-5099)
    ConfigurationError,

    // Internal (9000-9099)
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::SessionInvalid => 4000,
            Self::Unauthenticated => 4001,
            Self::AuthorizationFailed => 4002,
            Self::AccessDenied => 4003,

            Self::ValidationFailed => 4100,
            Self::InvalidArgument => 4101,
            Self::InvalidOperation => 4102,

            Self::NotFound => 4200,

            Self::SerializationError => 2200,

            Self::ConfigurationError => 5000,

            Self::InternalError => 9000,
        }
    }

    /// Get the HTTP status code for this error.
    pub const fn http_status(&self) -> StatusCode {
        match self {
            // A rejected session and a terminally failed authorization both
            // mean the caller's identity is unusable.
            Self::SessionInvalid | Self::Unauthenticated | Self::AuthorizationFailed => {
                StatusCode::UNAUTHORIZED
            }

            Self::AccessDenied => StatusCode::FORBIDDEN,

            Self::ValidationFailed | Self::InvalidArgument | Self::InvalidOperation => {
                StatusCode::BAD_REQUEST
            }

            Self::NotFound => StatusCode::NOT_FOUND,

            Self::SerializationError | Self::ConfigurationError | Self::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether this failure is unclassified, i.e. its detail must not reach
    /// the client's `message` field.
    pub const fn is_unclassified(&self) -> bool {
        matches!(
            self,
            Self::SerializationError | Self::ConfigurationError | Self::InternalError
        )
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            4000..=4099 => "authentication",
            4100..=4199 => "validation",
            4200..=4299 => "lookup",
            2200..=2299 => "serialization",
            5000..=5099 => "configuration",
            9000..=9099 => "internal",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Expected client errors (bad input, missing records)
    Low,
    /// Rejected credentials and denied access
    Medium,
    /// Misconfiguration
    High,
    /// Unclassified failures
    Critical,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::ValidationFailed
            | ErrorCode::InvalidArgument
            | ErrorCode::InvalidOperation
            | ErrorCode::NotFound => Self::Low,

            ErrorCode::SessionInvalid
            | ErrorCode::Unauthenticated
            | ErrorCode::AuthorizationFailed
            | ErrorCode::AccessDenied => Self::Medium,

            ErrorCode::ConfigurationError => Self::High,

            ErrorCode::SerializationError | ErrorCode::InternalError => Self::Critical,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Lendit Core.
#[derive(Error, Debug)]
pub struct LendError {
    /// Machine-readable error code
    code: ErrorCode,

    /// Message safe to expose to clients
    user_message: Cow<'static, str>,

    /// Raw failure detail (for logging and the unclassified `errors` list)
    internal_message: Option<String>,

    /// Sub-messages (e.g. one per failed validation rule)
    errors: Option<Vec<String>>,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for LendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl LendError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            errors: None,
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an unclassified internal error (500).
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::InternalError, GENERIC_ERROR_MESSAGE, message)
    }

    /// Create a not found error.
    pub fn not_found(entity_type: impl fmt::Display, entity_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::NotFound,
            format!("{} not found: {}", entity_type, entity_id),
        )
    }

    /// Create a validation error carrying one sub-message per violated rule.
    pub fn validation(message: impl Into<Cow<'static, str>>, errors: Vec<String>) -> Self {
        let mut error = Self::new(ErrorCode::ValidationFailed, message);
        error.errors = Some(errors);
        error
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    /// Create an invalid operation error.
    pub fn invalid_operation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::InvalidOperation, message)
    }

    /// Create an access denied error.
    pub fn forbidden(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::AccessDenied, message)
    }

    /// Create an error for requests without a usable credential.
    pub fn unauthenticated(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::Unauthenticated, message)
    }

    /// Create an error for a session whose refresh credential was rejected.
    pub fn session_invalid(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::SessionInvalid, message)
    }

    /// Create an error for a terminally failed authorization decision.
    pub fn authorization_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::AuthorizationFailed, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::ConfigurationError,
            "Configuration error occurred",
            message,
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Add internal message.
    pub fn with_internal_message(mut self, message: impl Into<String>) -> Self {
        self.internal_message = Some(message.into());
        self
    }

    /// Attach sub-messages.
    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = Some(errors);
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the user-facing message.
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Get the internal message (if any).
    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    /// Get the attached sub-messages (if any).
    pub fn errors(&self) -> Option<&[String]> {
        self.errors.as_deref()
    }

    /// The raw failure detail: the internal message when present, otherwise
    /// the user message.
    pub fn detail(&self) -> &str {
        self.internal_message
            .as_deref()
            .unwrap_or(&self.user_message)
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with a level matching its severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();
        let status = self.http_status().as_u16();

        match self.severity() {
            ErrorSeverity::Critical | ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    source = ?self.source,
                    "Request failed"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    "Request rejected"
                );
            }
            ErrorSeverity::Low => {
                info!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    "Request could not be completed"
                );
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Metrics
    // ─────────────────────────────────────────────────────────────────────────

    fn record_metrics(&self) {
        counter!(
            "lendit_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category().to_string(),
            "severity" => format!("{:?}", self.severity()),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Axum Integration
// ═══════════════════════════════════════════════════════════════════════════════

/// A failure raised while handling a request, waiting in the response
/// extensions for the exception boundary to render it.
#[derive(Debug, Clone)]
pub struct PendingFailure(pub Arc<LendError>);

impl IntoResponse for LendError {
    /// Produces a bodiless response carrying the status and the failure
    /// itself; the exception boundary turns it into the JSON envelope.
    fn into_response(self) -> Response {
        let mut response = self.http_status().into_response();
        response
            .extensions_mut()
            .insert(PendingFailure(Arc::new(self)));
        response
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Context Extension Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Add context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with error code.
    fn with_error_code(self, code: ErrorCode) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| LendError::internal(message.into()).with_source(e))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.map_err(|e| LendError::new(code, e.to_string()).with_source(e))
    }
}

impl<T> ErrorContext<T> for Option<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| LendError::new(ErrorCode::NotFound, message.into()))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.ok_or_else(|| LendError::new(code, "Resource not found"))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations for Common Error Types
// ═══════════════════════════════════════════════════════════════════════════════

impl From<std::convert::Infallible> for LendError {
    fn from(error: std::convert::Infallible) -> Self {
        match error {}
    }
}

impl From<serde_json::Error> for LendError {
    fn from(error: serde_json::Error) -> Self {
        Self::with_internal(
            ErrorCode::SerializationError,
            "Failed to process JSON data",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<jsonwebtoken::errors::Error> for LendError {
    fn from(error: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match error.kind() {
            ErrorKind::InvalidToken
            | ErrorKind::InvalidSignature
            | ErrorKind::ExpiredSignature
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidAudience
            | ErrorKind::ImmatureSignature => Self::with_internal(
                ErrorCode::Unauthenticated,
                "The provided token is invalid",
                error.to_string(),
            )
            .with_source(error),
            _ => Self::internal(error.to_string()).with_source(error),
        }
    }
}

impl From<anyhow::Error> for LendError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<LendError>() {
            Ok(lend_error) => lend_error,
            Err(error) => Self::internal(error.to_string()),
        }
    }
}

impl From<config::ConfigError> for LendError {
    fn from(error: config::ConfigError) -> Self {
        Self::configuration(error.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_http_status() {
        assert_eq!(ErrorCode::SessionInvalid.http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::AuthorizationFailed.http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::InvalidArgument.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::InvalidOperation.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::AccessDenied.http_status(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::NotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::InternalError.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_error_keeps_raw_detail() {
        let error = LendError::internal("Database connection failed");
        assert_eq!(error.user_message(), GENERIC_ERROR_MESSAGE);
        assert_eq!(error.detail(), "Database connection failed");
        assert!(error.code().is_unclassified());
    }

    #[test]
    fn test_detail_falls_back_to_user_message() {
        let error = LendError::not_found("Item", "abc");
        assert_eq!(error.detail(), "Item not found: abc");
        assert!(!error.code().is_unclassified());
    }

    #[test]
    fn test_validation_error_carries_sub_messages() {
        let error = LendError::validation(
            "Validation failed",
            vec!["name is required".to_string()],
        );
        assert_eq!(error.code(), ErrorCode::ValidationFailed);
        assert_eq!(error.errors(), Some(&["name is required".to_string()][..]));
    }

    #[test]
    fn test_error_severity() {
        assert_eq!(
            ErrorSeverity::from_code(&ErrorCode::NotFound),
            ErrorSeverity::Low
        );
        assert_eq!(
            ErrorSeverity::from_code(&ErrorCode::SessionInvalid),
            ErrorSeverity::Medium
        );
        assert_eq!(
            ErrorSeverity::from_code(&ErrorCode::InternalError),
            ErrorSeverity::Critical
        );
    }

    #[test]
    fn test_into_response_defers_rendering() {
        let response = LendError::forbidden("nope").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let pending = response.extensions().get::<PendingFailure>().unwrap();
        assert_eq!(pending.0.code(), ErrorCode::AccessDenied);
    }

    #[test]
    fn test_from_anyhow_roundtrips_lend_error() {
        let original = anyhow::Error::new(LendError::invalid_operation("already lent"));
        let error = LendError::from(original);
        assert_eq!(error.code(), ErrorCode::InvalidOperation);

        let error = LendError::from(anyhow::anyhow!("disk full"));
        assert_eq!(error.code(), ErrorCode::InternalError);
        assert_eq!(error.detail(), "disk full");
    }

    #[test]
    fn test_option_context() {
        let missing: Option<u32> = None;
        let error = missing.context("Lending record not found").unwrap_err();
        assert_eq!(error.code(), ErrorCode::NotFound);
    }

    #[test]
    fn test_error_display() {
        let error = LendError::with_internal(
            ErrorCode::InternalError,
            GENERIC_ERROR_MESSAGE,
            "Connection refused: localhost:5432",
        );

        let display = format!("{}", error);
        assert!(display.contains("InternalError"));
        assert!(display.contains("Connection refused"));
    }
}
