#![allow(clippy::result_large_err)]
//! # Lendit Core
//!
//! Request pipeline for a multi-tenant asset-lending backend.
//!
//! ## Architecture
//!
//! - **RBAC**: Requirement-based authorization with pluggable evaluators
//! - **Session**: Token inspection and refresh-token backed renewal
//! - **Middleware**: Bearer authentication, transparent token refresh and
//!   the exception boundary that renders every failure as an envelope
//! - **API**: Profile and item endpoints wired through the pipeline
//! - **Observability**: Structured logging and Prometheus metrics

pub mod api;
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
pub mod rbac;
pub mod session;

pub use error::{ErrorCode, ErrorContext, ErrorSeverity, LendError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::api::{build_router, ApiResponse, AppState, LendingDirectory};
    pub use crate::config::Config;
    pub use crate::error::{ErrorCode, ErrorContext, ErrorSeverity, LendError, Result};
    pub use crate::middleware::{
        AuthConfig, AuthLayer, Authenticator, Claims, ExceptionBoundary, ExceptionBoundaryLayer,
        RefreshOutcome, RequireSession, TokenRefreshLayer, TokenRefresher,
    };
    pub use crate::rbac::{
        AuthorizationContext, AuthorizationEngine, AuthorizationResult, EvaluationDelta,
        OwnedResource, OwnershipOrElevatedRole, PredefinedRole, Requirement, RequirementEvaluator,
        SuperAdminBypass,
    };
    pub use crate::session::{
        JwtSessionService, Principal, SessionService, TokenInspector, TokenState,
    };
}
