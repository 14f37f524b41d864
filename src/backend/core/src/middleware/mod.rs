//! Request pipeline middleware for Lendit Core.
//!
//! Mount order, outermost first:
//!
//! 1. [`ExceptionBoundaryLayer`] renders every failure once
//! 2. [`AuthLayer`] installs the request principal
//! 3. [`TokenRefreshLayer`] renews near-expiry credentials
//!
//! The refresh and exception layers are thin adapters over explicit
//! `handle(request, next)` entry points that can be composed by hand.

pub mod auth;
pub mod exception;
pub mod refresh;

pub use auth::{AuthConfig, AuthError, AuthLayer, Authenticator, Claims, RequireSession};
pub use exception::{translate, ExceptionBoundary, ExceptionBoundaryLayer};
pub use refresh::{RefreshOutcome, TokenRefreshLayer, TokenRefresher};
