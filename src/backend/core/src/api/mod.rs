//! HTTP API for Lendit Core.
//!
//! Routes:
//!
//! - `GET  /health` - liveness
//! - `GET  /metrics` - Prometheus exposition
//! - `GET  /api/v1/users/:id` - a user profile (owner or elevated role)
//! - `GET  /api/v1/items/:id` - an item (owner or elevated role)
//! - `POST /api/v1/items` - register an item owned by the caller
//!
//! Every response body is an [`ApiResponse`] envelope.

mod handlers;
pub mod store;

use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::error::{LendError, GENERIC_ERROR_MESSAGE};
use crate::middleware::{
    AuthLayer, Authenticator, ExceptionBoundaryLayer, TokenRefreshLayer, TokenRefresher,
};
use crate::rbac::AuthorizationEngine;

pub use store::{CreateItem, Item, LendingDirectory, UserProfile};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: AuthorizationEngine,
    pub directory: LendingDirectory,
    pub authenticator: Arc<Authenticator>,
    pub refresher: Arc<TokenRefresher>,
    pub metrics: Option<PrometheusHandle>,
}

/// Build the API router.
///
/// Layers, outermost first: exception boundary, request tracing,
/// authentication, token refresh.
///
/// # Example
///
/// ```rust,ignore
/// let state = AppState { engine, directory, authenticator, refresher, metrics: None };
/// let app = build_router(state);
/// ```
pub fn build_router(state: AppState) -> Router {
    let auth =
        AuthLayer::new(state.authenticator.clone()).with_inspector(*state.refresher.inspector());
    let refresh = TokenRefreshLayer::new(state.refresher.clone());

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::prometheus_metrics))
        .route("/api/v1/users/:id", get(handlers::get_user_profile))
        .route("/api/v1/items", axum::routing::post(handlers::create_item))
        .route("/api/v1/items/:id", get(handlers::get_item))
        .layer(refresh)
        .layer(auth)
        .layer(TraceLayer::new_for_http())
        .layer(ExceptionBoundaryLayer::new())
        .with_state(state)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Response Envelope
// ═══════════════════════════════════════════════════════════════════════════════

/// API response wrapper.
///
/// All four fields are always serialized. `errors` stays `null` unless the
/// failure carries sub-messages; an empty list is kept as `[]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
    pub errors: Option<Vec<String>>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self::success_with_message(data, "Request completed successfully")
    }

    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            errors: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            errors: None,
        }
    }

    pub fn fail_with_errors(message: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            errors: Some(errors),
        }
    }

    /// The envelope for a failure.
    ///
    /// Unclassified failures get the generic message, with the raw detail
    /// as the only entry of `errors`.
    pub fn from_error(error: &LendError) -> Self {
        if error.code().is_unclassified() {
            return Self::fail_with_errors(GENERIC_ERROR_MESSAGE, vec![error.detail().to_string()]);
        }

        match error.errors() {
            Some(errors) => Self::fail_with_errors(error.user_message(), errors.to_vec()),
            None => Self::fail(error.user_message()),
        }
    }
}
