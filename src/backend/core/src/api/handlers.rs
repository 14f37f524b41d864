//! API request handlers.
//!
//! Handlers return `Result<_, LendError>`; failures are rendered by the
//! exception boundary.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use super::store::{CreateItem, Item, UserProfile};
use super::{ApiResponse, AppState};
use crate::error::{LendError, Result};
use crate::middleware::RequireSession;
use crate::rbac::Requirement;

fn parse_id(raw: &str, entity: &str) -> Result<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|_| LendError::invalid_argument(format!("Invalid {} id: {}", entity, raw)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Health & Metrics
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::success(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

pub async fn prometheus_metrics(State(state): State<AppState>) -> Result<String> {
    state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .ok_or_else(|| LendError::not_found("Metrics exporter", "prometheus"))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Users
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn get_user_profile(
    State(state): State<AppState>,
    RequireSession(principal): RequireSession,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<UserProfile>>> {
    let id = parse_id(&id, "user")?;
    let profile = state
        .directory
        .user(id)
        .ok_or_else(|| LendError::not_found("User", id))?;

    state
        .engine
        .enforce(&[Requirement::VIEW_PROFILE], &principal, Some(&profile))?;

    Ok(Json(ApiResponse::success(profile)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Items
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn get_item(
    State(state): State<AppState>,
    RequireSession(principal): RequireSession,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Item>>> {
    let id = parse_id(&id, "item")?;
    let item = state
        .directory
        .item(id)
        .ok_or_else(|| LendError::not_found("Item", id))?;

    state
        .engine
        .enforce(&[Requirement::MANAGE_ITEM], &principal, Some(&item))?;

    Ok(Json(ApiResponse::success(item)))
}

pub async fn create_item(
    State(state): State<AppState>,
    RequireSession(principal): RequireSession,
    body: std::result::Result<Json<CreateItem>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(request) = body.map_err(|e| LendError::invalid_argument(e.body_text()))?;

    let owner_id = principal.subject_id().ok_or_else(|| {
        LendError::authorization_failed("The caller's identity could not be established")
    })?;

    let item = state.directory.create_item(owner_id, request)?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_message(item, "Item created")),
    ))
}
