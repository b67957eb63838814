//! Admin moderation handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::{AdminUser, ApiResult};
use crate::models::{
    ApiResponse, BroadcastRequest, CounterDrift, Notification, Page, PaginationParams, User,
};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BanRequest {
    #[serde(default = "default_banned")]
    pub banned: bool,
    pub reason: Option<String>,
}

fn default_banned() -> bool {
    true
}

/// `GET /api/admin/users`
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(params): Query<PaginationParams>,
) -> ApiResult<Vec<User>> {
    let users = state.user_service.list_users(Page::from(params)).await?;
    Ok(Json(ApiResponse::ok(users)))
}

/// `PUT /api/admin/users/:id/ban`
pub async fn ban_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(request): Json<BanRequest>,
) -> ApiResult<User> {
    let user = state
        .user_service
        .set_banned(id, request.banned, request.reason)
        .await?;
    tracing::info!(admin_id = %admin.id, user_id = %id, banned = request.banned, "Admin changed ban status");
    Ok(Json(ApiResponse::ok(user)))
}

/// `PUT /api/admin/users/:id/verify`
pub async fn verify_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> ApiResult<User> {
    Ok(Json(ApiResponse::ok(state.user_service.verify(id).await?)))
}

/// `POST /api/admin/broadcast`
pub async fn broadcast(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(request): Json<BroadcastRequest>,
) -> ApiResult<Vec<Notification>> {
    let created = state.notification_service.broadcast_system(request).await?;
    Ok(Json(ApiResponse::ok(created)))
}

/// `GET /api/admin/counter-audit`
pub async fn counter_audit(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Vec<CounterDrift>> {
    Ok(Json(ApiResponse::ok(state.user_service.counter_audit().await?)))
}
