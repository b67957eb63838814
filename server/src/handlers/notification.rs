//! Notification inbox handlers

use axum::{
    extract::{Query, State},
    Json,
};
use serde_json::json;

use super::{ApiResult, AuthenticatedUser};
use crate::models::{ApiResponse, MarkNotificationsRequest, Notification, NotificationQuery};
use crate::state::AppState;

/// `GET /api/notifications?unreadOnly=true&type=..&limit=..`
pub async fn list_notifications(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<NotificationQuery>,
) -> ApiResult<Vec<Notification>> {
    let notifications = state.notification_service.list(user.id, query).await?;
    Ok(Json(ApiResponse::ok(notifications)))
}

/// `GET /api/notifications/unread-count`
pub async fn unread_count(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<serde_json::Value> {
    let count = state.notification_service.unread_count(user.id).await?;
    Ok(Json(ApiResponse::ok(json!({ "count": count }))))
}

/// `PUT /api/notifications/mark-read`; an empty body marks everything read
pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    body: Option<Json<MarkNotificationsRequest>>,
) -> ApiResult<serde_json::Value> {
    let Json(body) = body.unwrap_or_default();
    let updated = state
        .notification_service
        .mark_read(user.id, body.notification_ids)
        .await?;
    Ok(Json(ApiResponse::ok(json!({ "updated": updated }))))
}
