//! Swap lifecycle handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use super::{ApiError, ApiResult, AuthenticatedUser};
use crate::models::{
    AcceptSwapRequest, ApiResponse, CancelSwapRequest, CreateSwapRequest, ListSwapsQuery,
    RateSwapRequest, Swap, SwapView,
};
use crate::state::AppState;

fn view(swap: Swap) -> Json<ApiResponse<SwapView>> {
    Json(ApiResponse::ok(SwapView::new(swap, Utc::now())))
}

/// `POST /api/swaps/request`
pub async fn request_swap(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateSwapRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SwapView>>), ApiError> {
    let swap = state.swap_service.request_swap(user.id, request).await?;
    Ok((StatusCode::CREATED, view(swap)))
}

/// `GET /api/swaps/my-swaps?status=..&limit=..&offset=..`
pub async fn my_swaps(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ListSwapsQuery>,
) -> ApiResult<Vec<SwapView>> {
    let swaps = state.swap_service.list_for_user(user.id, query).await?;
    Ok(Json(ApiResponse::ok(swaps)))
}

/// `GET /api/swaps/:id`
pub async fn get_swap(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<SwapView> {
    let swap = state.swap_service.get(id, user.id, user.is_admin).await?;
    Ok(Json(ApiResponse::ok(swap)))
}

/// `PUT /api/swaps/:id/accept`
pub async fn accept_swap(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    body: Option<Json<AcceptSwapRequest>>,
) -> ApiResult<SwapView> {
    let Json(body) = body.unwrap_or_default();
    let swap = state
        .swap_service
        .accept(id, user.id, body.scheduled_date)
        .await?;
    Ok(view(swap))
}

/// `PUT /api/swaps/:id/reject`
pub async fn reject_swap(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<SwapView> {
    Ok(view(state.swap_service.reject(id, user.id).await?))
}

/// `PUT /api/swaps/:id/complete`
pub async fn complete_swap(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<SwapView> {
    Ok(view(state.swap_service.complete(id, user.id).await?))
}

/// `PUT /api/swaps/:id/cancel`
pub async fn cancel_swap(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    body: Option<Json<CancelSwapRequest>>,
) -> ApiResult<SwapView> {
    let Json(body) = body.unwrap_or_default();
    Ok(view(state.swap_service.cancel(id, user.id, body.reason).await?))
}

/// `POST /api/swaps/:id/rate`
pub async fn rate_swap(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<RateSwapRequest>,
) -> ApiResult<SwapView> {
    Ok(view(state.swap_service.rate(id, user.id, request).await?))
}

/// `PUT /api/swaps/:id/read`
pub async fn mark_swap_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<SwapView> {
    Ok(view(state.swap_service.mark_read(id, user.id).await?))
}
