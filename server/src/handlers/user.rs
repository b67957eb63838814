//! User directory handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use super::{ApiResult, AuthenticatedUser, OptionalUser};
use crate::models::{ApiResponse, ProfileUpdate, PublicProfile, User};
use crate::state::AppState;
use crate::users::SearchParams;

/// `GET /api/users/search?query=..&skills=a,b&location=..&availability=..&sort=..`
pub async fn search_users(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Vec<PublicProfile>> {
    let users = state.user_service.search(params).await?;
    Ok(Json(ApiResponse::ok(users)))
}

/// `GET /api/users/profile/:id`
pub async fn get_profile(
    State(state): State<AppState>,
    OptionalUser(viewer): OptionalUser,
    Path(id): Path<Uuid>,
) -> ApiResult<PublicProfile> {
    let profile = state
        .user_service
        .public_profile(id, viewer.as_ref().map(|v| &v.user))
        .await?;
    Ok(Json(ApiResponse::ok(profile)))
}

/// `PUT /api/users/profile`
pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult<User> {
    let user = state.user_service.update_profile(user.id, update).await?;
    Ok(Json(ApiResponse::ok(user)))
}
