//! Registration, login and account handlers

use axum::{extract::State, http::StatusCode, Json};

use super::{ApiResult, AuthenticatedUser};
use crate::models::{
    ApiResponse, AuthResponse, LoginRequest, RegisterRequest, UpdatePasswordRequest, User,
};
use crate::state::AppState;

/// `POST /api/auth/register`
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AuthResponse>>), super::ApiError> {
    let response = state.auth_service.register(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(response))))
}

/// `POST /api/auth/login`
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<AuthResponse> {
    Ok(Json(ApiResponse::ok(state.auth_service.login(request).await?)))
}

/// `GET /api/auth/me`
pub async fn me(user: AuthenticatedUser) -> ApiResult<User> {
    Ok(Json(ApiResponse::ok(user.user)))
}

/// `PUT /api/auth/update-password`
pub async fn update_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<UpdatePasswordRequest>,
) -> ApiResult<()> {
    state.auth_service.update_password(user.id, request).await?;
    Ok(Json(ApiResponse::ok(())))
}
