//! API handlers for the SkillSwap backend

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::auth::AuthError;
use crate::models::ApiResponse;
use crate::notifications::NotificationError;
use crate::swaps::SwapError;
use crate::users::UserError;

pub mod admin;
pub mod auth;
pub mod notification;
pub mod swap;
pub mod user;

// Re-export the extractors for handler use
pub use crate::middleware::auth::{AdminUser, AuthenticatedUser, OptionalUser};

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Error surfaced to HTTP callers inside the usual envelope
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        tracing::error!("Internal error: {}", err);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::error(self.message))).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let status = match &err {
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials | AuthError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            AuthError::EmailTaken => StatusCode::CONFLICT,
            AuthError::Banned => StatusCode::FORBIDDEN,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::Hash(_) | AuthError::Task(_) | AuthError::Repository(_) => {
                return Self::internal(err)
            }
        };
        Self::new(status, err.to_string())
    }
}

impl From<UserError> for ApiError {
    fn from(err: UserError) -> Self {
        let status = match &err {
            UserError::NotFound => StatusCode::NOT_FOUND,
            UserError::OutOfRange(_) | UserError::Validation(_) => StatusCode::BAD_REQUEST,
            UserError::Repository(_) => return Self::internal(err),
        };
        Self::new(status, err.to_string())
    }
}

impl From<SwapError> for ApiError {
    fn from(err: SwapError) -> Self {
        let status = match &err {
            SwapError::NotFound(_) => StatusCode::NOT_FOUND,
            SwapError::Forbidden(_) => StatusCode::FORBIDDEN,
            SwapError::InvalidTransition { .. }
            | SwapError::InvalidState
            | SwapError::AlreadyRated
            | SwapError::Conflict => StatusCode::CONFLICT,
            SwapError::InvalidParticipants
            | SwapError::OutOfRange(_)
            | SwapError::Validation(_) => StatusCode::BAD_REQUEST,
            SwapError::Repository(_) => return Self::internal(err),
        };
        Self::new(status, err.to_string())
    }
}

impl From<NotificationError> for ApiError {
    fn from(err: NotificationError) -> Self {
        let status = match &err {
            NotificationError::MissingRelatedSwap(_)
            | NotificationError::MissingRelatedUser(_)
            | NotificationError::Invalid(_)
            | NotificationError::UnknownRecipients(_)
            | NotificationError::Validation(_) => StatusCode::BAD_REQUEST,
            NotificationError::Repository(_) => return Self::internal(err),
        };
        Self::new(status, err.to_string())
    }
}

pub async fn root() -> &'static str {
    "SkillSwap API Server"
}

pub async fn not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "Route not found")
}

pub async fn health_check() -> Json<ApiResponse<serde_json::Value>> {
    Json(ApiResponse::ok(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SwapStatus;

    #[test]
    fn lifecycle_errors_map_to_documented_statuses() {
        let cases = [
            (SwapError::NotFound("Swap"), StatusCode::NOT_FOUND),
            (SwapError::Forbidden("no"), StatusCode::FORBIDDEN),
            (
                SwapError::InvalidTransition {
                    from: SwapStatus::Completed,
                    to: SwapStatus::Cancelled,
                },
                StatusCode::CONFLICT,
            ),
            (SwapError::InvalidParticipants, StatusCode::BAD_REQUEST),
            (SwapError::OutOfRange(9), StatusCode::BAD_REQUEST),
            (SwapError::InvalidState, StatusCode::CONFLICT),
            (SwapError::AlreadyRated, StatusCode::CONFLICT),
            (SwapError::Conflict, StatusCode::CONFLICT),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn repository_failures_hide_details() {
        let err = ApiError::from(SwapError::Repository(
            crate::store::RepositoryError::CounterDrift { touched: 1 },
        ));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Internal server error");
    }
}
