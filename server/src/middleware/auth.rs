//! Bearer-token authentication extractors
//!
//! Every extractor resolves the token's subject against the user directory,
//! so bans and admin grants take effect on the next request rather than when
//! the token expires.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use uuid::Uuid;

use crate::auth::{AuthError, AuthService};
use crate::handlers::ApiError;
use crate::models::User;

/// The signed-in, non-banned caller
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub is_admin: bool,
    pub user: User,
}

/// A signed-in caller with the admin flag
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthenticatedUser);

/// The caller if a valid token was sent, `None` otherwise
#[derive(Debug, Clone)]
pub struct OptionalUser(pub Option<AuthenticatedUser>);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::unauthorized("Missing bearer token"))?;

        let auth = Arc::<AuthService>::from_ref(state);
        let claims = auth.verify_token(bearer.token()).map_err(|e| {
            tracing::debug!("Rejected token: {}", e);
            ApiError::unauthorized("Invalid or expired token")
        })?;
        let user = match auth.me(claims.sub).await {
            Ok(user) => user,
            Err(AuthError::UserNotFound) => {
                return Err(ApiError::unauthorized("Account no longer exists"))
            }
            Err(e) => return Err(e.into()),
        };
        if user.is_banned {
            return Err(ApiError::forbidden("Account is banned"));
        }

        Ok(Self {
            id: user.id,
            is_admin: user.is_admin,
            user,
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            return Err(ApiError::forbidden("Admin access required"));
        }
        Ok(Self(user))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for OptionalUser
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            AuthenticatedUser::from_request_parts(parts, state).await.ok(),
        ))
    }
}
