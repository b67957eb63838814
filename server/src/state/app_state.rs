use std::sync::Arc;

use axum::extract::FromRef;

use crate::auth::AuthService;
use crate::config::Config;
use crate::middleware::rate_limit::RateLimiter;
use crate::notifications::NotificationService;
use crate::store::Repositories;
use crate::swaps::SwapService;
use crate::users::UserService;
use crate::websocket::WsState;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<AuthService>,
    pub user_service: Arc<UserService>,
    pub swap_service: Arc<SwapService>,
    pub notification_service: Arc<NotificationService>,
    pub ws_state: WsState,
    /// `None` when rate limiting is disabled
    pub rate_limiter: Option<Arc<RateLimiter>>,
}

impl AppState {
    /// Wire every service onto one set of repositories
    pub fn new(repos: Repositories, config: &Config) -> Self {
        let ws_state = WsState::new();
        let notification_service = Arc::new(NotificationService::new(
            repos.users.clone(),
            repos.notifications.clone(),
            ws_state.clone(),
        ));
        Self {
            auth_service: Arc::new(AuthService::new(repos.users.clone(), config)),
            user_service: Arc::new(UserService::new(
                repos.users.clone(),
                notification_service.clone(),
            )),
            swap_service: Arc::new(SwapService::new(
                repos.users,
                repos.swaps,
                notification_service.clone(),
                ws_state.clone(),
            )),
            notification_service,
            ws_state,
            rate_limiter: (config.rate_limit_max > 0).then(|| {
                Arc::new(RateLimiter::new(
                    config.rate_limit_max,
                    config.rate_limit_window(),
                ))
            }),
        }
    }
}

impl FromRef<AppState> for WsState {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.ws_state.clone()
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.auth_service.clone()
    }
}

impl FromRef<AppState> for Arc<UserService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.user_service.clone()
    }
}

impl FromRef<AppState> for Arc<SwapService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.swap_service.clone()
    }
}

impl FromRef<AppState> for Arc<NotificationService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.notification_service.clone()
    }
}
