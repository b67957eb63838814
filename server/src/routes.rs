//! Route definitions for the SkillSwap API

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::handlers::{self, admin, auth, notification, swap, user};
use crate::middleware::rate_limit;
use crate::state::AppState;
use crate::websocket;

// Auth routes
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/update-password", put(auth::update_password))
}

// User directory routes
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/api/users/search", get(user::search_users))
        .route("/api/users/profile/:id", get(user::get_profile))
        .route("/api/users/profile", put(user::update_profile))
}

// Swap lifecycle routes
pub fn swap_routes() -> Router<AppState> {
    Router::new()
        .route("/api/swaps/request", post(swap::request_swap))
        .route("/api/swaps/my-swaps", get(swap::my_swaps))
        .route("/api/swaps/:id", get(swap::get_swap))
        .route("/api/swaps/:id/accept", put(swap::accept_swap))
        .route("/api/swaps/:id/reject", put(swap::reject_swap))
        .route("/api/swaps/:id/complete", put(swap::complete_swap))
        .route("/api/swaps/:id/cancel", put(swap::cancel_swap))
        .route("/api/swaps/:id/rate", post(swap::rate_swap))
        .route("/api/swaps/:id/read", put(swap::mark_swap_read))
}

// Notification routes
pub fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/api/notifications", get(notification::list_notifications))
        .route(
            "/api/notifications/unread-count",
            get(notification::unread_count),
        )
        .route("/api/notifications/mark-read", put(notification::mark_read))
}

// Admin routes
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/users", get(admin::list_users))
        .route("/api/admin/users/:id/ban", put(admin::ban_user))
        .route("/api/admin/users/:id/verify", put(admin::verify_user))
        .route("/api/admin/broadcast", post(admin::broadcast))
        .route("/api/admin/counter-audit", get(admin::counter_audit))
}

// Everything under /api
pub fn api_routes(state: &AppState) -> Router<AppState> {
    let api = Router::new()
        .route("/api/health", get(handlers::health_check))
        .merge(auth_routes())
        .merge(user_routes())
        .merge(swap_routes())
        .merge(notification_routes())
        .merge(admin_routes());
    match state.rate_limiter.clone() {
        Some(limiter) => api.route_layer(middleware::from_fn_with_state(
            limiter,
            rate_limit::limit_requests,
        )),
        None => api,
    }
}

/// The full application router, without CORS and tracing layers
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/ws", get(websocket::ws_handler))
        .merge(api_routes(&state))
        .fallback(handlers::not_found)
        .with_state(state)
}
