//! API Routes
//!
//! Route definitions for all API endpoints.

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::middleware::{admin_rate_limit, api_rate_limit};
use crate::state::AppState;

/// Create API v1 routes
pub fn api_v1_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .nest("/auth", auth_routes())
        .nest("/users", user_routes(state.clone()))
        .nest("/admin", admin_routes(state))
}

/// Authentication routes; login flows apply their own per-IP limits
fn auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/login", post(handlers::auth::login))
        .route("/register", post(handlers::auth::register))
        .route("/telegram-miniapp", post(handlers::auth::telegram_miniapp))
        .route("/telegram-website", post(handlers::auth::telegram_website))
        .route("/refresh", post(handlers::auth::refresh_token))
        .route("/logout", post(handlers::auth::logout))
        .route("/admin-login", post(handlers::auth::admin_login))
}

/// Current-user routes
fn user_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/me", get(handlers::users::get_me).patch(handlers::users::update_me))
        .route_layer(middleware::from_fn_with_state(state, api_rate_limit))
}

/// Admin routes
fn admin_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/cache/stats", get(handlers::admin::cache_stats))
        .route("/cache", delete(handlers::admin::clear_cache))
        .route(
            "/rate-limits/:identifier",
            get(handlers::admin::rate_limit_status).delete(handlers::admin::clear_rate_limit),
        )
        .route("/users/:id/revoke", post(handlers::admin::revoke_user_sessions))
        .route_layer(middleware::from_fn_with_state(state, admin_rate_limit))
}

/// Create Swagger UI routes
pub fn swagger_routes() -> Router<Arc<AppState>> {
    use crate::openapi::ApiDoc;
    use utoipa::OpenApi;
    use utoipa_swagger_ui::SwaggerUi;

    Router::new().merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
