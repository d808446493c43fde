//! Admin Handlers
//!
//! Operator tools over the identity cache, rate-limit windows and sessions.
//! Every endpoint requires an access token with the admin role.

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::dto::{
    CacheClearResponse, CacheStatsResponse, RateLimitClearResponse, RateLimitStatusResponse, RevokeSessionsResponse,
};
use crate::error::{ApiResult, ErrorResponse};
use crate::extractors::RequireAdmin;
use crate::state::AppState;

/// Identity cache statistics
#[utoipa::path(
    get,
    path = "/api/v1/admin/cache/stats",
    tag = "Admin",
    security(
        ("bearer" = [])
    ),
    responses(
        (status = 200, description = "Cache statistics", body = CacheStatsResponse),
        (status = 403, description = "Not an administrator", body = ErrorResponse)
    )
)]
pub async fn cache_stats(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
) -> Json<CacheStatsResponse> {
    Json(state.auth.cache().stats().await.into())
}

/// Drop every cached identity
#[utoipa::path(
    delete,
    path = "/api/v1/admin/cache",
    tag = "Admin",
    security(
        ("bearer" = [])
    ),
    responses(
        (status = 200, description = "Cache cleared", body = CacheClearResponse),
        (status = 403, description = "Not an administrator", body = ErrorResponse),
        (status = 503, description = "Cache unavailable", body = ErrorResponse)
    )
)]
pub async fn clear_cache(
    State(state): State<Arc<AppState>>,
    RequireAdmin(admin): RequireAdmin,
) -> ApiResult<Json<CacheClearResponse>> {
    let removed = state.auth.cache().invalidate_all().await?;
    tracing::info!(admin_id = admin.id, removed, "Identity cache cleared by admin");
    Ok(Json(CacheClearResponse { removed }))
}

/// Window state of a rate-limit identifier
#[utoipa::path(
    get,
    path = "/api/v1/admin/rate-limits/{identifier}",
    tag = "Admin",
    params(
        ("identifier" = String, Path, description = "Window identifier, e.g. `auth_login:ip:203.0.113.9`")
    ),
    security(
        ("bearer" = [])
    ),
    responses(
        (status = 200, description = "Window status", body = RateLimitStatusResponse),
        (status = 403, description = "Not an administrator", body = ErrorResponse),
        (status = 503, description = "Rate-limit store unavailable", body = ErrorResponse)
    )
)]
pub async fn rate_limit_status(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    Path(identifier): Path<String>,
) -> ApiResult<Json<RateLimitStatusResponse>> {
    let info = state.auth.limiter().status(&identifier).await?;
    Ok(Json(info.into()))
}

/// Forget the requests recorded for a rate-limit identifier
#[utoipa::path(
    delete,
    path = "/api/v1/admin/rate-limits/{identifier}",
    tag = "Admin",
    params(
        ("identifier" = String, Path, description = "Window identifier")
    ),
    security(
        ("bearer" = [])
    ),
    responses(
        (status = 200, description = "Window cleared", body = RateLimitClearResponse),
        (status = 403, description = "Not an administrator", body = ErrorResponse),
        (status = 503, description = "Rate-limit store unavailable", body = ErrorResponse)
    )
)]
pub async fn clear_rate_limit(
    State(state): State<Arc<AppState>>,
    RequireAdmin(admin): RequireAdmin,
    Path(identifier): Path<String>,
) -> ApiResult<Json<RateLimitClearResponse>> {
    let cleared = state.auth.limiter().clear(&identifier).await?;
    tracing::info!(admin_id = admin.id, identifier = %identifier, cleared, "Rate limit cleared by admin");
    Ok(Json(RateLimitClearResponse { identifier, cleared }))
}

/// Revoke every token issued to a user
#[utoipa::path(
    post,
    path = "/api/v1/admin/users/{id}/revoke",
    tag = "Admin",
    params(
        ("id" = i64, Path, description = "User id")
    ),
    security(
        ("bearer" = [])
    ),
    responses(
        (status = 200, description = "Sessions revoked", body = RevokeSessionsResponse),
        (status = 403, description = "Not an administrator", body = ErrorResponse),
        (status = 503, description = "Revocation could not be stored", body = ErrorResponse)
    )
)]
pub async fn revoke_user_sessions(
    State(state): State<Arc<AppState>>,
    RequireAdmin(admin): RequireAdmin,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<RevokeSessionsResponse>> {
    state.auth.revoke_user_sessions(user_id).await?;
    tracing::info!(admin_id = admin.id, user_id, "Sessions revoked by admin");
    Ok(Json(RevokeSessionsResponse { user_id, revoked: true }))
}
