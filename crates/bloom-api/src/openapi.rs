//! OpenAPI Documentation
//!
//! Auto-generated OpenAPI 3.0 specification for the Bloom auth API.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::OpenApi;

use crate::dto;
use crate::error::ErrorResponse;
use crate::handlers;

/// Bloom API Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Bloom Auth API",
        description = "Authentication for the Bloom flower-subscription service: password and Telegram sign-in, token refresh and revocation, and operator tools.",
        version = "1.0.0"
    ),
    servers(
        (url = "http://localhost:8000", description = "Local Development")
    ),
    paths(
        // Health
        handlers::health::health_check,
        handlers::health::readiness_check,
        // Auth
        handlers::auth::login,
        handlers::auth::admin_login,
        handlers::auth::register,
        handlers::auth::telegram_miniapp,
        handlers::auth::telegram_website,
        handlers::auth::refresh_token,
        handlers::auth::logout,
        // Users
        handlers::users::get_me,
        handlers::users::update_me,
        // Admin
        handlers::admin::cache_stats,
        handlers::admin::clear_cache,
        handlers::admin::rate_limit_status,
        handlers::admin::clear_rate_limit,
        handlers::admin::revoke_user_sessions,
    ),
    components(
        schemas(
            ErrorResponse,
            handlers::health::HealthResponse,
            handlers::health::ReadinessResponse,
            handlers::health::ComponentStatus,
            // Auth
            dto::LoginRequest,
            dto::RegisterRequest,
            dto::TelegramMiniAppRequest,
            dto::TelegramWebsiteRequest,
            dto::RefreshTokenRequest,
            dto::LogoutRequest,
            dto::LogoutResponse,
            dto::UserSummaryDto,
            dto::TokenResponse,
            dto::TelegramLoginResponse,
            // Users
            dto::UserProfileResponse,
            dto::UpdateProfileRequest,
            // Admin
            dto::CacheStatsResponse,
            dto::CacheClearResponse,
            dto::RateLimitStatusResponse,
            dto::RateLimitClearResponse,
            dto::RevokeSessionsResponse,
        )
    ),
    tags(
        (name = "Health", description = "Service health and status"),
        (name = "Authentication", description = "Sign-in, token refresh and logout"),
        (name = "Users", description = "The authenticated account"),
        (name = "Admin", description = "Identity cache, rate limits and session revocation")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Security scheme modifier
pub struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = &mut openapi.components {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
