//! Authentication Handlers
//!
//! Sign-in endpoints plus token refresh and logout. The flows themselves
//! live in [`bloom_auth::AuthService`]; handlers only translate HTTP.

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::dto::{
    LoginRequest, LogoutRequest, LogoutResponse, RefreshTokenRequest, RegisterRequest, TelegramLoginResponse,
    TelegramMiniAppRequest, TelegramWebsiteRequest, TokenResponse,
};
use crate::error::{ApiResult, ErrorResponse};
use crate::extractors::{BearerToken, ClientIp, ValidatedJson};
use crate::state::AppState;

/// Email + password login
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "Authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 403, description = "Account disabled", body = ErrorResponse),
        (status = 429, description = "Too many attempts", body = ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    ValidatedJson(request): ValidatedJson<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let response = state.auth.login(&request.email, &request.password, &ip).await?;
    Ok(Json(response.into()))
}

/// Administrator login
#[utoipa::path(
    post,
    path = "/api/v1/auth/admin-login",
    tag = "Authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 403, description = "Not an administrator", body = ErrorResponse),
        (status = 429, description = "Too many attempts", body = ErrorResponse)
    )
)]
pub async fn admin_login(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    ValidatedJson(request): ValidatedJson<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let response = state.auth.admin_login(&request.email, &request.password, &ip).await?;
    Ok(Json(response.into()))
}

/// Password account registration
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "Authentication",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registration successful", body = TokenResponse),
        (status = 400, description = "Weak password or invalid request", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse),
        (status = 429, description = "Too many registrations", body = ErrorResponse)
    )
)]
pub async fn register(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    ValidatedJson(request): ValidatedJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<TokenResponse>)> {
    let response = state
        .auth
        .register(&request.email, &request.password, request.full_name, &ip)
        .await?;
    Ok((StatusCode::CREATED, Json(response.into())))
}

/// Telegram Mini-App login
#[utoipa::path(
    post,
    path = "/api/v1/auth/telegram-miniapp",
    tag = "Authentication",
    request_body = TelegramMiniAppRequest,
    responses(
        (status = 200, description = "Login successful", body = TelegramLoginResponse),
        (status = 401, description = "Invalid signature", body = ErrorResponse),
        (status = 429, description = "Too many attempts", body = ErrorResponse)
    )
)]
pub async fn telegram_miniapp(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    ValidatedJson(request): ValidatedJson<TelegramMiniAppRequest>,
) -> ApiResult<Json<TelegramLoginResponse>> {
    let response = state.auth.telegram_miniapp(&request.init_data, &ip).await?;
    Ok(Json(response.into()))
}

/// Telegram Login Widget
#[utoipa::path(
    post,
    path = "/api/v1/auth/telegram-website",
    tag = "Authentication",
    request_body = TelegramWebsiteRequest,
    responses(
        (status = 200, description = "Login successful", body = TelegramLoginResponse),
        (status = 401, description = "Invalid signature or stale payload", body = ErrorResponse),
        (status = 429, description = "Too many attempts", body = ErrorResponse)
    )
)]
pub async fn telegram_website(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    ValidatedJson(request): ValidatedJson<TelegramWebsiteRequest>,
) -> ApiResult<Json<TelegramLoginResponse>> {
    let response = state.auth.telegram_website(&request.into(), &ip).await?;
    Ok(Json(response.into()))
}

/// Exchange a refresh token for a new pair
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "Authentication",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "Token refreshed", body = TokenResponse),
        (status = 401, description = "Invalid refresh token", body = ErrorResponse)
    )
)]
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<RefreshTokenRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let response = state.auth.refresh(&request.refresh_token).await?;
    Ok(Json(response.into()))
}

/// Revoke the presented access token
///
/// Succeeds for tokens that are already expired or revoked.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "Authentication",
    request_body(content = LogoutRequest, description = "Optional"),
    security(
        ("bearer" = [])
    ),
    responses(
        (status = 200, description = "Logout successful", body = LogoutResponse),
        (status = 401, description = "Missing bearer token", body = ErrorResponse),
        (status = 503, description = "Revocation could not be stored", body = ErrorResponse)
    )
)]
pub async fn logout(
    State(state): State<Arc<AppState>>,
    BearerToken(token): BearerToken,
    body: Option<Json<LogoutRequest>>,
) -> ApiResult<Json<LogoutResponse>> {
    let request = body.map(|Json(request)| request).unwrap_or_default();

    state.auth.logout(&token, request.all_devices).await?;
    if let Some(refresh_token) = request.refresh_token.as_deref() {
        state.auth.tokens().revoke(refresh_token).await?;
    }

    Ok(Json(LogoutResponse { success: true }))
}
