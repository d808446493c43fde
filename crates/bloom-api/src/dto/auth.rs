//! Authentication DTOs

use bloom_auth::telegram::TelegramWidgetPayload;
use bloom_auth::{AuthResponse, TelegramAuthResponse, TokenPair, UserSummary};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

// =============================================================================
// Login
// =============================================================================

/// Login request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    /// Email address
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    /// Password
    #[validate(length(min = 1, max = 128, message = "Password is required"))]
    pub password: String,
}

/// Account summary returned with tokens
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserSummaryDto {
    pub id: i64,
    pub email: String,
    pub full_name: Option<String>,
    /// `client`, `admin` or `courier`
    pub role: String,
    pub is_verified: bool,
    pub bonus_points: i32,
}

impl From<UserSummary> for UserSummaryDto {
    fn from(user: UserSummary) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            role: user.role.to_string(),
            is_verified: user.is_verified,
            bonus_points: user.bonus_points,
        }
    }
}

/// Token pair with the signed-in account
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Always `bearer`
    pub token_type: String,
    /// Access token expiry (Unix seconds)
    pub access_expires_at: i64,
    /// Refresh token expiry (Unix seconds)
    pub refresh_expires_at: i64,
    pub user: UserSummaryDto,
}

impl TokenResponse {
    fn new(tokens: TokenPair, user: UserSummary) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: tokens.token_type,
            access_expires_at: tokens.access_expires_at,
            refresh_expires_at: tokens.refresh_expires_at,
            user: user.into(),
        }
    }
}

impl From<AuthResponse> for TokenResponse {
    fn from(response: AuthResponse) -> Self {
        Self::new(response.tokens, response.user)
    }
}

// =============================================================================
// Registration
// =============================================================================

/// Registration request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    /// Email address
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    /// Password
    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters"))]
    pub password: String,
    /// Display name
    #[serde(default)]
    #[validate(length(min = 1, max = 255, message = "Full name must be 1-255 characters"))]
    pub full_name: Option<String>,
}

// =============================================================================
// Telegram
// =============================================================================

/// Mini-App login request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct TelegramMiniAppRequest {
    /// Raw `Telegram.WebApp.initData` string
    #[validate(length(min = 1, message = "init_data is required"))]
    pub init_data: String,
}

/// Login Widget callback payload
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct TelegramWebsiteRequest {
    pub id: i64,
    #[validate(length(min = 1, message = "first_name is required"))]
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    /// Unix seconds when Telegram signed the payload
    pub auth_date: i64,
    /// Hex HMAC-SHA256 signature
    #[validate(length(equal = 64, message = "hash must be 64 hex characters"))]
    pub hash: String,
}

impl From<TelegramWebsiteRequest> for TelegramWidgetPayload {
    fn from(req: TelegramWebsiteRequest) -> Self {
        Self {
            id: req.id,
            first_name: req.first_name,
            last_name: req.last_name,
            username: req.username,
            photo_url: req.photo_url,
            auth_date: req.auth_date,
            hash: req.hash,
        }
    }
}

/// Telegram login response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TelegramLoginResponse {
    #[serde(flatten)]
    pub session: TokenResponse,
    /// Whether the account was created by this login
    pub is_new_user: bool,
    /// `miniapp` or `website`
    pub auth_method: String,
}

impl From<TelegramAuthResponse> for TelegramLoginResponse {
    fn from(response: TelegramAuthResponse) -> Self {
        let auth_method = match response.auth_method {
            bloom_auth::TelegramAuthMethod::Miniapp => "miniapp",
            bloom_auth::TelegramAuthMethod::Website => "website",
        };
        Self {
            session: TokenResponse::new(response.tokens, response.user),
            is_new_user: response.is_new_user,
            auth_method: auth_method.to_string(),
        }
    }
}

// =============================================================================
// Token Refresh / Logout
// =============================================================================

/// Refresh token request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RefreshTokenRequest {
    #[validate(length(min = 1, message = "refresh_token is required"))]
    pub refresh_token: String,
}

/// Logout request (body optional)
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct LogoutRequest {
    /// Also void every other session of the account
    #[serde(default)]
    pub all_devices: bool,
    /// Refresh token to revoke together with the access token
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Logout response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LogoutResponse {
    pub success: bool,
}
