//! Core authentication types
//!
//! Shared types used across all authentication components.

use bloom_db::{User, UserRole};
use serde::{Deserialize, Serialize};

// =============================================================================
// Identity Types
// =============================================================================

/// Stable key an identity provider vouches for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum ExternalKey {
    Email(String),
    Telegram(i64),
}

/// Which verifier produced a claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Password,
    TelegramMiniapp,
    TelegramWebsite,
}

/// Result of a successful credential verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaim {
    pub external_key: ExternalKey,
    pub display_name: String,
    pub provenance: Provenance,
}

impl IdentityClaim {
    /// Telegram id, when the claim came from a Telegram verifier
    pub fn telegram_id(&self) -> Option<i64> {
        match self.external_key {
            ExternalKey::Telegram(id) => Some(id),
            ExternalKey::Email(_) => None,
        }
    }
}

// =============================================================================
// Token Types
// =============================================================================

/// Token type enum for JWT claims
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT claims structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (decimal user id)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Issued at in Unix microseconds; compared against revoke-all markers
    #[serde(default)]
    pub iat_micros: i64,
    /// Token type
    pub token_type: TokenType,
    /// JWT ID (unique identifier)
    pub jti: String,
}

impl TokenClaims {
    /// Issue time in microseconds, falling back to `iat` for tokens
    /// that predate the sub-second claim
    pub fn issued_at_micros(&self) -> i64 {
        if self.iat_micros > 0 {
            self.iat_micros
        } else {
            self.iat.saturating_mul(1_000_000)
        }
    }
}

/// JWT token pair (access + refresh)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// Access token
    pub access_token: String,
    /// Refresh token
    pub refresh_token: String,
    /// Access token expiry (Unix timestamp)
    pub access_expires_at: i64,
    /// Refresh token expiry (Unix timestamp)
    pub refresh_expires_at: i64,
    /// Token type (always "bearer")
    pub token_type: String,
}

impl TokenPair {
    pub fn new(
        access_token: String,
        refresh_token: String,
        access_expires_at: i64,
        refresh_expires_at: i64,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            access_expires_at,
            refresh_expires_at,
            token_type: "bearer".to_string(),
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// Public view of an account returned by login flows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub email: String,
    pub full_name: Option<String>,
    pub role: UserRole,
    pub is_verified: bool,
    pub bonus_points: i32,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            role: user.role,
            is_verified: user.is_verified,
            bonus_points: user.bonus_points,
        }
    }
}

/// Password / admin / refresh login result
#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub tokens: TokenPair,
    pub user: UserSummary,
}

/// Which Telegram surface authenticated the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelegramAuthMethod {
    Miniapp,
    Website,
}

/// Telegram login result
#[derive(Debug, Clone, Serialize)]
pub struct TelegramAuthResponse {
    pub tokens: TokenPair,
    pub user: UserSummary,
    pub is_new_user: bool,
    pub auth_method: TelegramAuthMethod,
}

/// The caller behind an authenticated request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: i64,
    pub email: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub telegram_id: Option<i64>,
    pub role: UserRole,
    pub is_active: bool,
    pub is_verified: bool,
    pub bonus_points: i32,
    pub address: Option<String>,
    pub preferences: Option<serde_json::Value>,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            phone: user.phone.clone(),
            telegram_id: user.telegram_id,
            role: user.role,
            is_active: user.is_active,
            is_verified: user.is_verified,
            bonus_points: user.bonus_points,
            address: user.address.clone(),
            preferences: user.preferences.clone(),
        }
    }
}

// =============================================================================
// Request Types
// =============================================================================

/// Self-service profile changes; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub preferences: Option<serde_json::Value>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none() && self.phone.is_none() && self.address.is_none() && self.preferences.is_none()
    }

    /// Apply the changes, returning whether anything differed
    pub fn apply(self, user: &mut User) -> bool {
        let mut changed = false;
        if let Some(full_name) = self.full_name {
            changed |= user.full_name.as_deref() != Some(full_name.as_str());
            user.full_name = Some(full_name);
        }
        if let Some(phone) = self.phone {
            changed |= user.phone.as_deref() != Some(phone.as_str());
            user.phone = Some(phone);
        }
        if let Some(address) = self.address {
            changed |= user.address.as_deref() != Some(address.as_str());
            user.address = Some(address);
        }
        if let Some(preferences) = self.preferences {
            changed |= user.preferences.as_ref() != Some(&preferences);
            user.preferences = Some(preferences);
        }
        changed
    }
}
