//! Authentication error types
//!
//! Every failure of the auth core maps to one variant here. Errors are:
//! - Informative for logging/debugging
//! - Safe for external exposure (no sensitive data leakage)
//! - Convertible to HTTP status codes

use bloom_db::DbError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    // =========================================================================
    // Credential Errors
    // =========================================================================
    /// Bad password or unknown account, merged to prevent enumeration
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Credentials are valid but the account is disabled
    #[error("Account is disabled")]
    InactiveAccount,

    /// Telegram HMAC mismatch or a required field is missing
    #[error("Invalid signature")]
    InvalidSignature,

    /// Telegram payload is older than the freshness bound
    #[error("Authentication data is too old")]
    StaleAssertion,

    // =========================================================================
    // Token Errors
    // =========================================================================
    /// Token is malformed, expired, revoked, or of the wrong type
    #[error("Invalid token")]
    InvalidToken,

    // =========================================================================
    // Rate Limiting Errors
    // =========================================================================
    /// Rate limit exceeded
    #[error("Rate limit exceeded, try again in {retry_after} seconds")]
    RateLimited {
        /// Seconds until a slot frees up
        retry_after: u64,
    },

    // =========================================================================
    // Permission Errors
    // =========================================================================
    /// Authenticated, but the role does not allow the operation
    #[error("Insufficient permissions")]
    Forbidden,

    // =========================================================================
    // Account Errors
    // =========================================================================
    /// Registration with an email that already has an account
    #[error("Email is already registered")]
    EmailTaken,

    /// Password does not meet requirements
    #[error("Password does not meet requirements: {0}")]
    WeakPassword(String),

    /// User not found
    #[error("User not found")]
    UserNotFound,

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// The shared key-value store is unreachable or timed out
    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    /// Primary user store error
    #[error("Database error: {0}")]
    Database(String),

    /// Unexpected failure inside a login flow
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (should not be exposed to clients)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Self::WeakPassword(_) => 400,

            // 401 Unauthorized
            Self::InvalidCredentials
            | Self::InvalidSignature
            | Self::StaleAssertion
            | Self::InvalidToken => 401,

            // 403 Forbidden
            Self::InactiveAccount | Self::Forbidden => 403,

            // 404 Not Found
            Self::UserNotFound => 404,

            // 409 Conflict
            Self::EmailTaken => 409,

            // 429 Too Many Requests
            Self::RateLimited { .. } => 429,

            // 503 Service Unavailable
            Self::DependencyUnavailable(_) => 503,

            // 500 Internal Server Error
            Self::Database(_) | Self::AuthenticationFailed(_) | Self::Config(_) | Self::Internal(_) => 500,
        }
    }

    /// Get an error code for the client (safe to expose)
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::InactiveAccount => "inactive_account",
            Self::InvalidSignature => "invalid_signature",
            Self::StaleAssertion => "stale_assertion",
            Self::InvalidToken => "invalid_token",
            Self::RateLimited { .. } => "rate_limited",
            Self::Forbidden => "forbidden",
            Self::EmailTaken => "email_taken",
            Self::WeakPassword(_) => "weak_password",
            Self::UserNotFound => "user_not_found",
            Self::DependencyUnavailable(_) => "dependency_unavailable",
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::Database(_) | Self::Config(_) | Self::Internal(_) => "internal_error",
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// Get safe message for client (doesn't leak internal details)
    pub fn client_message(&self) -> String {
        match self {
            Self::DependencyUnavailable(_) => "Service temporarily unavailable".to_string(),
            Self::AuthenticationFailed(_) => "Authentication failed".to_string(),
            Self::Database(_) | Self::Internal(_) | Self::Config(_) => "An internal error occurred".to_string(),
            _ => self.to_string(),
        }
    }

    /// Collapse unexpected failures into a generic authentication failure.
    ///
    /// Typed rejections pass through unchanged.
    pub fn into_login_failure(self) -> Self {
        match self {
            Self::Database(detail) | Self::Internal(detail) | Self::Config(detail) => {
                Self::AuthenticationFailed(detail)
            }
            other => other,
        }
    }
}

/// Error response for API clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (machine-readable)
    pub code: String,
    /// Error message (human-readable)
    pub message: String,
    /// Retry-after in seconds (for rate limiting)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl From<&AuthError> for ErrorResponse {
    fn from(error: &AuthError) -> Self {
        let retry_after = match error {
            AuthError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        };

        Self {
            code: error.error_code().to_string(),
            message: error.client_message(),
            retry_after,
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(_: jsonwebtoken::errors::Error) -> Self {
        Self::InvalidToken
    }
}

impl From<DbError> for AuthError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(_) => Self::UserNotFound,
            other if other.is_unavailable() => Self::DependencyUnavailable(other.to_string()),
            other => Self::Database(other.to_string()),
        }
    }
}
