//! Authentication configuration
//!
//! Centralized configuration for the auth core. Durations are written in
//! humantime form (`30m`, `5m`, `7days`) in config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::rate_limit::names;

/// Main authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Token signing and lifetimes
    pub jwt: JwtConfig,
    /// Password hashing configuration
    pub password: PasswordConfig,
    /// Telegram bot credentials and assertion freshness
    pub telegram: TelegramConfig,
    /// Named sliding-window limits
    pub rate_limit: RateLimitConfig,
    /// Identity cache configuration
    pub cache: CacheConfig,
    /// Upper bound on every key-value store round trip
    #[serde(with = "humantime_serde")]
    pub kv_timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt: JwtConfig::default(),
            password: PasswordConfig::default(),
            telegram: TelegramConfig::default(),
            rate_limit: RateLimitConfig::default(),
            cache: CacheConfig::default(),
            kv_timeout: Duration::from_millis(500),
        }
    }
}

/// JWT token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    /// Secret key for signing tokens (should be at least 256 bits)
    pub secret: String,
    /// Algorithm to use (HS256, HS384, HS512)
    pub algorithm: String,
    /// Access token lifetime
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,
    /// Refresh token lifetime
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,
    /// How long a "revoke all sessions" marker outlives the request
    #[serde(with = "humantime_serde")]
    pub revoke_all_ttl: Duration,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(), // Must be set in production
            algorithm: "HS256".to_string(),
            access_token_lifetime: Duration::from_secs(30 * 60), // 30 minutes
            refresh_token_lifetime: Duration::from_secs(30 * 24 * 60 * 60), // 30 days
            revoke_all_ttl: Duration::from_secs(7 * 24 * 60 * 60), // 7 days
        }
    }
}

/// Password hashing configuration (Argon2id)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordConfig {
    /// Memory cost in KiB (OWASP recommends 19456 KiB = 19 MiB minimum)
    pub memory_cost: u32,
    /// Time cost (iterations) - OWASP recommends 2 minimum
    pub time_cost: u32,
    /// Parallelism factor
    pub parallelism: u32,
    /// Pepper (additional secret, optional)
    pub pepper: Option<String>,
    /// Minimum password length
    pub min_password_length: usize,
    /// Maximum password length (to prevent DoS)
    pub max_password_length: usize,
    /// Require at least one letter
    pub require_letter: bool,
    /// Require at least one digit
    pub require_digit: bool,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost: 19456, // 19 MiB
            time_cost: 2,
            parallelism: 1,
            pepper: None,
            min_password_length: 8,
            max_password_length: 128,
            require_letter: true,
            require_digit: true,
        }
    }
}

/// Telegram bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token shared with Telegram; signs both Mini-App and widget payloads
    pub bot_token: Option<String>,
    /// Maximum age of a Login Widget assertion
    #[serde(with = "humantime_serde")]
    pub website_max_age: Duration,
    /// Maximum age of a Mini-App assertion (unbounded when unset)
    #[serde(with = "humantime_serde")]
    pub miniapp_max_age: Option<Duration>,
    /// Bot API base URL for welcome messages
    pub api_base_url: String,
    /// Send a welcome message after Telegram logins
    pub send_welcome: bool,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            website_max_age: Duration::from_secs(24 * 60 * 60), // 24 hours
            miniapp_max_age: None,
            api_base_url: "https://api.telegram.org".to_string(),
            send_welcome: true,
        }
    }
}

/// One named limit: at most `requests` per trailing `window`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub requests: u64,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl RateLimitRule {
    pub const fn new(requests: u64, window_secs: u64) -> Self {
        Self {
            requests,
            window: Duration::from_secs(window_secs),
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,
    /// Named limits, keyed by endpoint class
    pub limits: BTreeMap<String, RateLimitRule>,
    /// Take the client address from `X-Forwarded-For` / `X-Real-IP`.
    /// Enable only behind a proxy that overwrites those headers.
    pub trust_forwarded_headers: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let limits = [
            (names::AUTH_LOGIN, RateLimitRule::new(5, 300)),
            (names::AUTH_REGISTER, RateLimitRule::new(3, 3600)),
            (names::API_GENERAL, RateLimitRule::new(100, 60)),
            (names::API_STRICT, RateLimitRule::new(20, 60)),
            (names::USER_ACTIONS, RateLimitRule::new(200, 3600)),
            (names::USER_ORDERS, RateLimitRule::new(10, 3600)),
            (names::ADMIN_ACTIONS, RateLimitRule::new(1000, 3600)),
        ]
        .into_iter()
        .map(|(name, rule)| (name.to_string(), rule))
        .collect();

        Self {
            enabled: true,
            limits,
            trust_forwarded_headers: false,
        }
    }
}

/// Identity cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of a cached user snapshot
    #[serde(with = "humantime_serde")]
    pub user_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            user_ttl: Duration::from_secs(300), // 5 minutes
        }
    }
}

impl AuthConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.jwt.secret.is_empty() {
            errors.push("JWT secret must be set".to_string());
        } else if self.jwt.secret.len() < 32 {
            errors.push("JWT secret should be at least 256 bits (32 bytes)".to_string());
        }
        if !matches!(self.jwt.algorithm.as_str(), "HS256" | "HS384" | "HS512") {
            errors.push(format!(
                "JWT algorithm must be one of HS256, HS384, HS512 (got {})",
                self.jwt.algorithm
            ));
        }
        if self.jwt.access_token_lifetime >= self.jwt.refresh_token_lifetime {
            errors.push("Access token lifetime must be shorter than refresh token lifetime".to_string());
        }

        if self.password.memory_cost < 19456 {
            errors.push("Argon2 memory cost should be at least 19456 KiB (OWASP recommendation)".to_string());
        }
        if self.password.time_cost < 2 {
            errors.push("Argon2 time cost should be at least 2 (OWASP recommendation)".to_string());
        }

        if matches!(self.telegram.bot_token.as_deref(), Some(token) if token.trim().is_empty()) {
            errors.push("Telegram bot token must not be blank".to_string());
        }

        for (name, rule) in &self.rate_limit.limits {
            if rule.requests == 0 || rule.window.is_zero() {
                errors.push(format!("Rate limit '{}' must allow requests over a non-zero window", name));
            }
        }

        if self.kv_timeout.is_zero() {
            errors.push("KV timeout must be non-zero".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AuthConfig::default();
        assert_eq!(config.jwt.access_token_lifetime, Duration::from_secs(30 * 60));
        assert_eq!(config.cache.user_ttl, Duration::from_secs(300));
        assert_eq!(config.telegram.website_max_age, Duration::from_secs(86_400));
        assert_eq!(
            config.rate_limit.limits.get(names::AUTH_LOGIN),
            Some(&RateLimitRule::new(5, 300))
        );
        assert_eq!(config.rate_limit.limits.len(), 7);
        assert!(!config.rate_limit.trust_forwarded_headers);
    }

    #[test]
    fn test_config_validation_missing_secret() {
        let config = AuthConfig::default();
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("secret")));
    }

    #[test]
    fn test_config_validation_rejects_asymmetric_algorithm() {
        let mut config = AuthConfig::default();
        config.jwt.secret = "a".repeat(32);
        config.jwt.algorithm = "RS256".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_valid() {
        let mut config = AuthConfig::default();
        config.jwt.secret = "a".repeat(32);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_humantime_durations_deserialize() {
        let config: AuthConfig = serde_json::from_value(serde_json::json!({
            "jwt": { "secret": "s", "access_token_lifetime": "15m" },
            "rate_limit": {
                "limits": { "auth_login": { "requests": 2, "window": "1m" } },
                "trust_forwarded_headers": true
            },
            "kv_timeout": "250ms"
        }))
        .unwrap();

        assert_eq!(config.jwt.access_token_lifetime, Duration::from_secs(900));
        assert_eq!(config.jwt.algorithm, "HS256");
        assert_eq!(config.kv_timeout, Duration::from_millis(250));
        assert_eq!(
            config.rate_limit.limits.get("auth_login"),
            Some(&RateLimitRule::new(2, 60))
        );
        assert!(config.rate_limit.trust_forwarded_headers);
    }
}
