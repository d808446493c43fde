//! Rate Limiting Service
//!
//! Sliding-window limits over a sorted set per identifier
//! (`rate_limit:<identifier>`, score = request time in milliseconds).
//! Pruning, counting and recording run as one atomic step in the store, so
//! concurrent requests cannot both take the last slot. Rejected requests
//! are not recorded.
//!
//! The limiter fails open: if the store is unreachable the request is
//! admitted and a warning is logged.

use bloom_db::cache::keys;
use bloom_db::{KvStore, WindowOutcome};
use chrono::Utc;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{RateLimitConfig, RateLimitRule};
use crate::error::{AuthError, AuthResult};
use crate::kv::bounded;

/// Names of the configured limits
pub mod names {
    pub const AUTH_LOGIN: &str = "auth_login";
    pub const AUTH_REGISTER: &str = "auth_register";
    pub const API_GENERAL: &str = "api_general";
    pub const API_STRICT: &str = "api_strict";
    pub const USER_ACTIONS: &str = "user_actions";
    pub const USER_ORDERS: &str = "user_orders";
    pub const ADMIN_ACTIONS: &str = "admin_actions";
}

/// Rate limit state for response headers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitInfo {
    pub identifier: String,
    pub limit: u64,
    /// Requests counted in the current window
    pub count: u64,
    pub remaining: u64,
    pub window_secs: u64,
    /// Seconds until the oldest counted request leaves the window
    pub reset_after: u64,
    /// Set when the request was rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    /// Set when the store could not be consulted
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
}

impl RateLimitInfo {
    fn from_outcome(identifier: &str, limit: u64, window: Duration, now_ms: i64, outcome: &WindowOutcome) -> Self {
        let reset_after = outcome
            .oldest_ms
            .map(|oldest| seconds_until_free(oldest, window, now_ms))
            .unwrap_or(0);

        Self {
            identifier: identifier.to_string(),
            limit,
            count: outcome.count,
            remaining: limit.saturating_sub(outcome.count),
            window_secs: window.as_secs(),
            reset_after,
            retry_after: None,
            degraded: false,
        }
    }

    fn unchecked(identifier: &str, limit: u64, window: Duration) -> Self {
        Self {
            identifier: identifier.to_string(),
            limit,
            count: 0,
            remaining: limit,
            window_secs: window.as_secs(),
            reset_after: 0,
            retry_after: None,
            degraded: true,
        }
    }

    /// Standard rate limit response headers
    pub fn to_headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("X-RateLimit-Limit", self.limit.to_string()),
            ("X-RateLimit-Remaining", self.remaining.to_string()),
            ("X-RateLimit-Reset", self.reset_after.to_string()),
        ];
        if let Some(retry_after) = self.retry_after {
            headers.push(("Retry-After", retry_after.to_string()));
        }
        headers
    }
}

/// `max(1, ceil((oldest + window - now) / 1000))`
fn seconds_until_free(oldest_ms: i64, window: Duration, now_ms: i64) -> u64 {
    let remaining_ms = (oldest_ms + window.as_millis() as i64 - now_ms).max(0) as u64;
    remaining_ms.div_ceil(1000).max(1)
}

/// Sliding-window rate limiter over the shared KV store
#[derive(Clone)]
pub struct RateLimiter {
    kv: Arc<dyn KvStore>,
    config: RateLimitConfig,
    timeout: Duration,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(kv: Arc<dyn KvStore>, config: RateLimitConfig, timeout: Duration) -> Self {
        Self { kv, config, timeout }
    }

    pub fn rule(&self, name: &str) -> Option<RateLimitRule> {
        self.config.limits.get(name).copied()
    }

    fn key(identifier: &str) -> String {
        format!("{}{}", keys::RATE_LIMIT, identifier)
    }

    /// Admit or reject one request for `identifier` at the current time
    pub async fn is_allowed(&self, identifier: &str, limit: u64, window: Duration) -> (bool, RateLimitInfo) {
        self.is_allowed_at(identifier, limit, window, Utc::now().timestamp_millis())
            .await
    }

    /// [`is_allowed`](Self::is_allowed) with an explicit clock, in unix millis
    pub async fn is_allowed_at(
        &self,
        identifier: &str,
        limit: u64,
        window: Duration,
        now_ms: i64,
    ) -> (bool, RateLimitInfo) {
        let key = Self::key(identifier);
        let outcome = bounded(
            self.timeout,
            "rate_limit.admit",
            self.kv.window_admit(&key, now_ms, window, limit),
        )
        .await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(identifier = %identifier, error = %e, "Rate limiter unavailable, allowing request");
                return (true, RateLimitInfo::unchecked(identifier, limit, window));
            }
        };

        let mut info = RateLimitInfo::from_outcome(identifier, limit, window, now_ms, &outcome);
        if !outcome.admitted {
            info.retry_after = Some(info.reset_after.max(1));
            debug!(identifier = %identifier, count = outcome.count, limit, "Rate limit exceeded");
        }
        (outcome.admitted, info)
    }

    /// Apply the named limit to `identifier`.
    ///
    /// Each limit keeps its own window, keyed `<name>:<identifier>`.
    pub async fn check(&self, name: &str, identifier: &str) -> AuthResult<RateLimitInfo> {
        let Some(rule) = self.rule(name) else {
            warn!(limit = name, "Unknown rate limit, allowing request");
            return Ok(RateLimitInfo::unchecked(identifier, 0, Duration::ZERO));
        };
        if !self.config.enabled {
            return Ok(RateLimitInfo::unchecked(identifier, rule.requests, rule.window));
        }

        let scoped = format!("{}:{}", name, identifier);
        let (allowed, info) = self.is_allowed(&scoped, rule.requests, rule.window).await;
        if allowed {
            Ok(info)
        } else {
            warn!(identifier = %scoped, "Rate limit exceeded");
            Err(AuthError::RateLimited {
                retry_after: info.retry_after.unwrap_or(1),
            })
        }
    }

    /// Current window state without recording a request.
    ///
    /// The limit is taken from the `<name>:` prefix of `identifier`, falling
    /// back to `api_general`.
    pub async fn status(&self, identifier: &str) -> AuthResult<RateLimitInfo> {
        let rule = identifier
            .split_once(':')
            .and_then(|(name, _)| self.rule(name))
            .or_else(|| self.rule(names::API_GENERAL))
            .unwrap_or(RateLimitRule::new(100, 60));

        let now_ms = Utc::now().timestamp_millis();
        let outcome = bounded(
            self.timeout,
            "rate_limit.status",
            self.kv.window_peek(&Self::key(identifier), now_ms, rule.window),
        )
        .await?;
        Ok(RateLimitInfo::from_outcome(identifier, rule.requests, rule.window, now_ms, &outcome))
    }

    /// Forget every request recorded for `identifier`
    pub async fn clear(&self, identifier: &str) -> AuthResult<bool> {
        let cleared = bounded(self.timeout, "rate_limit.clear", self.kv.delete(&Self::key(identifier))).await?;
        debug!(identifier = %identifier, cleared, "Rate limit window cleared");
        Ok(cleared)
    }
}

// =============================================================================
// Identifiers
// =============================================================================

pub fn ip_identifier(ip: &str) -> String {
    format!("ip:{}", ip)
}

pub fn user_identifier(user_id: i64) -> String {
    format!("user:{}", user_id)
}

pub fn endpoint_identifier(method: &str, path: &str, ip: &str) -> String {
    format!("endpoint:{}:{}:{}", method, path, ip)
}

/// Extract the client IP.
///
/// Forwarding headers are client-controlled unless a proxy rewrites them, so
/// they are read only when `trust_forwarded` is set; otherwise the peer
/// address is the only source.
pub fn extract_client_ip(
    headers: &http::HeaderMap,
    peer_addr: Option<SocketAddr>,
    trust_forwarded: bool,
) -> String {
    let peer = || peer_addr.map(|a| a.ip().to_string());
    if !trust_forwarded {
        return peer().unwrap_or_else(|| "unknown".to_string());
    }

    let forwarded_for = headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let real_ip = headers
        .get("X-Real-IP")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    // Priority: X-Forwarded-For > X-Real-IP > peer addr
    forwarded_for
        .or(real_ip)
        .or_else(peer)
        .unwrap_or_else(|| "unknown".to_string())
}
