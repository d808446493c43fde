//! Admin DTOs

use bloom_auth::identity_cache::CacheStats;
use bloom_auth::RateLimitInfo;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Identity cache statistics
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CacheStatsResponse {
    /// `active` or `error`
    pub status: String,
    pub cached_users: u64,
    pub key_prefix: String,
    pub default_ttl_secs: u64,
    pub kv_connected: bool,
}

impl From<CacheStats> for CacheStatsResponse {
    fn from(stats: CacheStats) -> Self {
        Self {
            status: stats.status,
            cached_users: stats.cached_users,
            key_prefix: stats.key_prefix,
            default_ttl_secs: stats.default_ttl_secs,
            kv_connected: stats.kv_connected,
        }
    }
}

/// Result of dropping every cached identity
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CacheClearResponse {
    pub removed: u64,
}

/// Sliding-window state of one identifier
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RateLimitStatusResponse {
    pub identifier: String,
    pub limit: u64,
    pub count: u64,
    pub remaining: u64,
    pub window_secs: u64,
    /// Seconds until the oldest counted request expires
    pub reset_after: u64,
}

impl From<RateLimitInfo> for RateLimitStatusResponse {
    fn from(info: RateLimitInfo) -> Self {
        Self {
            identifier: info.identifier,
            limit: info.limit,
            count: info.count,
            remaining: info.remaining,
            window_secs: info.window_secs,
            reset_after: info.reset_after,
        }
    }
}

/// Result of clearing one rate-limit window
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RateLimitClearResponse {
    pub identifier: String,
    pub cleared: bool,
}

/// Result of revoking every session of a user
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RevokeSessionsResponse {
    pub user_id: i64,
    pub revoked: bool,
}
