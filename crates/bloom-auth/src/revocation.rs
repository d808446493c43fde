//! Revocation store
//!
//! Two kinds of entries live in the shared KV store:
//!
//! - `token_blacklist:<token>` → `"revoked"`, expiring when the token would
//! - `user_blacklist:<id>` → Unix microseconds of a "revoke all sessions"
//!   request (a bare seconds value is read as the end of that second)
//!
//! Reads fail open: an unreachable store means "not revoked" and a warning.
//! New revocations fail closed: the caller gets `DependencyUnavailable`
//! rather than a success that was never recorded.

use bloom_db::cache::keys;
use bloom_db::KvStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::AuthResult;
use crate::kv::bounded;

const TOKEN_REVOKED: &str = "revoked";

/// Markers below this are Unix seconds written before the microsecond format
const SECONDS_MARKER_LIMIT: i64 = 100_000_000_000;

/// Token and user revocation entries over the shared KV store
#[derive(Clone)]
pub struct RevocationStore {
    kv: Arc<dyn KvStore>,
    timeout: Duration,
}

impl RevocationStore {
    pub fn new(kv: Arc<dyn KvStore>, timeout: Duration) -> Self {
        Self { kv, timeout }
    }

    // =========================================================================
    // Raw operations
    // =========================================================================

    /// Write an entry; errors surface to the caller
    pub async fn set(&self, key: &str, value: &str, ttl: Duration) -> AuthResult<()> {
        bounded(self.timeout, "revocation.set", self.kv.set_ex(key, value, ttl)).await
    }

    /// Whether an entry exists; an unreachable store answers `false`
    pub async fn exists(&self, key: &str) -> bool {
        match bounded(self.timeout, "revocation.exists", self.kv.exists(key)).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(error = %e, "Revocation lookup failed, treating as not revoked");
                false
            }
        }
    }

    /// Remove an entry; errors surface to the caller
    pub async fn delete(&self, key: &str) -> AuthResult<bool> {
        bounded(self.timeout, "revocation.delete", self.kv.delete(key)).await
    }

    // =========================================================================
    // Token entries
    // =========================================================================

    pub async fn is_token_revoked(&self, token: &str) -> bool {
        self.exists(&token_key(token)).await
    }

    /// Blacklist a token for `ttl`, its remaining validity
    pub async fn revoke_token(&self, token: &str, ttl: Duration) -> AuthResult<()> {
        self.set(&token_key(token), TOKEN_REVOKED, ttl).await?;
        debug!(ttl_secs = ttl.as_secs(), "Token revoked");
        Ok(())
    }

    // =========================================================================
    // User entries
    // =========================================================================

    /// When all of a user's sessions were last revoked.
    ///
    /// `Some(i64::MAX)` for a marker that is not a timestamp, so it still
    /// rejects every token. `None` when absent or the store is unreachable.
    pub async fn user_revoked_at(&self, user_id: i64) -> Option<i64> {
        let key = user_key(user_id);
        match bounded(self.timeout, "revocation.user_marker", self.kv.get(&key)).await {
            Ok(Some(value)) => Some(parse_marker(&value)),
            Ok(None) => None,
            Err(e) => {
                warn!(user_id, error = %e, "User revocation lookup failed, treating as not revoked");
                None
            }
        }
    }

    /// Record that every token issued to `user_id` up to `revoked_at` is void
    pub async fn revoke_user(&self, user_id: i64, revoked_at: i64, ttl: Duration) -> AuthResult<()> {
        self.set(&user_key(user_id), &revoked_at.to_string(), ttl).await?;
        debug!(user_id, "All sessions revoked");
        Ok(())
    }
}

fn parse_marker(value: &str) -> i64 {
    match value.trim().parse::<i64>() {
        Ok(secs) if (0..SECONDS_MARKER_LIMIT).contains(&secs) => secs * 1_000_000 + 999_999,
        Ok(micros) => micros,
        Err(_) => i64::MAX,
    }
}

fn token_key(token: &str) -> String {
    format!("{}{}", keys::TOKEN_BLACKLIST, token)
}

fn user_key(user_id: i64) -> String {
    format!("{}{}", keys::USER_BLACKLIST, user_id)
}
