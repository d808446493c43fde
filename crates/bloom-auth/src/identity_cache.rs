//! Identity cache
//!
//! Short-lived JSON snapshots of user records under `user_cache:<id>`, so
//! authenticated requests skip the primary store. Snapshots never include
//! the password hash.
//!
//! The cache may briefly disagree with the primary store. Every write to a
//! user record must call [`IdentityCache::invalidate`] before returning.
//! Reads fail open (a miss), writes are best-effort and only logged.

use bloom_db::cache::keys;
use bloom_db::{KvStore, User, UserRole, UserStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::AuthResult;
use crate::kv::bounded;

/// Serialized identity snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedUser {
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
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CachedUser {
    pub fn from_user(user: &User) -> Self {
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
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }

    /// Rebuild a [`User`]; the password hash is not cached and comes back empty
    pub fn into_user(self) -> User {
        User {
            id: self.id,
            email: self.email,
            hashed_password: None,
            full_name: self.full_name,
            phone: self.phone,
            telegram_id: self.telegram_id,
            role: self.role,
            is_active: self.is_active,
            is_verified: self.is_verified,
            bonus_points: self.bonus_points,
            address: self.address,
            preferences: self.preferences,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Cache status reported to operators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    /// `active`, or `error` when the store could not be reached
    pub status: String,
    pub cached_users: u64,
    pub key_prefix: String,
    pub default_ttl_secs: u64,
    pub kv_connected: bool,
}

/// User snapshots in the shared KV store
#[derive(Clone)]
pub struct IdentityCache {
    kv: Arc<dyn KvStore>,
    default_ttl: Duration,
    timeout: Duration,
}

impl IdentityCache {
    pub fn new(kv: Arc<dyn KvStore>, default_ttl: Duration, timeout: Duration) -> Self {
        Self {
            kv,
            default_ttl,
            timeout,
        }
    }

    fn key(user_id: i64) -> String {
        format!("{}{}", keys::USER_CACHE, user_id)
    }

    /// Cached snapshot, or `None` on a miss, an outage, or a corrupt entry
    pub async fn get(&self, user_id: i64) -> Option<CachedUser> {
        let key = Self::key(user_id);
        let raw = match bounded(self.timeout, "user_cache.get", self.kv.get(&key)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(user_id, error = %e, "Identity cache read failed");
                return None;
            }
        };

        match serde_json::from_str::<CachedUser>(&raw) {
            Ok(cached) => {
                debug!(user_id, "Identity cache hit");
                Some(cached)
            }
            Err(e) => {
                warn!(user_id, error = %e, "Discarding unreadable identity snapshot");
                let _ = bounded(self.timeout, "user_cache.delete", self.kv.delete(&key)).await;
                None
            }
        }
    }

    /// Store a snapshot for `ttl`; returns whether it was written
    pub async fn set(&self, user: &User, ttl: Duration) -> bool {
        let payload = match serde_json::to_string(&CachedUser::from_user(user)) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(user_id = user.id, error = %e, "Failed to serialize identity snapshot");
                return false;
            }
        };

        let key = Self::key(user.id);
        match bounded(self.timeout, "user_cache.set", self.kv.set_ex(&key, &payload, ttl)).await {
            Ok(()) => {
                debug!(user_id = user.id, ttl_secs = ttl.as_secs(), "User cached");
                true
            }
            Err(e) => {
                warn!(user_id = user.id, error = %e, "Identity cache write failed");
                false
            }
        }
    }

    /// Store a snapshot for the configured default TTL
    pub async fn set_default(&self, user: &User) -> bool {
        self.set(user, self.default_ttl).await
    }

    /// Drop one snapshot; returns whether an entry was removed
    pub async fn invalidate(&self, user_id: i64) -> bool {
        let key = Self::key(user_id);
        match bounded(self.timeout, "user_cache.invalidate", self.kv.delete(&key)).await {
            Ok(removed) => {
                if removed {
                    debug!(user_id, "Identity cache invalidated");
                }
                removed
            }
            Err(e) => {
                warn!(user_id, error = %e, "Identity cache invalidation failed");
                false
            }
        }
    }

    /// Drop every snapshot, returning how many were removed
    pub async fn invalidate_all(&self) -> AuthResult<u64> {
        let removed = bounded(
            self.timeout,
            "user_cache.invalidate_all",
            self.kv.delete_prefix(keys::USER_CACHE),
        )
        .await?;
        info!(removed, "Invalidated all identity snapshots");
        Ok(removed)
    }

    /// Bulk-populate the cache, returning how many snapshots were written
    pub async fn warm(&self, users: &[User]) -> usize {
        let mut cached = 0;
        for user in users {
            if self.set_default(user).await {
                cached += 1;
            }
        }
        info!(cached, "Warmed identity cache");
        cached
    }

    pub async fn stats(&self) -> CacheStats {
        let counted = bounded(self.timeout, "user_cache.stats", self.kv.count_prefix(keys::USER_CACHE)).await;
        let (status, cached_users, kv_connected) = match counted {
            Ok(n) => ("active", n, true),
            Err(e) => {
                warn!(error = %e, "Identity cache stats unavailable");
                ("error", 0, false)
            }
        };

        CacheStats {
            status: status.to_string(),
            cached_users,
            key_prefix: keys::USER_CACHE.to_string(),
            default_ttl_secs: self.default_ttl.as_secs(),
            kv_connected,
        }
    }

    /// Read-through: cached snapshot, else the primary store (then cached)
    pub async fn load_user(&self, store: &dyn UserStore, user_id: i64) -> AuthResult<Option<User>> {
        if let Some(cached) = self.get(user_id).await {
            return Ok(Some(cached.into_user()));
        }

        let Some(user) = store.find_by_id(user_id).await? else {
            return Ok(None);
        };
        self.set_default(&user).await;
        Ok(Some(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bloom_db::memory::{MemoryKvStore, MemoryUserStore};
    use bloom_db::NewUser;

    fn cache() -> (Arc<MemoryKvStore>, IdentityCache) {
        let kv = Arc::new(MemoryKvStore::new());
        let cache = IdentityCache::new(kv.clone(), Duration::from_secs(300), Duration::from_millis(500));
        (kv, cache)
    }

    async fn stored_user(store: &MemoryUserStore) -> User {
        store
            .create(NewUser {
                email: "lily@example.com".to_string(),
                hashed_password: Some("$argon2id$secret".to_string()),
                full_name: Some("Lily".to_string()),
                telegram_id: Some(404),
                role: UserRole::Courier,
                is_active: true,
                is_verified: true,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_set_get_round_trip() {
        let (kv, cache) = cache();
        let store = MemoryUserStore::new();
        let mut user = stored_user(&store).await;
        user.bonus_points = 320;

        assert!(cache.set(&user, Duration::from_secs(60)).await);
        let cached = cache.get(user.id).await.unwrap();
        assert_eq!(cached.id, user.id);
        assert_eq!(cached.email, user.email);
        assert_eq!(cached.role, UserRole::Courier);
        assert!(cached.is_active);
        assert_eq!(cached.bonus_points, 320);

        let raw = kv.get(&format!("user_cache:{}", user.id)).await.unwrap().unwrap();
        assert!(!raw.contains("argon2id"));
    }

    #[tokio::test]
    async fn test_invalidate_then_get_misses() {
        let (_, cache) = cache();
        let store = MemoryUserStore::new();
        let user = stored_user(&store).await;

        cache.set_default(&user).await;
        assert!(cache.invalidate(user.id).await);
        assert!(cache.get(user.id).await.is_none());
        assert!(!cache.invalidate(user.id).await);
    }

    #[tokio::test]
    async fn test_default_ttl_applies() {
        let (kv, cache) = cache();
        let store = MemoryUserStore::new();
        let user = stored_user(&store).await;

        cache.set_default(&user).await;
        let ttl = kv.ttl(&format!("user_cache:{}", user.id)).unwrap();
        assert!(ttl > Duration::from_secs(298) && ttl <= Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_a_miss_and_removed() {
        let (kv, cache) = cache();
        kv.set_ex("user_cache:5", "{\"id\": \"five\"}", Duration::from_secs(60))
            .await
            .unwrap();

        assert!(cache.get(5).await.is_none());
        assert!(!kv.exists("user_cache:5").await.unwrap());
    }

    #[tokio::test]
    async fn test_outage_is_a_miss() {
        let (kv, cache) = cache();
        let store = MemoryUserStore::new();
        let user = stored_user(&store).await;
        cache.set_default(&user).await;

        kv.set_unavailable(true);
        assert!(cache.get(user.id).await.is_none());
        assert!(!cache.set_default(&user).await);

        let stats = cache.stats().await;
        assert_eq!(stats.status, "error");
        assert!(!stats.kv_connected);
    }

    #[tokio::test]
    async fn test_load_user_reads_through() {
        let (_, cache) = cache();
        let store = MemoryUserStore::new();
        let user = stored_user(&store).await;

        let loaded = cache.load_user(&store, user.id).await.unwrap().unwrap();
        assert_eq!(loaded.hashed_password.as_deref(), Some("$argon2id$secret"));
        assert!(cache.get(user.id).await.is_some());

        // Second read is served from the cache even if the store is down
        store.set_unavailable(true);
        let cached = cache.load_user(&store, user.id).await.unwrap().unwrap();
        assert_eq!(cached.email, user.email);
        assert!(cached.hashed_password.is_none());

        assert!(cache.load_user(&store, 999).await.is_err());
    }

    #[tokio::test]
    async fn test_warm_stats_and_invalidate_all() {
        let (_, cache) = cache();
        let store = MemoryUserStore::new();
        let first = stored_user(&store).await;
        let second = store
            .create(NewUser {
                email: "tulip@example.com".to_string(),
                is_active: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(cache.warm(&[first, second]).await, 2);
        let stats = cache.stats().await;
        assert_eq!(stats.cached_users, 2);
        assert_eq!(stats.key_prefix, "user_cache:");
        assert_eq!(stats.default_ttl_secs, 300);

        assert_eq!(cache.invalidate_all().await.unwrap(), 2);
        assert_eq!(cache.stats().await.cached_users, 0);
    }
}
