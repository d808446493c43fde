//! In-memory stores for tests and local development
//!
//! Both stores follow the semantics of their Redis / PostgreSQL counterparts
//! closely enough for the auth core's tests: TTLs expire on the tokio clock,
//! sliding windows prune inclusively, and unique keys are enforced.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use crate::cache::{KvStore, WindowOutcome};
use crate::repos::UserStore;
use crate::{DbError, DbResult, NewUser, User};

// ============================================================================
// Key-value store
// ============================================================================

#[derive(Default)]
struct KvState {
    values: HashMap<String, (String, Instant)>,
    windows: HashMap<String, Vec<i64>>,
}

/// In-memory [`KvStore`] with switchable outage and latency simulation
#[derive(Default)]
pub struct MemoryKvStore {
    state: Mutex<KvState>,
    unavailable: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail as if the server were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every call by `latency` before answering
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Remaining lifetime of a live key
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let state = self.state.lock();
        state
            .values
            .get(key)
            .map(|(_, expires_at)| expires_at.saturating_duration_since(Instant::now()))
            .filter(|remaining| !remaining.is_zero())
    }

    /// Number of timestamps held for a window key
    pub fn window_len(&self, key: &str) -> usize {
        self.state.lock().windows.get(key).map_or(0, Vec::len)
    }

    async fn enter(&self) -> DbResult<()> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DbError::Kv("connection refused".to_string()));
        }
        Ok(())
    }

    fn live<'a>(state: &'a mut KvState, key: &str) -> Option<&'a String> {
        let now = Instant::now();
        if matches!(state.values.get(key), Some((_, expires_at)) if *expires_at <= now) {
            state.values.remove(key);
        }
        state.values.get(key).map(|(value, _)| value)
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> DbResult<()> {
        self.enter().await?;
        let ttl = ttl.max(Duration::from_millis(1));
        self.state
            .lock()
            .values
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> DbResult<Option<String>> {
        self.enter().await?;
        let mut state = self.state.lock();
        Ok(Self::live(&mut state, key).cloned())
    }

    async fn exists(&self, key: &str) -> DbResult<bool> {
        self.enter().await?;
        let mut state = self.state.lock();
        Ok(Self::live(&mut state, key).is_some() || state.windows.contains_key(key))
    }

    async fn delete(&self, key: &str) -> DbResult<bool> {
        self.enter().await?;
        let mut state = self.state.lock();
        let value = state.values.remove(key).is_some();
        let window = state.windows.remove(key).is_some();
        Ok(value || window)
    }

    async fn delete_prefix(&self, prefix: &str) -> DbResult<u64> {
        self.enter().await?;
        let mut state = self.state.lock();
        let before = state.values.len() + state.windows.len();
        state.values.retain(|k, _| !k.starts_with(prefix));
        state.windows.retain(|k, _| !k.starts_with(prefix));
        Ok((before - state.values.len() - state.windows.len()) as u64)
    }

    async fn count_prefix(&self, prefix: &str) -> DbResult<u64> {
        self.enter().await?;
        let now = Instant::now();
        let state = self.state.lock();
        let values = state
            .values
            .iter()
            .filter(|(k, (_, expires_at))| k.starts_with(prefix) && *expires_at > now)
            .count();
        let windows = state.windows.keys().filter(|k| k.starts_with(prefix)).count();
        Ok((values + windows) as u64)
    }

    async fn window_admit(
        &self,
        key: &str,
        now_ms: i64,
        window: Duration,
        limit: u64,
    ) -> DbResult<WindowOutcome> {
        self.enter().await?;
        let window_start = now_ms - window.as_millis() as i64;
        let mut state = self.state.lock();
        let entries = state.windows.entry(key.to_string()).or_default();

        entries.retain(|&ts| ts > window_start);
        let admitted = (entries.len() as u64) < limit;
        if admitted {
            entries.push(now_ms);
            entries.sort_unstable();
        }

        let outcome = WindowOutcome {
            admitted,
            count: entries.len() as u64,
            oldest_ms: entries.first().copied(),
        };
        if entries.is_empty() {
            state.windows.remove(key);
        }
        Ok(outcome)
    }

    async fn window_peek(&self, key: &str, now_ms: i64, window: Duration) -> DbResult<WindowOutcome> {
        self.enter().await?;
        let window_start = now_ms - window.as_millis() as i64;
        let state = self.state.lock();
        let live: Vec<i64> = state
            .windows
            .get(key)
            .map(|entries| entries.iter().copied().filter(|&ts| ts > window_start).collect())
            .unwrap_or_default();

        Ok(WindowOutcome {
            admitted: false,
            count: live.len() as u64,
            oldest_ms: live.first().copied(),
        })
    }

    async fn ping(&self) -> DbResult<()> {
        self.enter().await
    }
}

// ============================================================================
// User store
// ============================================================================

/// In-memory [`UserStore`] enforcing unique email and Telegram id
pub struct MemoryUserStore {
    users: Mutex<HashMap<i64, User>>,
    next_id: AtomicI64,
    unavailable: AtomicBool,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored accounts
    pub fn len(&self) -> usize {
        self.users.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.lock().is_empty()
    }

    fn check(&self) -> DbResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DbError::Connection("database unavailable".to_string()));
        }
        Ok(())
    }

    fn find(&self, predicate: impl Fn(&User) -> bool) -> Option<User> {
        self.users.lock().values().find(|u| predicate(u)).cloned()
    }
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

fn conflict(users: &HashMap<i64, User>, candidate: &User) -> Option<DbError> {
    users.values().filter(|u| u.id != candidate.id).find_map(|u| {
        if u.email == candidate.email {
            Some(DbError::Duplicate(format!("Email {} already exists", candidate.email)))
        } else if candidate.telegram_id.is_some() && u.telegram_id == candidate.telegram_id {
            Some(DbError::Duplicate("Telegram account already linked".to_string()))
        } else {
            None
        }
    })
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: i64) -> DbResult<Option<User>> {
        self.check()?;
        Ok(self.users.lock().get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> DbResult<Option<User>> {
        self.check()?;
        Ok(self.find(|u| u.email == email))
    }

    async fn find_by_telegram_id(&self, telegram_id: i64) -> DbResult<Option<User>> {
        self.check()?;
        Ok(self.find(|u| u.telegram_id == Some(telegram_id)))
    }

    async fn create(&self, new_user: NewUser) -> DbResult<User> {
        self.check()?;
        let now = Utc::now();
        let mut users = self.users.lock();
        let user = User {
            id: 0,
            email: new_user.email,
            hashed_password: new_user.hashed_password,
            full_name: new_user.full_name,
            phone: None,
            telegram_id: new_user.telegram_id,
            role: new_user.role,
            is_active: new_user.is_active,
            is_verified: new_user.is_verified,
            bonus_points: 0,
            address: None,
            preferences: None,
            created_at: now,
            updated_at: now,
        };
        if let Some(err) = conflict(&users, &user) {
            return Err(err);
        }

        let user = User {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            ..user
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn save(&self, user: &User) -> DbResult<User> {
        self.check()?;
        let mut users = self.users.lock();
        if !users.contains_key(&user.id) {
            return Err(DbError::NotFound(format!("user {}", user.id)));
        }
        if let Some(err) = conflict(&users, user) {
            return Err(err);
        }

        let saved = User {
            updated_at: Utc::now(),
            ..user.clone()
        };
        users.insert(saved.id, saved.clone());
        Ok(saved)
    }
}
