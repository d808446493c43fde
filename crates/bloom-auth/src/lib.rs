//! Bloom Authentication Layer
//!
//! Authentication core for the Bloom flower-subscription service:
//!
//! - **Credential verification**: email + password (Argon2id, legacy bcrypt),
//!   Telegram Mini-App `initData` and Telegram Login Widget payloads
//! - **Tokens**: signed access / refresh pairs with per-token and per-user revocation
//! - **Identity cache**: short-lived user snapshots in the shared KV store
//! - **Rate limiting**: atomic sliding windows keyed by client or user
//!
//! # Failure policy
//!
//! KV reads degrade open (revocation lookups pass, rate limits admit, cache
//! misses). Writes that create a new revocation fail closed.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       AuthService                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Request → RateLimiter → Verifier → UserStore → Tokens      │
//! │                             │                               │
//! │              ┌──────────────┼──────────────┐                │
//! │              ▼              ▼              ▼                │
//! │         Password     Mini-App hash   Widget hash            │
//! │                                                             │
//! │  Bearer → TokenService ─┬─ RevocationStore (KV)             │
//! │                         └─ IdentityCache (KV) → UserStore   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod identity_cache;
pub mod jwt;
mod kv;
pub mod notify;
pub mod password;
pub mod rate_limit;
pub mod revocation;
pub mod service;
pub mod telegram;
pub mod types;

pub use config::AuthConfig;
pub use error::{AuthError, AuthResult, ErrorResponse};
pub use identity_cache::IdentityCache;
pub use jwt::TokenService;
pub use notify::{LogNotifier, Notifier, TelegramNotifier};
pub use password::PasswordService;
pub use rate_limit::{RateLimitInfo, RateLimiter};
pub use revocation::RevocationStore;
pub use service::AuthService;
pub use types::*;
