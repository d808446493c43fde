//! Auth orchestrator
//!
//! Each flow is a fixed sequence; the first failing step aborts it:
//!
//! - password login: rate limit → look up → verify → active check → tokens
//! - Telegram login: rate limit → verify signature → look up or create → tokens → welcome
//! - refresh: decode refresh token → active check → new pair
//! - logout: revoke (idempotent), optionally every session of the user
//!
//! Typed rejections reach the caller unchanged. Anything unexpected is
//! logged in full and reported as a generic authentication failure.

use bloom_db::{DbError, KvStore, NewUser, User, UserRole, UserStore};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::identity_cache::IdentityCache;
use crate::jwt::TokenService;
use crate::notify::Notifier;
use crate::password::PasswordService;
use crate::rate_limit::{ip_identifier, names, RateLimiter};
use crate::revocation::RevocationStore;
use crate::telegram::{self, TelegramWidgetPayload};
use crate::types::{
    AuthResponse, CurrentUser, IdentityClaim, ProfileUpdate, TelegramAuthMethod, TelegramAuthResponse, UserSummary,
};

/// Domain of the placeholder emails given to Telegram accounts; not open to registration
pub const TELEGRAM_EMAIL_DOMAIN: &str = "telegram.local";

/// Email assigned to accounts created through Telegram
pub fn telegram_email(telegram_id: i64) -> String {
    format!("telegram_{}@{}", telegram_id, TELEGRAM_EMAIL_DOMAIN)
}

fn is_reserved_email(email: &str) -> bool {
    email
        .rsplit_once('@')
        .is_some_and(|(_, domain)| domain == TELEGRAM_EMAIL_DOMAIN)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Authentication orchestrator shared by all request handlers
#[derive(Clone)]
pub struct AuthService {
    config: AuthConfig,
    users: Arc<dyn UserStore>,
    tokens: TokenService,
    cache: IdentityCache,
    limiter: RateLimiter,
    passwords: PasswordService,
    notifier: Arc<dyn Notifier>,
}

impl AuthService {
    pub fn new(
        config: AuthConfig,
        users: Arc<dyn UserStore>,
        kv: Arc<dyn KvStore>,
        notifier: Arc<dyn Notifier>,
    ) -> AuthResult<Self> {
        let revocations = RevocationStore::new(kv.clone(), config.kv_timeout);
        let tokens = TokenService::new(config.jwt.clone(), revocations)?;
        let cache = IdentityCache::new(kv.clone(), config.cache.user_ttl, config.kv_timeout);
        let limiter = RateLimiter::new(kv, config.rate_limit.clone(), config.kv_timeout);
        let passwords = PasswordService::new(config.password.clone());

        Ok(Self {
            config,
            users,
            tokens,
            cache,
            limiter,
            passwords,
            notifier,
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn passwords(&self) -> &PasswordService {
        &self.passwords
    }

    fn login_failure(flow: &'static str, err: AuthError) -> AuthError {
        if err.is_server_error() && !matches!(err, AuthError::DependencyUnavailable(_)) {
            error!(flow, error = %err, "Login flow failed unexpectedly");
        }
        err.into_login_failure()
    }

    fn respond(&self, user: &User) -> AuthResult<AuthResponse> {
        Ok(AuthResponse {
            tokens: self.tokens.issue_pair(user.id)?,
            user: UserSummary::from(user),
        })
    }

    // =========================================================================
    // Password flows
    // =========================================================================

    /// Email + password login
    pub async fn login(&self, email: &str, password: &str, ip: &str) -> AuthResult<AuthResponse> {
        self.password_login(email, password, ip, false)
            .await
            .map_err(|e| Self::login_failure("password", e))
    }

    /// Password login restricted to administrators
    pub async fn admin_login(&self, email: &str, password: &str, ip: &str) -> AuthResult<AuthResponse> {
        self.password_login(email, password, ip, true)
            .await
            .map_err(|e| Self::login_failure("admin", e))
    }

    async fn password_login(&self, email: &str, password: &str, ip: &str, admin_only: bool) -> AuthResult<AuthResponse> {
        // 1. Rate limit before any credential work
        self.limiter.check(names::AUTH_LOGIN, &ip_identifier(ip)).await?;

        // 2. Look up; unknown accounts and bad passwords are indistinguishable,
        // in timing too
        let user = self.users.find_by_email(&normalize_email(email)).await?;
        let Some((user, hash)) = user.and_then(|u| u.hashed_password.clone().map(|h| (u, h))) else {
            self.passwords.verify_dummy_async(password).await?;
            return Err(AuthError::InvalidCredentials);
        };

        // 3. Verify off the runtime workers
        if !self.passwords.verify_password_async(password, &hash).await? {
            info!(user_id = user.id, "Failed password login");
            return Err(AuthError::InvalidCredentials);
        }

        // 4. Account state
        if !user.is_active {
            return Err(AuthError::InactiveAccount);
        }
        if admin_only && user.role != UserRole::Admin {
            warn!(user_id = user.id, "Non-admin attempted admin login");
            return Err(AuthError::Forbidden);
        }

        if self.passwords.needs_rehash(&hash) {
            self.upgrade_hash(&user, password).await;
        }

        // 5. Tokens
        let response = self.respond(&user)?;
        info!(user_id = user.id, admin = admin_only, "User logged in");
        Ok(response)
    }

    /// Replace a legacy hash after a successful login; failures are only logged
    async fn upgrade_hash(&self, user: &User, password: &str) {
        let upgraded = match self.passwords.hash_password_async(password).await {
            Ok(hash) => hash,
            Err(e) => {
                warn!(user_id = user.id, error = %e, "Password rehash failed");
                return;
            }
        };

        let mut user = user.clone();
        user.hashed_password = Some(upgraded);
        match self.users.save(&user).await {
            Ok(_) => info!(user_id = user.id, "Upgraded legacy password hash"),
            Err(e) => warn!(user_id = user.id, error = %e, "Could not store upgraded password hash"),
        }
    }

    /// Create a password account and sign it in
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        full_name: Option<String>,
        ip: &str,
    ) -> AuthResult<AuthResponse> {
        self.limiter.check(names::AUTH_REGISTER, &ip_identifier(ip)).await?;
        self.passwords.validate_password_strength(password)?;

        let email = normalize_email(email);
        if is_reserved_email(&email) {
            warn!(email = %email, "Registration attempted on the Telegram email domain");
            return Err(AuthError::EmailTaken);
        }
        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let hashed_password = self.passwords.hash_password_async(password).await?;
        let user = self
            .users
            .create(NewUser {
                email,
                hashed_password: Some(hashed_password),
                full_name,
                telegram_id: None,
                role: UserRole::Client,
                is_active: true,
                is_verified: false,
            })
            .await
            .map_err(|e| match e {
                DbError::Duplicate(_) => AuthError::EmailTaken,
                other => other.into(),
            })?;

        info!(user_id = user.id, "User registered");
        self.respond(&user)
    }

    // =========================================================================
    // Telegram flows
    // =========================================================================

    fn bot_token(&self) -> AuthResult<&str> {
        self.config
            .telegram
            .bot_token
            .as_deref()
            .ok_or_else(|| AuthError::Config("Telegram bot token is not configured".to_string()))
    }

    /// Login with Mini-App `initData`
    pub async fn telegram_miniapp(&self, init_data: &str, ip: &str) -> AuthResult<TelegramAuthResponse> {
        async {
            self.limiter.check(names::AUTH_LOGIN, &ip_identifier(ip)).await?;
            let (claim, _) = telegram::verify_miniapp(
                init_data,
                self.bot_token()?,
                self.config.telegram.miniapp_max_age,
                Utc::now(),
            )?;
            self.telegram_login(claim, TelegramAuthMethod::Miniapp).await
        }
        .await
        .map_err(|e| Self::login_failure("telegram_miniapp", e))
    }

    /// Login with a Login Widget payload
    pub async fn telegram_website(
        &self,
        payload: &TelegramWidgetPayload,
        ip: &str,
    ) -> AuthResult<TelegramAuthResponse> {
        async {
            self.limiter.check(names::AUTH_LOGIN, &ip_identifier(ip)).await?;
            let claim = telegram::verify_website(
                payload,
                self.bot_token()?,
                self.config.telegram.website_max_age,
                Utc::now(),
            )?;
            self.telegram_login(claim, TelegramAuthMethod::Website).await
        }
        .await
        .map_err(|e| Self::login_failure("telegram_website", e))
    }

    async fn telegram_login(
        &self,
        claim: IdentityClaim,
        auth_method: TelegramAuthMethod,
    ) -> AuthResult<TelegramAuthResponse> {
        let telegram_id = claim.telegram_id().ok_or(AuthError::InvalidSignature)?;
        let (user, is_new_user) = self.find_or_create_telegram_user(telegram_id, &claim.display_name).await?;

        if !user.is_active {
            return Err(AuthError::InactiveAccount);
        }

        let tokens = self.tokens.issue_pair(user.id)?;
        self.send_welcome(&user, is_new_user);

        info!(user_id = user.id, telegram_id, is_new_user, method = ?auth_method, "Telegram login");
        Ok(TelegramAuthResponse {
            tokens,
            user: UserSummary::from(&user),
            is_new_user,
            auth_method,
        })
    }

    /// Existing account for a Telegram id, or a new pre-verified one.
    ///
    /// A concurrent request may create the same account between our lookup
    /// and insert; the unique violation is answered by reading it back.
    /// An unlinked account already holding the placeholder email is claimed.
    async fn find_or_create_telegram_user(&self, telegram_id: i64, display_name: &str) -> AuthResult<(User, bool)> {
        if let Some(user) = self.users.find_by_telegram_id(telegram_id).await? {
            return Ok((user, false));
        }

        let created = self
            .users
            .create(NewUser {
                email: telegram_email(telegram_id),
                hashed_password: None,
                full_name: Some(display_name.to_string()),
                telegram_id: Some(telegram_id),
                role: UserRole::Client,
                is_active: true,
                is_verified: true,
            })
            .await;

        match created {
            Ok(user) => {
                info!(user_id = user.id, telegram_id, "Created user from Telegram login");
                Ok((user, true))
            }
            Err(DbError::Duplicate(detail)) => {
                warn!(telegram_id, detail = %detail, "Telegram user created concurrently, re-reading");
                if let Some(user) = self.users.find_by_telegram_id(telegram_id).await? {
                    return Ok((user, false));
                }
                match self.users.find_by_email(&telegram_email(telegram_id)).await? {
                    Some(user) if user.telegram_id.is_none() => {
                        let user = self.claim_placeholder(user, telegram_id).await?;
                        Ok((user, false))
                    }
                    _ => Err(AuthError::Database(format!(
                        "Telegram user {} conflict: {}",
                        telegram_id, detail
                    ))),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Link an unlinked account that holds a Telegram placeholder email.
    ///
    /// Only Telegram may sign in to it afterwards: the password is cleared
    /// and earlier sessions are revoked before the link is used.
    async fn claim_placeholder(&self, mut user: User, telegram_id: i64) -> AuthResult<User> {
        self.tokens.revoke_all_for_user(user.id).await?;

        user.telegram_id = Some(telegram_id);
        user.hashed_password = None;
        user.is_verified = true;
        let user = self.users.save(&user).await?;
        self.cache.invalidate(user.id).await;

        warn!(user_id = user.id, telegram_id, "Claimed account holding a Telegram placeholder email");
        Ok(user)
    }

    fn send_welcome(&self, user: &User, is_new_user: bool) {
        if !self.config.telegram.send_welcome {
            return;
        }

        let notifier = self.notifier.clone();
        let user = user.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.enqueue_welcome_message(&user, is_new_user).await {
                warn!(user_id = user.id, error = %e, "Welcome message failed");
            }
        });
    }

    // =========================================================================
    // Token lifecycle
    // =========================================================================

    /// Exchange a refresh token for a new pair; the old one stays valid
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<AuthResponse> {
        let claims = self.tokens.decode_refresh(refresh_token).await?;
        let user_id = TokenService::subject_id(&claims)?;

        let user = self.users.find_by_id(user_id).await?.ok_or(AuthError::InvalidToken)?;
        if !user.is_active {
            return Err(AuthError::InactiveAccount);
        }

        info!(user_id, "Tokens refreshed");
        self.respond(&user)
    }

    /// Revoke the presented token, and with `all_devices` every token of its user.
    ///
    /// Succeeds for tokens that are already invalid.
    pub async fn logout(&self, token: &str, all_devices: bool) -> AuthResult<()> {
        let claims = self.tokens.decode(token).await;
        self.tokens.revoke(token).await?;

        if let Some(claims) = claims {
            let user_id = TokenService::subject_id(&claims)?;
            if all_devices {
                self.tokens.revoke_all_for_user(user_id).await?;
            }
            info!(user_id, all_devices, "User logged out");
        }
        Ok(())
    }

    /// Void every session of a user
    pub async fn revoke_user_sessions(&self, user_id: i64) -> AuthResult<()> {
        self.tokens.revoke_all_for_user(user_id).await?;
        self.cache.invalidate(user_id).await;
        info!(user_id, "All sessions revoked");
        Ok(())
    }

    // =========================================================================
    // Authenticated requests
    // =========================================================================

    /// Resolve the caller behind an access token
    pub async fn authenticate(&self, access_token: &str) -> AuthResult<CurrentUser> {
        let claims = self.tokens.decode_access(access_token).await?;
        let user_id = TokenService::subject_id(&claims)?;

        let user = self
            .cache
            .load_user(self.users.as_ref(), user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;
        if !user.is_active {
            return Err(AuthError::InactiveAccount);
        }

        Ok(CurrentUser::from(&user))
    }

    async fn stored_user(&self, user_id: i64) -> AuthResult<User> {
        self.users.find_by_id(user_id).await?.ok_or(AuthError::UserNotFound)
    }

    /// Apply self-service profile changes
    pub async fn update_profile(&self, user_id: i64, changes: ProfileUpdate) -> AuthResult<CurrentUser> {
        let mut user = self.stored_user(user_id).await?;
        if changes.apply(&mut user) {
            user = self.users.save(&user).await?;
            info!(user_id, "Profile updated");
        }

        self.cache.invalidate(user_id).await;
        Ok(CurrentUser::from(&user))
    }

    /// Enable or disable an account; disabling also voids its sessions
    pub async fn set_active(&self, user_id: i64, active: bool) -> AuthResult<CurrentUser> {
        let mut user = self.stored_user(user_id).await?;
        user.is_active = active;
        let user = self.users.save(&user).await?;

        self.cache.invalidate(user_id).await;
        if !active {
            if let Err(e) = self.tokens.revoke_all_for_user(user_id).await {
                warn!(user_id, error = %e, "Could not revoke sessions of deactivated user");
            }
        }

        info!(user_id, active, "Account state changed");
        Ok(CurrentUser::from(&user))
    }
}
