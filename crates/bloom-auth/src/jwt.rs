//! JWT Token Service
//!
//! Stateless HMAC-signed access and refresh tokens. Revocation is layered
//! on top through the [`RevocationStore`]:
//! - a single token is blacklisted until its own expiry
//! - "revoke all" stores a microsecond timestamp; tokens issued at or
//!   before it are void, so a login right after the revoke stays valid

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::error::{AuthError, AuthResult};
use crate::revocation::RevocationStore;
use crate::types::{TokenClaims, TokenPair, TokenType};

/// Issues, decodes and revokes tokens
#[derive(Clone)]
pub struct TokenService {
    config: JwtConfig,
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    revocations: RevocationStore,
}

impl TokenService {
    /// Create a token service; only HMAC algorithms are accepted
    pub fn new(config: JwtConfig, revocations: RevocationStore) -> AuthResult<Self> {
        let algorithm = Algorithm::from_str(&config.algorithm)
            .map_err(|_| AuthError::Config(format!("Unknown JWT algorithm {}", config.algorithm)))?;
        if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(AuthError::Config(format!(
                "JWT algorithm {} is not an HMAC algorithm",
                config.algorithm
            )));
        }

        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Ok(Self {
            config,
            algorithm,
            encoding_key,
            decoding_key,
            revocations,
        })
    }

    pub fn revocations(&self) -> &RevocationStore {
        &self.revocations
    }

    // =========================================================================
    // Issuing
    // =========================================================================

    fn issue(&self, subject: i64, token_type: TokenType, lifetime: Duration) -> AuthResult<(String, i64)> {
        let issued = Utc::now();
        let now = issued.timestamp();
        let exp = now + lifetime.as_secs() as i64;
        let claims = TokenClaims {
            sub: subject.to_string(),
            exp,
            iat: now,
            iat_micros: issued.timestamp_micros(),
            token_type,
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Failed to encode token: {}", e)))?;
        Ok((token, exp))
    }

    pub fn issue_access(&self, subject: i64) -> AuthResult<String> {
        self.issue(subject, TokenType::Access, self.config.access_token_lifetime)
            .map(|(token, _)| token)
    }

    pub fn issue_refresh(&self, subject: i64) -> AuthResult<String> {
        self.issue(subject, TokenType::Refresh, self.config.refresh_token_lifetime)
            .map(|(token, _)| token)
    }

    /// Fresh access + refresh tokens for one subject
    pub fn issue_pair(&self, subject: i64) -> AuthResult<TokenPair> {
        let (access_token, access_exp) =
            self.issue(subject, TokenType::Access, self.config.access_token_lifetime)?;
        let (refresh_token, refresh_exp) =
            self.issue(subject, TokenType::Refresh, self.config.refresh_token_lifetime)?;
        Ok(TokenPair::new(access_token, refresh_token, access_exp, refresh_exp))
    }

    // =========================================================================
    // Decoding
    // =========================================================================

    /// Signature, expiry and subject format only; revocation is not consulted
    fn verify_signature(&self, token: &str) -> AuthResult<TokenClaims> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let claims = decode::<TokenClaims>(token, &self.decoding_key, &validation)?.claims;
        Self::subject_id(&claims)?;
        Ok(claims)
    }

    /// Full decode: signature and expiry, then the token blacklist, then the
    /// user marker. Any failure yields `None`.
    pub async fn decode(&self, token: &str) -> Option<TokenClaims> {
        let claims = match self.verify_signature(token) {
            Ok(claims) => claims,
            Err(_) => {
                debug!("Token failed signature or expiry check");
                return None;
            }
        };

        if self.revocations.is_token_revoked(token).await {
            debug!(jti = %claims.jti, "Token is blacklisted");
            return None;
        }

        let user_id = Self::subject_id(&claims).ok()?;
        if let Some(revoked_at) = self.revocations.user_revoked_at(user_id).await {
            if claims.issued_at_micros() <= revoked_at {
                debug!(user_id, "Token predates a revoke-all");
                return None;
            }
        }

        Some(claims)
    }

    async fn decode_typed(&self, token: &str, expected: TokenType) -> AuthResult<TokenClaims> {
        let claims = self.decode(token).await.ok_or(AuthError::InvalidToken)?;
        if claims.token_type != expected {
            debug!(jti = %claims.jti, "Token type mismatch");
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }

    /// Decode a token that must be an access token
    pub async fn decode_access(&self, token: &str) -> AuthResult<TokenClaims> {
        self.decode_typed(token, TokenType::Access).await
    }

    /// Decode a token that must be a refresh token
    pub async fn decode_refresh(&self, token: &str) -> AuthResult<TokenClaims> {
        self.decode_typed(token, TokenType::Refresh).await
    }

    /// The numeric user id carried in `sub`
    pub fn subject_id(claims: &TokenClaims) -> AuthResult<i64> {
        claims.sub.parse().map_err(|_| AuthError::InvalidToken)
    }

    // =========================================================================
    // Revocation
    // =========================================================================

    /// Blacklist a token until its own expiry.
    ///
    /// `Ok(false)` when the token is malformed or already expired, since
    /// there is nothing left to revoke. Revoking twice is harmless.
    pub async fn revoke(&self, token: &str) -> AuthResult<bool> {
        let Ok(claims) = self.verify_signature(token) else {
            return Ok(false);
        };

        let remaining = claims.exp - Utc::now().timestamp();
        if remaining <= 0 {
            return Ok(false);
        }

        self.revocations
            .revoke_token(token, Duration::from_secs(remaining as u64))
            .await?;
        Ok(true)
    }

    /// Void every token issued to `user_id` so far
    pub async fn revoke_all_for_user(&self, user_id: i64) -> AuthResult<bool> {
        self.revocations
            .revoke_user(user_id, Utc::now().timestamp_micros(), self.config.revoke_all_ttl)
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bloom_db::memory::MemoryKvStore;
    use bloom_db::KvStore;
    use std::sync::Arc;

    const SECRET: &str = "test-secret-key-for-jwt-tokens-min-32-bytes!";

    fn test_config() -> JwtConfig {
        JwtConfig {
            secret: SECRET.to_string(),
            ..Default::default()
        }
    }

    fn service() -> (Arc<MemoryKvStore>, TokenService) {
        let kv = Arc::new(MemoryKvStore::new());
        let revocations = RevocationStore::new(kv.clone(), Duration::from_millis(500));
        (kv, TokenService::new(test_config(), revocations).unwrap())
    }

    fn sign(claims: &serde_json::Value) -> String {
        encode(&Header::default(), claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    #[tokio::test]
    async fn test_decode_round_trips_subject() {
        let (_, tokens) = service();
        for subject in [1, 42, 9_007_199_254_740_993, i64::MAX] {
            let token = tokens.issue_access(subject).unwrap();
            let claims = tokens.decode(&token).await.unwrap();
            assert_eq!(claims.sub, subject.to_string());
            assert_eq!(TokenService::subject_id(&claims).unwrap(), subject);
        }
    }

    #[tokio::test]
    async fn test_pair_types_and_expiries() {
        let (_, tokens) = service();
        let pair = tokens.issue_pair(5).unwrap();
        assert_eq!(pair.token_type, "bearer");
        assert!(pair.refresh_expires_at > pair.access_expires_at);

        assert!(tokens.decode_access(&pair.access_token).await.is_ok());
        assert!(tokens.decode_refresh(&pair.refresh_token).await.is_ok());
        assert!(matches!(
            tokens.decode_refresh(&pair.access_token).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_same_second_tokens_are_distinct() {
        let (_, tokens) = service();
        let first = tokens.issue_access(3).unwrap();
        let second = tokens.issue_access(3).unwrap();
        assert_ne!(first, second);

        assert!(tokens.revoke(&first).await.unwrap());
        assert!(tokens.decode(&first).await.is_none());
        assert!(tokens.decode(&second).await.is_some());
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let (kv, tokens) = service();
        let token = tokens.issue_access(11).unwrap();

        assert!(tokens.revoke(&token).await.unwrap());
        assert!(tokens.revoke(&token).await.unwrap());
        assert!(tokens.decode(&token).await.is_none());
        assert_eq!(kv.count_prefix("token_blacklist:").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_revocation_lives_until_token_expiry() {
        let (kv, tokens) = service();
        let token = tokens.issue_access(11).unwrap();
        tokens.revoke(&token).await.unwrap();

        let ttl = kv.ttl(&format!("token_blacklist:{}", token)).unwrap();
        assert!(ttl <= Duration::from_secs(30 * 60));
        assert!(ttl >= Duration::from_secs(30 * 60 - 2));
    }

    #[tokio::test]
    async fn test_revoke_rejects_garbage_and_expired() {
        let (kv, tokens) = service();
        assert!(!tokens.revoke("not-a-token").await.unwrap());

        let now = Utc::now().timestamp();
        let expired = sign(&serde_json::json!({
            "sub": "4", "exp": now - 10, "iat": now - 100, "token_type": "access", "jti": "x"
        }));
        assert!(!tokens.revoke(&expired).await.unwrap());
        assert!(tokens.decode(&expired).await.is_none());
        assert_eq!(kv.count_prefix("token_blacklist:").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_revoke_fails_closed() {
        let (kv, tokens) = service();
        let token = tokens.issue_access(11).unwrap();
        kv.set_unavailable(true);

        assert!(matches!(
            tokens.revoke(&token).await,
            Err(AuthError::DependencyUnavailable(_))
        ));
        assert!(tokens.revoke_all_for_user(11).await.is_err());
    }

    #[tokio::test]
    async fn test_decode_fails_open_on_store_outage() {
        let (kv, tokens) = service();
        let token = tokens.issue_access(11).unwrap();
        kv.set_unavailable(true);
        assert!(tokens.decode(&token).await.is_some());
    }

    #[tokio::test]
    async fn test_revoke_all_for_user() {
        let (kv, tokens) = service();
        let mine = tokens.issue_pair(21).unwrap();
        let theirs = tokens.issue_access(22).unwrap();

        assert!(tokens.revoke_all_for_user(21).await.unwrap());
        assert!(tokens.decode(&mine.access_token).await.is_none());
        assert!(tokens.decode(&mine.refresh_token).await.is_none());
        assert!(tokens.decode(&theirs).await.is_some());

        let ttl = kv.ttl("user_blacklist:21").unwrap();
        assert!(ttl > Duration::from_secs(7 * 24 * 3600 - 5));
    }

    #[tokio::test]
    async fn test_login_right_after_revoke_all_is_valid() {
        let (_, tokens) = service();
        let old = tokens.issue_pair(23).unwrap();
        tokens.revoke_all_for_user(23).await.unwrap();
        let fresh = tokens.issue_pair(23).unwrap();

        assert!(tokens.decode(&old.access_token).await.is_none());
        assert!(tokens.decode_access(&fresh.access_token).await.is_ok());
        assert!(tokens.decode_refresh(&fresh.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_marker_voids_seconds_only_tokens_from_that_second() {
        let (kv, tokens) = service();
        let now = Utc::now();
        let legacy = sign(&serde_json::json!({
            "sub": "24", "exp": now.timestamp() + 600, "iat": now.timestamp(),
            "token_type": "access", "jti": "z"
        }));
        let marker = now.timestamp() * 1_000_000 + 1;
        kv.set_ex("user_blacklist:24", &marker.to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(tokens.decode(&legacy).await.is_none());
    }

    #[tokio::test]
    async fn test_tokens_after_marker_are_accepted() {
        let (kv, tokens) = service();
        let yesterday = (Utc::now() - chrono::Duration::days(1)).timestamp_micros();
        kv.set_ex("user_blacklist:30", &yesterday.to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        let token = tokens.issue_access(30).unwrap();
        assert!(tokens.decode(&token).await.is_some());
    }

    #[tokio::test]
    async fn test_non_numeric_subject_is_rejected() {
        let (_, tokens) = service();
        let now = Utc::now().timestamp();
        let token = sign(&serde_json::json!({
            "sub": "alice", "exp": now + 600, "iat": now, "token_type": "access", "jti": "y"
        }));
        assert!(tokens.decode(&token).await.is_none());
    }

    #[tokio::test]
    async fn test_wrong_secret_is_rejected() {
        let (_, tokens) = service();
        let other = TokenService::new(
            JwtConfig {
                secret: "another-secret-key-that-is-32-bytes-long".to_string(),
                ..Default::default()
            },
            tokens.revocations().clone(),
        )
        .unwrap();

        let token = other.issue_access(1).unwrap();
        assert!(tokens.decode(&token).await.is_none());
    }

    #[test]
    fn test_rejects_asymmetric_algorithm() {
        let kv = Arc::new(MemoryKvStore::new());
        let revocations = RevocationStore::new(kv, Duration::from_millis(500));
        let config = JwtConfig {
            algorithm: "RS256".to_string(),
            ..test_config()
        };
        assert!(matches!(
            TokenService::new(config, revocations),
            Err(AuthError::Config(_))
        ));
    }
}
