//! Password Service
//!
//! Argon2id for every new hash. Verification also accepts the bcrypt
//! hashes (`$2a$`, `$2b$`, `$2y$`) written by the previous backend, so
//! existing accounts keep working.
//!
//! Hashing is deliberately slow; the async wrappers move it onto the
//! blocking pool so concurrent logins are not serialized on a runtime
//! worker.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params, Version,
};
use rand::Rng;
use std::sync::{Arc, OnceLock};
use zeroize::Zeroizing;

use crate::config::PasswordConfig;
use crate::error::{AuthError, AuthResult};

const GENERATED_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*";

const COMMON_PASSWORDS: &[&str] = &[
    "password", "12345678", "qwerty", "abc123", "letmein", "iloveyou", "sunshine", "password1",
];

/// Hashed once per service; verified against when there is no real hash
const DUMMY_PASSWORD: &str = "bloom-dummy-password";

/// Password service for hashing and verification
#[derive(Clone)]
pub struct PasswordService {
    config: PasswordConfig,
    dummy_hash: Arc<OnceLock<String>>,
}

impl PasswordService {
    /// Create a new password service
    pub fn new(config: PasswordConfig) -> Self {
        Self {
            config,
            dummy_hash: Arc::new(OnceLock::new()),
        }
    }

    fn peppered(&self, password: &str) -> Zeroizing<String> {
        match &self.config.pepper {
            Some(pepper) => Zeroizing::new(format!("{}{}", password, pepper)),
            None => Zeroizing::new(password.to_string()),
        }
    }

    fn argon2(&self) -> AuthResult<Argon2<'static>> {
        let params = Params::new(self.config.memory_cost, self.config.time_cost, self.config.parallelism, None)
            .map_err(|e| AuthError::Config(format!("Invalid Argon2 params: {}", e)))?;
        Ok(Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Hash a password using Argon2id
    pub fn hash_password(&self, password: &str) -> AuthResult<String> {
        let salted = self.peppered(password);
        let salt = SaltString::generate(&mut OsRng);

        let hash = self
            .argon2()?
            .hash_password(salted.as_bytes(), &salt)
            .map_err(|e| AuthError::Internal(format!("Password hashing failed: {}", e)))?;

        Ok(hash.to_string())
    }

    /// Verify a password against a stored Argon2 or bcrypt hash.
    ///
    /// A hash in neither format never matches.
    pub fn verify_password(&self, password: &str, hash: &str) -> bool {
        if is_bcrypt(hash) {
            // Legacy hashes were written without a pepper
            return bcrypt::verify(password, hash).unwrap_or(false);
        }

        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        let salted = self.peppered(password);
        Argon2::default().verify_password(salted.as_bytes(), &parsed).is_ok()
    }

    /// [`hash_password`](Self::hash_password) on the blocking pool
    pub async fn hash_password_async(&self, password: &str) -> AuthResult<String> {
        let service = self.clone();
        let password = Zeroizing::new(password.to_string());
        tokio::task::spawn_blocking(move || service.hash_password(&password))
            .await
            .map_err(|e| AuthError::Internal(format!("Hashing task failed: {}", e)))?
    }

    /// [`verify_password`](Self::verify_password) on the blocking pool
    pub async fn verify_password_async(&self, password: &str, hash: &str) -> AuthResult<bool> {
        let service = self.clone();
        let password = Zeroizing::new(password.to_string());
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || service.verify_password(&password, &hash))
            .await
            .map_err(|e| AuthError::Internal(format!("Verification task failed: {}", e)))
    }

    /// Argon2id hash with the configured cost, computed on first use
    fn dummy_hash(&self) -> AuthResult<&str> {
        if let Some(hash) = self.dummy_hash.get() {
            return Ok(hash);
        }
        let hash = self.hash_password(DUMMY_PASSWORD)?;
        Ok(self.dummy_hash.get_or_init(|| hash))
    }

    /// Spend one verification's worth of work when there is no stored hash
    /// to check, so unknown and passwordless accounts answer no faster than
    /// a wrong password.
    pub async fn verify_dummy_async(&self, password: &str) -> AuthResult<()> {
        let service = self.clone();
        let password = Zeroizing::new(password.to_string());
        tokio::task::spawn_blocking(move || {
            let hash = service.dummy_hash()?;
            service.verify_password(&password, hash);
            Ok(())
        })
        .await
        .map_err(|e| AuthError::Internal(format!("Verification task failed: {}", e)))?
    }

    #[cfg(test)]
    pub(crate) fn dummy_hash_cached(&self) -> bool {
        self.dummy_hash.get().is_some()
    }

    /// Validate password strength
    pub fn validate_password_strength(&self, password: &str) -> AuthResult<()> {
        let mut errors = Vec::new();
        let length = password.chars().count();

        if length < self.config.min_password_length {
            errors.push(format!(
                "Password must be at least {} characters",
                self.config.min_password_length
            ));
        }
        if length > self.config.max_password_length {
            errors.push(format!(
                "Password must be at most {} characters",
                self.config.max_password_length
            ));
        }
        if self.config.require_letter && !password.chars().any(char::is_alphabetic) {
            errors.push("Password must contain at least one letter".to_string());
        }
        if self.config.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            errors.push("Password must contain at least one digit".to_string());
        }

        let lowercase = password.to_lowercase();
        if COMMON_PASSWORDS.iter().any(|common| lowercase.contains(common)) {
            errors.push("Password is too common".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AuthError::WeakPassword(errors.join("; ")))
        }
    }

    /// Whether a stored hash should be replaced on next successful login
    pub fn needs_rehash(&self, hash: &str) -> bool {
        is_bcrypt(hash) || !hash.starts_with("$argon2id$")
    }
}

fn is_bcrypt(hash: &str) -> bool {
    ["$2a$", "$2b$", "$2y$"].iter().any(|prefix| hash.starts_with(prefix))
}

/// Random password from letters, digits and `!@#$%^&*`
pub fn generate_password(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| GENERATED_ALPHABET[rng.gen_range(0..GENERATED_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> PasswordConfig {
        PasswordConfig {
            // Use lower values for tests to be fast
            memory_cost: 4096,
            time_cost: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_hash_and_verify() {
        let service = PasswordService::new(test_config());
        let password = "Tulips4ever";

        let hash = service.hash_password(password).unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(service.verify_password(password, &hash));
        assert!(!service.verify_password("wrongpassword", &hash));
    }

    #[tokio::test]
    async fn test_dummy_verification_uses_configured_cost() {
        let service = PasswordService::new(test_config());
        assert!(!service.dummy_hash_cached());

        service.verify_dummy_async("anything").await.unwrap();
        let hash = service.dummy_hash().unwrap().to_string();
        assert!(hash.starts_with("$argon2id$v=19$m=4096,t=1,"));

        // Clones share the cached hash
        let clone = service.clone();
        clone.verify_dummy_async("other").await.unwrap();
        assert_eq!(clone.dummy_hash().unwrap(), hash);
        assert!(!service.verify_password("anything", &hash));
    }

    #[test]
    fn test_hash_with_pepper() {
        let mut config = test_config();
        config.pepper = Some("secret-pepper".to_string());
        let service = PasswordService::new(config);

        let hash = service.hash_password("Tulips4ever").unwrap();
        assert!(service.verify_password("Tulips4ever", &hash));

        let service_no_pepper = PasswordService::new(test_config());
        assert!(!service_no_pepper.verify_password("Tulips4ever", &hash));
    }

    #[test]
    fn test_legacy_bcrypt_hash_verifies() {
        let service = PasswordService::new(test_config());
        let legacy = bcrypt::hash("Peonies2019", 4).unwrap();

        assert!(service.verify_password("Peonies2019", &legacy));
        assert!(!service.verify_password("Peonies2020", &legacy));
        assert!(service.needs_rehash(&legacy));
    }

    #[test]
    fn test_garbage_hash_never_matches() {
        let service = PasswordService::new(test_config());
        assert!(!service.verify_password("anything", "not-a-hash"));
        assert!(!service.verify_password("", ""));
    }

    #[test]
    fn test_password_validation() {
        let service = PasswordService::new(test_config());

        assert!(service.validate_password_strength("Tulips4ever").is_ok());
        assert!(service.validate_password_strength("Short1").is_err());
        assert!(service.validate_password_strength("onlyletters").is_err());
        assert!(service.validate_password_strength("1234567890").is_err());
        assert!(matches!(
            service.validate_password_strength("Password123"),
            Err(AuthError::WeakPassword(_))
        ));
    }

    #[test]
    fn test_generate_password_alphabet() {
        let password = generate_password(12);
        assert_eq!(password.len(), 12);
        assert!(password.bytes().all(|b| GENERATED_ALPHABET.contains(&b)));
        assert_ne!(generate_password(24), generate_password(24));
    }

    #[tokio::test]
    async fn test_async_wrappers() {
        let service = PasswordService::new(test_config());
        let hash = service.hash_password_async("Tulips4ever").await.unwrap();
        assert!(service.verify_password_async("Tulips4ever", &hash).await.unwrap());
        assert!(!service.verify_password_async("Roses4ever", &hash).await.unwrap());
    }
}
