//! Telegram credential verification
//!
//! Two assertion formats are accepted, both signed with the bot token:
//!
//! - **Mini-App `initData`**: a form-encoded string. The secret key is
//!   `HMAC_SHA256(key = "WebAppData", msg = bot_token)`.
//! - **Login Widget**: a flat JSON object. The secret key is
//!   `SHA256(bot_token)`, and `auth_date` must be within `max_age`.
//!
//! In both cases the data-check string is every field except `hash`,
//! sorted by key, joined as `key=value` lines. Verifiers are pure
//! functions of `(payload, bot_token, now)`.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::error::{AuthError, AuthResult};
use crate::types::{ExternalKey, IdentityClaim, Provenance};

type HmacSha256 = Hmac<Sha256>;

const WEB_APP_DATA_KEY: &[u8] = b"WebAppData";

// =============================================================================
// Payloads
// =============================================================================

/// The `user` object embedded in Mini-App `initData`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub language_code: Option<String>,
}

/// Login Widget callback payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramWidgetPayload {
    pub id: i64,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    pub auth_date: i64,
    pub hash: String,
}

impl TelegramWidgetPayload {
    /// Non-null fields other than `hash`, keyed for the data-check string
    fn check_fields(&self) -> BTreeMap<&'static str, String> {
        let mut fields = BTreeMap::new();
        fields.insert("id", self.id.to_string());
        fields.insert("first_name", self.first_name.clone());
        fields.insert("auth_date", self.auth_date.to_string());
        if let Some(last_name) = &self.last_name {
            fields.insert("last_name", last_name.clone());
        }
        if let Some(username) = &self.username {
            fields.insert("username", username.clone());
        }
        if let Some(photo_url) = &self.photo_url {
            fields.insert("photo_url", photo_url.clone());
        }
        fields
    }
}

fn display_name(first_name: &str, last_name: Option<&str>) -> String {
    match last_name.filter(|l| !l.is_empty()) {
        Some(last) => format!("{} {}", first_name, last),
        None => first_name.to_string(),
    }
}

// =============================================================================
// Signing primitives
// =============================================================================

fn data_check_string<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    fields
        .into_iter()
        .filter(|(k, _)| k.as_ref() != "hash")
        .map(|(k, v)| format!("{}={}", k.as_ref(), v.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn hmac_hex(secret: &[u8], data: &str) -> AuthResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|e| AuthError::Internal(e.to_string()))?;
    mac.update(data.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn miniapp_secret(bot_token: &str) -> AuthResult<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(WEB_APP_DATA_KEY).map_err(|e| AuthError::Internal(e.to_string()))?;
    mac.update(bot_token.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

fn website_secret(bot_token: &str) -> Vec<u8> {
    Sha256::digest(bot_token.as_bytes()).to_vec()
}

fn hashes_match(received: &str, expected: &str) -> bool {
    received.len() == expected.len() && bool::from(received.as_bytes().ct_eq(expected.as_bytes()))
}

/// Hash Telegram would attach to the given Mini-App fields
pub fn miniapp_hash(fields: &BTreeMap<String, String>, bot_token: &str) -> AuthResult<String> {
    hmac_hex(&miniapp_secret(bot_token)?, &data_check_string(fields))
}

/// Hash Telegram would attach to the given widget payload (its `hash` is ignored)
pub fn website_hash(payload: &TelegramWidgetPayload, bot_token: &str) -> AuthResult<String> {
    hmac_hex(&website_secret(bot_token), &data_check_string(payload.check_fields()))
}

// =============================================================================
// Mini-App
// =============================================================================

/// Parse form-encoded `initData`.
///
/// `+` decodes to a space, the first occurrence of a key wins, and blank
/// values are kept since Telegram signs them.
pub fn parse_init_data(init_data: &str) -> AuthResult<BTreeMap<String, String>> {
    let mut fields = BTreeMap::new();
    for pair in init_data.split('&').filter(|p| !p.is_empty()) {
        let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = form_decode(raw_key)?;
        let value = form_decode(raw_value)?;
        fields.entry(key).or_insert(value);
    }
    Ok(fields)
}

fn form_decode(raw: &str) -> AuthResult<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| AuthError::InvalidSignature)
}

/// Verify Mini-App `initData` and extract the Telegram identity.
///
/// The freshness bound, when configured, is checked only after the hash
/// matches.
pub fn verify_miniapp(
    init_data: &str,
    bot_token: &str,
    max_age: Option<Duration>,
    now: DateTime<Utc>,
) -> AuthResult<(IdentityClaim, TelegramUser)> {
    let fields = parse_init_data(init_data)?;

    let received = fields.get("hash").ok_or_else(|| {
        debug!("Mini-App payload has no hash");
        AuthError::InvalidSignature
    })?;
    let expected = miniapp_hash(&fields, bot_token)?;
    if !hashes_match(received, &expected) {
        debug!("Mini-App hash mismatch");
        return Err(AuthError::InvalidSignature);
    }

    if let Some(max_age) = max_age {
        let auth_date = fields
            .get("auth_date")
            .and_then(|v| v.parse::<i64>().ok())
            .ok_or(AuthError::InvalidSignature)?;
        check_freshness(auth_date, max_age, now)?;
    }

    let user: TelegramUser = fields
        .get("user")
        .and_then(|raw| serde_json::from_str(raw).ok())
        .ok_or_else(|| {
            debug!("Mini-App payload has no usable user object");
            AuthError::InvalidSignature
        })?;

    let claim = IdentityClaim {
        external_key: ExternalKey::Telegram(user.id),
        display_name: display_name(&user.first_name, user.last_name.as_deref()),
        provenance: Provenance::TelegramMiniapp,
    };
    Ok((claim, user))
}

// =============================================================================
// Login Widget
// =============================================================================

/// Verify a Login Widget payload: freshness first, then the hash
pub fn verify_website(
    payload: &TelegramWidgetPayload,
    bot_token: &str,
    max_age: Duration,
    now: DateTime<Utc>,
) -> AuthResult<IdentityClaim> {
    check_freshness(payload.auth_date, max_age, now)?;

    let expected = website_hash(payload, bot_token)?;
    if !hashes_match(&payload.hash, &expected) {
        debug!(telegram_id = payload.id, "Login Widget hash mismatch");
        return Err(AuthError::InvalidSignature);
    }

    Ok(IdentityClaim {
        external_key: ExternalKey::Telegram(payload.id),
        display_name: display_name(&payload.first_name, payload.last_name.as_deref()),
        provenance: Provenance::TelegramWebsite,
    })
}

fn check_freshness(auth_date: i64, max_age: Duration, now: DateTime<Utc>) -> AuthResult<()> {
    let age = now.timestamp() - auth_date;
    if age > max_age.as_secs() as i64 {
        debug!(age_secs = age, "Telegram assertion is stale");
        return Err(AuthError::StaleAssertion);
    }
    Ok(())
}
