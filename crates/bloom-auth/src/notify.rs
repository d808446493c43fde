//! Welcome notifications after Telegram logins
//!
//! Delivery is fire-and-forget: the orchestrator spawns the call and a
//! failure here never fails the login that triggered it.

use async_trait::async_trait;
use bloom_db::User;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{AuthError, AuthResult};

/// Outbound notification channel
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn enqueue_welcome_message(&self, user: &User, is_new_user: bool) -> AuthResult<()>;
}

fn welcome_text(user: &User, is_new_user: bool) -> String {
    let name = user.full_name.as_deref().unwrap_or("there");
    if is_new_user {
        format!(
            "🌸 Welcome to Bloom, {}!\n\nYour account is ready. Browse the catalog and start your first flower subscription.",
            name
        )
    } else {
        format!("🌷 Welcome back, {}! You have {} bonus points.", name, user.bonus_points)
    }
}

/// Logs welcome messages instead of sending them
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn enqueue_welcome_message(&self, user: &User, is_new_user: bool) -> AuthResult<()> {
        info!(
            user_id = user.id,
            telegram_id = ?user.telegram_id,
            is_new_user,
            "Welcome message (not sent, no bot configured)"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
}

/// Sends welcome messages through the Bot API `sendMessage` method
#[derive(Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    send_message_url: String,
}

impl TelegramNotifier {
    pub fn new(api_base_url: &str, bot_token: &str) -> AuthResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AuthError::Config(format!("Telegram client: {}", e)))?;

        Ok(Self {
            client,
            send_message_url: format!("{}/bot{}/sendMessage", api_base_url.trim_end_matches('/'), bot_token),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn enqueue_welcome_message(&self, user: &User, is_new_user: bool) -> AuthResult<()> {
        let Some(chat_id) = user.telegram_id else {
            debug!(user_id = user.id, "No Telegram chat for user, skipping welcome message");
            return Ok(());
        };

        let text = welcome_text(user, is_new_user);
        let response = self
            .client
            .post(&self.send_message_url)
            .json(&SendMessage {
                chat_id,
                text: &text,
                parse_mode: "HTML",
            })
            .send()
            .await
            .map_err(|e| AuthError::Internal(format!("sendMessage request failed: {}", e.without_url())))?;

        if !response.status().is_success() {
            return Err(AuthError::Internal(format!(
                "sendMessage returned {}",
                response.status()
            )));
        }

        debug!(user_id = user.id, is_new_user, "Welcome message sent");
        Ok(())
    }
}
