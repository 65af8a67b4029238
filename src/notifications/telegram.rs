//! Telegram notification sink
//!
//! Mirrors toasts into a Telegram chat via the Bot API. Loading toasts are
//! rate limited; terminal toasts are always sent.

use super::{NotificationSink, ToastId, ToastOptions, ToastState};
use crate::config::TelegramNotificationConfig;
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use std::time::{Duration, Instant};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Rate limiter for loading messages
struct RateLimiter {
    last_sent: RwLock<Option<Instant>>,
    interval: Duration,
}

impl RateLimiter {
    fn new(interval_seconds: u64) -> Self {
        Self {
            last_sent: RwLock::new(None),
            interval: Duration::from_secs(interval_seconds),
        }
    }

    fn can_send(&self) -> bool {
        match *self.last_sent.read() {
            Some(last) => last.elapsed() >= self.interval,
            None => true,
        }
    }

    fn mark_sent(&self) {
        *self.last_sent.write() = Some(Instant::now());
    }
}

/// Telegram notification sink
pub struct TelegramSink {
    bot_token: SecretString,
    chat_id: String,
    api_base: String,
    client: reqwest::Client,
    enabled: bool,
    loading_limiter: RateLimiter,
}

impl TelegramSink {
    /// Create a sink from config; `None` when disabled or missing credentials
    pub fn from_config(config: &TelegramNotificationConfig) -> anyhow::Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        let Some(bot_token) = config.bot_token.clone() else {
            return Ok(None);
        };
        if bot_token.expose_secret().is_empty() || config.chat_id.is_empty() {
            return Ok(None);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Some(Self {
            bot_token,
            chat_id: config.chat_id.clone(),
            api_base: TELEGRAM_API_BASE.to_string(),
            client,
            enabled: true,
            loading_limiter: RateLimiter::new(config.loading_rate_limit_seconds),
        }))
    }

    /// Send a message to Telegram
    async fn send_message(&self, text: &str) -> anyhow::Result<()> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.api_base,
            self.bot_token.expose_secret()
        );

        let payload = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        let response = self.client.post(&url).json(&payload).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Telegram API error: {} - {}", status, body);
        }

        Ok(())
    }
}

/// Format message with a state prefix
fn format_with_state(state: ToastState, message: &str) -> String {
    let prefix = match state {
        ToastState::Loading => "⏳ <b>PENDING</b>",
        ToastState::Success => "✅ <b>CONFIRMED</b>",
        ToastState::Error => "❌ <b>FAILED</b>",
    };

    format!("{}\n\n{}", prefix, escape_html(message))
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[async_trait::async_trait]
impl NotificationSink for TelegramSink {
    async fn show_toast(&self, options: ToastOptions) -> anyhow::Result<()> {
        if options.state == ToastState::Loading {
            if !self.loading_limiter.can_send() {
                tracing::debug!(toast_id = %options.id, "Rate limited, skipping loading message");
                return Ok(());
            }
            self.loading_limiter.mark_sent();
        }

        self.send_message(&format_with_state(options.state, &options.message))
            .await
    }

    async fn error(&self, message: &str) -> anyhow::Result<()> {
        self.send_message(&format_with_state(ToastState::Error, message))
            .await?;
        tracing::info!("Sent Telegram error notification");
        Ok(())
    }

    async fn success(&self, message: &str) -> anyhow::Result<()> {
        self.send_message(&format_with_state(ToastState::Success, message))
            .await?;
        tracing::info!("Sent Telegram success notification");
        Ok(())
    }

    async fn dismiss(&self, _id: Option<ToastId>) -> anyhow::Result<()> {
        // Chat messages cannot be dismissed
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled && !self.bot_token.expose_secret().is_empty() && !self.chat_id.is_empty()
    }
}
