//! Configuration management for Nova Confirmer
//!
//! Loads configuration from config files and environment variables.
//! Environment variables override file values.

use crate::constants::{toasts, SIGNATURE_CONFIRMER_INSTANCE};
use crate::ledger::Commitment;
use config::{Config, ConfigError, Environment, File};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Channel transport (confirmation service WebSocket)
    pub transport: TransportConfig,
    /// Ledger pubsub endpoint
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Toast texts
    #[serde(default)]
    pub waiter: WaiterConfig,
    /// Notification sinks
    #[serde(default)]
    pub notifications: NotificationsConfig,
    /// Prometheus endpoint
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_log_format() -> String {
    "pretty".to_string()
}

/// Channel transport configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// WebSocket URL of the confirmation service
    pub url: String,
    /// Instance key, used to tag logs of the shared connection
    #[serde(default = "default_instance")]
    pub instance: String,
    /// Bearer token sent on connect
    #[serde(default)]
    pub auth_token: Option<SecretString>,
    /// Connect timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// First reconnect delay in milliseconds
    #[serde(default = "default_reconnect_min_delay")]
    pub reconnect_min_delay_ms: u64,
    /// Reconnect delay cap in milliseconds
    #[serde(default = "default_reconnect_max_delay")]
    pub reconnect_max_delay_ms: u64,
    /// Random jitter added to each reconnect delay
    #[serde(default = "default_reconnect_jitter")]
    pub reconnect_jitter_ms: u64,
    /// Give up after this many consecutive failed connects (unbounded if unset)
    #[serde(default)]
    pub max_reconnect_attempts: Option<u32>,
    /// Inbound event broadcast capacity
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Outbound request queue capacity
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,
}

fn default_instance() -> String {
    SIGNATURE_CONFIRMER_INSTANCE.to_string()
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_reconnect_min_delay() -> u64 {
    500
}

fn default_reconnect_max_delay() -> u64 {
    30_000
}

fn default_reconnect_jitter() -> u64 {
    500
}

fn default_event_capacity() -> usize {
    1024
}

fn default_outbound_capacity() -> usize {
    256
}

impl TransportConfig {
    /// Config with defaults for everything but the URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            instance: default_instance(),
            auth_token: None,
            connect_timeout_ms: default_connect_timeout(),
            reconnect_min_delay_ms: default_reconnect_min_delay(),
            reconnect_max_delay_ms: default_reconnect_max_delay(),
            reconnect_jitter_ms: default_reconnect_jitter(),
            max_reconnect_attempts: None,
            event_capacity: default_event_capacity(),
            outbound_capacity: default_outbound_capacity(),
        }
    }
}

/// Ledger pubsub configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Solana pubsub WebSocket URL
    #[serde(default = "default_ledger_ws_url")]
    pub ws_url: String,
    /// Commitment level for signature subscriptions
    #[serde(default)]
    pub commitment: Commitment,
}

fn default_ledger_ws_url() -> String {
    "wss://api.mainnet-beta.solana.com".to_string()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ledger_ws_url(),
            commitment: Commitment::default(),
        }
    }
}

/// Toast texts used by the waiter
#[derive(Debug, Clone, Deserialize)]
pub struct WaiterConfig {
    #[serde(default = "default_loading_message")]
    pub loading_message: String,
    #[serde(default = "default_success_message")]
    pub success_message: String,
    /// Prefix of the error toast; the ledger error is appended
    #[serde(default = "default_failure_message")]
    pub failure_message: String,
    #[serde(default = "default_timeout_message")]
    pub timeout_message: String,
}

fn default_loading_message() -> String {
    toasts::LOADING.to_string()
}

fn default_success_message() -> String {
    toasts::SUCCESS.to_string()
}

fn default_failure_message() -> String {
    toasts::FAILURE.to_string()
}

fn default_timeout_message() -> String {
    toasts::TIMEOUT.to_string()
}

impl Default for WaiterConfig {
    fn default() -> Self {
        Self {
            loading_message: default_loading_message(),
            success_message: default_success_message(),
            failure_message: default_failure_message(),
            timeout_message: default_timeout_message(),
        }
    }
}

/// Notification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
    /// Ring the terminal bell on confirmed batches
    #[serde(default = "default_true")]
    pub audio_enabled: bool,
    /// Telegram settings
    #[serde(default)]
    pub telegram: TelegramNotificationConfig,
}

fn default_true() -> bool {
    true
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            audio_enabled: true,
            telegram: TelegramNotificationConfig::default(),
        }
    }
}

/// Telegram notification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramNotificationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: Option<SecretString>,
    #[serde(default)]
    pub chat_id: String,
    /// Minimum seconds between two "waiting" messages
    #[serde(default = "default_notification_rate_limit")]
    pub loading_rate_limit_seconds: u64,
}

fn default_notification_rate_limit() -> u64 {
    30
}

impl Default for TelegramNotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: None,
            chat_id: String::new(),
            loading_rate_limit_seconds: default_notification_rate_limit(),
        }
    }
}

/// Metrics endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_host")]
    pub host: String,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_host() -> String {
    "127.0.0.1".to_string()
}

fn default_metrics_port() -> u16 {
    9100
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_metrics_host(),
            port: default_metrics_port(),
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (NOVA_*)
    /// 2. `extra_file` (if given)
    /// 3. config/nova.* (if exists)
    /// 4. nova.* (if exists)
    /// 5. Default values
    pub fn load(extra_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("transport.url", "ws://127.0.0.1:8787/ws")?
            .set_default("transport.connect_timeout_ms", 5000)?
            .set_default("transport.reconnect_min_delay_ms", 500)?
            .set_default("transport.reconnect_max_delay_ms", 30_000)?
            .set_default("ledger.ws_url", "wss://api.mainnet-beta.solana.com")?
            .set_default("ledger.commitment", "confirmed")?
            .set_default("metrics.enabled", false)?
            .add_source(File::with_name("nova").required(false))
            .add_source(File::with_name("config/nova").required(false));

        if let Some(path) = extra_file {
            builder = builder.add_source(File::from(path).required(true));
        }

        // NOVA_TRANSPORT__AUTH_TOKEN=... -> transport.auth_token
        let config = builder
            .add_source(
                Environment::with_prefix("NOVA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_ws_url(&self.transport.url) {
            return Err(ConfigError::Message(format!(
                "transport.url must start with ws:// or wss:// (got '{}')",
                self.transport.url
            )));
        }

        if !is_ws_url(&self.ledger.ws_url) {
            return Err(ConfigError::Message(format!(
                "ledger.ws_url must start with ws:// or wss:// (got '{}')",
                self.ledger.ws_url
            )));
        }

        if self.transport.reconnect_min_delay_ms == 0
            || self.transport.reconnect_min_delay_ms > self.transport.reconnect_max_delay_ms
        {
            return Err(ConfigError::Message(
                "transport reconnect delays must satisfy 0 < min <= max".to_string(),
            ));
        }

        if self.transport.event_capacity == 0 || self.transport.outbound_capacity == 0 {
            return Err(ConfigError::Message(
                "transport capacities must be greater than zero".to_string(),
            ));
        }

        let telegram = &self.notifications.telegram;
        if telegram.enabled {
            let token_missing = telegram
                .bot_token
                .as_ref()
                .map_or(true, |t| t.expose_secret().is_empty());
            if token_missing || telegram.chat_id.is_empty() {
                return Err(ConfigError::Message(
                    "Telegram enabled but NOVA_NOTIFICATIONS__TELEGRAM__BOT_TOKEN or CHAT_ID is missing"
                        .to_string(),
                ));
            }
        }

        Ok(())
    }
}

fn is_ws_url(url: &str) -> bool {
    url.starts_with("ws://") || url.starts_with("wss://")
}
