//! Notification sinks for Nova Confirmer
//!
//! The waiter reports progress as toasts:
//! - a loading toast when a batch starts
//! - exactly one success or error toast when it terminates
//! - an optional audio cue on success

pub mod audio;
pub mod log;
pub mod telegram;

pub use audio::TerminalBell;
pub use log::LogSink;
pub use telegram::TelegramSink;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Identifier of a toast, used to dismiss it later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ToastId(Uuid);

impl ToastId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ToastId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ToastId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Visual state of a toast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ToastState {
    Loading,
    Success,
    Error,
}

impl std::fmt::Display for ToastState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToastState::Loading => write!(f, "LOADING"),
            ToastState::Success => write!(f, "SUCCESS"),
            ToastState::Error => write!(f, "ERROR"),
        }
    }
}

/// Options of `show_toast`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToastOptions {
    pub id: ToastId,
    pub state: ToastState,
    pub message: String,
}

impl ToastOptions {
    pub fn loading(id: ToastId, message: impl Into<String>) -> Self {
        Self {
            id,
            state: ToastState::Loading,
            message: message.into(),
        }
    }
}

/// Caller-supplied notification sink
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    /// Show a toast with explicit state
    async fn show_toast(&self, options: ToastOptions) -> anyhow::Result<()>;

    /// Show an error toast
    async fn error(&self, message: &str) -> anyhow::Result<()>;

    /// Show a success toast
    async fn success(&self, message: &str) -> anyhow::Result<()>;

    /// Dismiss one toast, or all toasts when `id` is `None`
    async fn dismiss(&self, id: Option<ToastId>) -> anyhow::Result<()>;

    /// Check if the sink is enabled
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Audio cue played on confirmed transactions
pub trait AudioCue: Send + Sync {
    fn play(&self);
}

/// Composite sink that forwards to multiple sinks
///
/// A failing sink is logged and does not stop the others.
pub struct CompositeSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl CompositeSink {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add_sink(&mut self, sink: Arc<dyn NotificationSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    fn enabled(&self) -> impl Iterator<Item = &Arc<dyn NotificationSink>> {
        self.sinks.iter().filter(|sink| sink.is_enabled())
    }
}

impl Default for CompositeSink {
    fn default() -> Self {
        Self::new()
    }
}

fn log_failure(operation: &str, result: anyhow::Result<()>) {
    if let Err(e) = result {
        tracing::error!(error = %e, operation, "Notification sink failed");
    }
}

#[async_trait::async_trait]
impl NotificationSink for CompositeSink {
    async fn show_toast(&self, options: ToastOptions) -> anyhow::Result<()> {
        for sink in self.enabled() {
            log_failure("show_toast", sink.show_toast(options.clone()).await);
        }
        Ok(())
    }

    async fn error(&self, message: &str) -> anyhow::Result<()> {
        for sink in self.enabled() {
            log_failure("error", sink.error(message).await);
        }
        Ok(())
    }

    async fn success(&self, message: &str) -> anyhow::Result<()> {
        for sink in self.enabled() {
            log_failure("success", sink.success(message).await);
        }
        Ok(())
    }

    async fn dismiss(&self, id: Option<ToastId>) -> anyhow::Result<()> {
        for sink in self.enabled() {
            log_failure("dismiss", sink.dismiss(id).await);
        }
        Ok(())
    }
}
