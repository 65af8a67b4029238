//! Log-backed notification sink
//!
//! Renders toasts as structured log lines and remembers which toasts are
//! still on screen, so dismissals can report what they closed.

use super::{NotificationSink, ToastId, ToastOptions, ToastState};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct LiveToast {
    state: ToastState,
    message: String,
    shown_at: DateTime<Utc>,
}

/// Sink that writes every toast to the tracing subscriber
#[derive(Default)]
pub struct LogSink {
    live: Mutex<HashMap<ToastId, LiveToast>>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toasts shown and not yet dismissed
    pub fn live_toasts(&self) -> usize {
        self.live.lock().len()
    }
}

#[async_trait::async_trait]
impl NotificationSink for LogSink {
    async fn show_toast(&self, options: ToastOptions) -> anyhow::Result<()> {
        tracing::info!(
            toast_id = %options.id,
            state = %options.state,
            "{}",
            options.message
        );
        self.live.lock().insert(
            options.id,
            LiveToast {
                state: options.state,
                message: options.message,
                shown_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn error(&self, message: &str) -> anyhow::Result<()> {
        tracing::error!(state = %ToastState::Error, "{}", message);
        Ok(())
    }

    async fn success(&self, message: &str) -> anyhow::Result<()> {
        tracing::info!(state = %ToastState::Success, "{}", message);
        Ok(())
    }

    async fn dismiss(&self, id: Option<ToastId>) -> anyhow::Result<()> {
        match id {
            Some(id) => {
                if let Some(toast) = self.live.lock().remove(&id) {
                    let shown_for_ms = (Utc::now() - toast.shown_at).num_milliseconds();
                    tracing::debug!(
                        toast_id = %id,
                        state = %toast.state,
                        shown_for_ms,
                        message = %toast.message,
                        "Toast dismissed"
                    );
                }
            }
            None => {
                let dismissed = {
                    let mut live = self.live.lock();
                    let count = live.len();
                    live.clear();
                    count
                };
                tracing::debug!(dismissed, "All toasts dismissed");
            }
        }
        Ok(())
    }
}
