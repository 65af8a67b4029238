//! Error types for Nova Confirmer

use thiserror::Error;

/// Application-level errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Validation error (bad caller input)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Channel transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Ledger subscription error
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Notification sink error
    #[error("Notification error: {0}")]
    Notification(String),

    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for AppError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        AppError::Transport(error.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        AppError::Transport(format!("serialization failed: {}", error))
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
