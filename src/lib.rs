//! Nova Confirmer Library
//!
//! Transaction confirmation waiter for Solana: races a push-notification
//! channel against ledger signature subscriptions and reports each batch
//! outcome exactly once through a notification sink.

pub mod config;
pub mod constants;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod models;
pub mod notifications;
pub mod transport;
pub mod waiter;

// Re-export commonly used types for tests
pub use config::{AppConfig, LedgerConfig, TransportConfig, WaiterConfig};
pub use error::{AppError, AppResult};
pub use ledger::{Commitment, LedgerResult, LedgerSource, LedgerSubscription, SubscriptionId};
pub use metrics::ConfirmMetrics;
pub use models::{ChannelMessage, ChannelRequest, ChannelStatus, ConfirmationBatch};
pub use notifications::{AudioCue, CompositeSink, NotificationSink, ToastId, ToastOptions, ToastState};
pub use transport::{ChannelTransport, TransportEvent, WsTransport};
pub use waiter::{BatchOutcome, ConfirmationSource, ConfirmationWaiter, WaitHandle};
