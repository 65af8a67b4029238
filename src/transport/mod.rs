//! Channel transport
//!
//! A long-lived duplex connection to the confirmation service. Clients ask to
//! `join` named channels and receive messages multiplexed by channel name.
//! One transport is shared by every waiter in the process.

pub mod ws;

pub use ws::WsTransport;

use crate::error::AppResult;
use crate::models::{ChannelMessage, ChannelRequest};
use tokio::sync::broadcast;

/// Events observed on the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A connection (or reconnection) was established
    Opened,
    /// Inbound message on a channel
    Message(ChannelMessage),
    /// The current connection dropped; a reconnect may follow
    Closed,
}

/// Shared channel transport
#[async_trait::async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Queue a request to the service
    async fn send(&self, request: ChannelRequest) -> AppResult<()>;

    /// Subscribe to transport events.
    ///
    /// Dropping the receiver unregisters the listener.
    fn events(&self) -> broadcast::Receiver<TransportEvent>;
}
