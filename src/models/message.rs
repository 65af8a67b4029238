//! Channel transport wire messages
//!
//! Outbound: `{"action":"join","channels":["<sig>", ...]}`
//! Inbound:  `{"channel":"<sig>","message":"Transaction confirmed"}`

use crate::constants::channel_messages;
use serde::{Deserialize, Serialize};

/// Action carried by an outbound channel request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelAction {
    /// Subscribe to the named channels
    Join,
}

/// Outbound request sent over the channel transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRequest {
    pub action: ChannelAction,
    pub channels: Vec<String>,
}

impl ChannelRequest {
    /// Build a `join` request naming every channel
    pub fn join<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            action: ChannelAction::Join,
            channels: channels.into_iter().map(Into::into).collect(),
        }
    }
}

/// Inbound message dispatched on a named channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Channel name; for signature confirmation this is the signature
    pub channel: String,
    /// Status text
    pub message: String,
}

impl ChannelMessage {
    pub fn new(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            message: message.into(),
        }
    }

    /// Interpret the status text
    pub fn status(&self) -> ChannelStatus {
        ChannelStatus::from(self.message.as_str())
    }
}

/// Known statuses pushed on a signature channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    Timeout,
    Confirmed,
    /// Anything the waiter does not understand
    Other(String),
}

impl From<&str> for ChannelStatus {
    fn from(message: &str) -> Self {
        match message {
            channel_messages::TRANSACTION_TIMEOUT => ChannelStatus::Timeout,
            channel_messages::TRANSACTION_CONFIRMED => ChannelStatus::Confirmed,
            other => ChannelStatus::Other(other.to_string()),
        }
    }
}
