//! Domain models shared by the waiter and its collaborators

pub mod batch;
pub mod message;

pub use batch::ConfirmationBatch;
pub use message::{ChannelAction, ChannelMessage, ChannelRequest, ChannelStatus};
