//! Per-batch wait state
//!
//! Pure state machine behind the waiter. It decides, for each input from the
//! channel transport or the ledger, whether the batch reaches its terminal
//! state. Once terminal, every further input is ignored.
//!
//! Termination rules are intentionally asymmetric:
//! - a single ledger result (success or error) for any signature ends the batch
//! - a channel `Transaction confirmed` for any signature ends the batch
//! - channel timeouts end the batch only after every signature timed out

use crate::ledger::LedgerResult;
use crate::models::{ChannelMessage, ChannelRequest, ChannelStatus, ConfirmationBatch};
use std::collections::HashSet;

/// Which source produced the confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationSource {
    Channel,
    Ledger,
}

impl std::fmt::Display for ConfirmationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfirmationSource::Channel => write!(f, "channel"),
            ConfirmationSource::Ledger => write!(f, "ledger"),
        }
    }
}

/// How a batch ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Confirmed {
        signature: String,
        source: ConfirmationSource,
    },
    /// The ledger reported a transaction error
    Failed { signature: String, error: String },
    /// Every signature timed out on the channel transport
    TimedOut,
    /// The caller cancelled the wait
    Cancelled,
    /// Both sources went away without a result
    Abandoned,
}

impl BatchOutcome {
    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            BatchOutcome::Confirmed { .. } => "confirmed",
            BatchOutcome::Failed { .. } => "failed",
            BatchOutcome::TimedOut => "timed_out",
            BatchOutcome::Cancelled => "cancelled",
            BatchOutcome::Abandoned => "abandoned",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BatchOutcome::Confirmed { .. })
    }
}

/// Result of feeding one input into the state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Not for this batch, or the batch already ended
    Ignored,
    /// Accepted, batch still waiting
    Recorded,
    /// Unknown status text on one of our channels
    Unexpected(String),
    Terminal(BatchOutcome),
}

/// Mutable state of one batch
#[derive(Debug)]
pub struct WaitState {
    batch: ConfirmationBatch,
    waiting: bool,
    timed_out: HashSet<String>,
}

impl WaitState {
    pub fn new(batch: ConfirmationBatch) -> Self {
        Self {
            batch,
            waiting: true,
            timed_out: HashSet::new(),
        }
    }

    pub fn batch(&self) -> &ConfirmationBatch {
        &self.batch
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    /// Distinct signatures reported as timed out so far
    pub fn timed_out_count(&self) -> usize {
        self.timed_out.len()
    }

    /// The `join` request to send after a transport (re)connect, if still waiting
    pub fn resubscribe_request(&self) -> Option<ChannelRequest> {
        self.waiting
            .then(|| ChannelRequest::join(self.batch.iter()))
    }

    pub fn on_channel_message(&mut self, message: &ChannelMessage) -> Transition {
        if !self.batch.contains(&message.channel) || !self.waiting {
            return Transition::Ignored;
        }

        match message.status() {
            ChannelStatus::Timeout => {
                self.timed_out.insert(message.channel.clone());
                if self.timed_out.len() >= self.batch.len() {
                    self.finish(BatchOutcome::TimedOut)
                } else {
                    Transition::Recorded
                }
            }
            ChannelStatus::Confirmed => self.finish(BatchOutcome::Confirmed {
                signature: message.channel.clone(),
                source: ConfirmationSource::Channel,
            }),
            ChannelStatus::Other(text) => Transition::Unexpected(text),
        }
    }

    pub fn on_ledger_result(&mut self, result: &LedgerResult) -> Transition {
        if !self.waiting || !self.batch.contains(&result.signature) {
            return Transition::Ignored;
        }

        let outcome = match &result.err {
            Some(error) => BatchOutcome::Failed {
                signature: result.signature.clone(),
                error: error.clone(),
            },
            None => BatchOutcome::Confirmed {
                signature: result.signature.clone(),
                source: ConfirmationSource::Ledger,
            },
        };
        self.finish(outcome)
    }

    /// End the batch on caller request
    pub fn cancel(&mut self) -> Transition {
        if !self.waiting {
            return Transition::Ignored;
        }
        self.finish(BatchOutcome::Cancelled)
    }

    /// End the batch because no source can still answer
    pub fn abandon(&mut self) -> Transition {
        if !self.waiting {
            return Transition::Ignored;
        }
        self.finish(BatchOutcome::Abandoned)
    }

    fn finish(&mut self, outcome: BatchOutcome) -> Transition {
        self.waiting = false;
        Transition::Terminal(outcome)
    }
}
