//! Ledger subscription source
//!
//! Per-signature confirmation subscriptions against the ledger. Each
//! subscription delivers at most one [`LedgerResult`] and must be released
//! with [`LedgerSource::remove_signature_listener`] once it fired.

pub mod pubsub;

pub use pubsub::PubsubLedger;

use crate::error::AppResult;
use serde::{Deserialize, Serialize};
use solana_sdk::commitment_config::CommitmentConfig;
use tokio::sync::oneshot;

/// Handle returned by `on_signature`, used to release the listener
pub type SubscriptionId = u64;

/// Commitment level of a signature subscription
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl From<Commitment> for CommitmentConfig {
    fn from(commitment: Commitment) -> Self {
        match commitment {
            Commitment::Processed => CommitmentConfig::processed(),
            Commitment::Confirmed => CommitmentConfig::confirmed(),
            Commitment::Finalized => CommitmentConfig::finalized(),
        }
    }
}

impl std::fmt::Display for Commitment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Commitment::Processed => write!(f, "processed"),
            Commitment::Confirmed => write!(f, "confirmed"),
            Commitment::Finalized => write!(f, "finalized"),
        }
    }
}

/// Outcome the ledger reports for one signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerResult {
    pub signature: String,
    /// Transaction error, `None` when the transaction succeeded
    pub err: Option<String>,
    pub slot: u64,
}

impl LedgerResult {
    pub fn ok(signature: impl Into<String>, slot: u64) -> Self {
        Self {
            signature: signature.into(),
            err: None,
            slot,
        }
    }

    pub fn failed(signature: impl Into<String>, err: impl Into<String>, slot: u64) -> Self {
        Self {
            signature: signature.into(),
            err: Some(err.into()),
            slot,
        }
    }
}

/// An open signature listener
#[derive(Debug)]
pub struct LedgerSubscription {
    pub id: SubscriptionId,
    /// Fires once; closed without a value if the listener dies first
    pub result: oneshot::Receiver<LedgerResult>,
}

/// Source of per-signature confirmation events
#[async_trait::async_trait]
pub trait LedgerSource: Send + Sync {
    /// Open a listener for `signature` at the given commitment
    async fn on_signature(
        &self,
        signature: &str,
        commitment: Commitment,
    ) -> AppResult<LedgerSubscription>;

    /// Release a listener opened by `on_signature`
    async fn remove_signature_listener(&self, id: SubscriptionId) -> AppResult<()>;
}
