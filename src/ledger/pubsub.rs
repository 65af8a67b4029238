//! Solana pubsub ledger source
//!
//! Wraps `signatureSubscribe` on the nonblocking pubsub client. Every
//! subscription lives in its own task which owns the client handle, delivers
//! the first processed notification and then unsubscribes.

use super::{Commitment, LedgerResult, LedgerSource, LedgerSubscription, SubscriptionId};
use crate::config::LedgerConfig;
use crate::error::{AppError, AppResult};
use futures_util::StreamExt;
use parking_lot::Mutex;
use solana_client::nonblocking::pubsub_client::PubsubClient;
use solana_client::rpc_config::RpcSignatureSubscribeConfig;
use solana_client::rpc_response::{ProcessedSignatureResult, Response, RpcSignatureResult};
use solana_sdk::signature::Signature;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Ledger source backed by a Solana pubsub WebSocket
pub struct PubsubLedger {
    client: Arc<PubsubClient>,
    listeners: Mutex<HashMap<SubscriptionId, CancellationToken>>,
    next_id: AtomicU64,
}

impl PubsubLedger {
    /// Connect to the pubsub endpoint
    pub async fn connect(config: &LedgerConfig) -> AppResult<Self> {
        tracing::info!(url = %config.ws_url, "Connecting ledger pubsub client");

        let client = PubsubClient::new(&config.ws_url)
            .await
            .map_err(|e| AppError::Ledger(format!("pubsub connect failed: {}", e)))?;

        Ok(Self {
            client: Arc::new(client),
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }
}

#[async_trait::async_trait]
impl LedgerSource for PubsubLedger {
    async fn on_signature(
        &self,
        signature: &str,
        commitment: Commitment,
    ) -> AppResult<LedgerSubscription> {
        let parsed = Signature::from_str(signature)
            .map_err(|e| AppError::Ledger(format!("invalid signature '{}': {}", signature, e)))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        self.listeners.lock().insert(id, cancel.clone());

        let (result_tx, result_rx) = oneshot::channel();
        let (ready_tx, ready_rx) = oneshot::channel::<AppResult<()>>();
        let client = self.client.clone();
        let signature = signature.to_string();

        tokio::spawn(async move {
            // The stream borrows `client`, which this task owns
            let (mut notifications, unsubscribe) = match client
                .signature_subscribe(
                    &parsed,
                    Some(RpcSignatureSubscribeConfig {
                        commitment: Some(commitment.into()),
                        enable_received_notification: Some(false),
                    }),
                )
                .await
            {
                Ok(subscription) => {
                    let _ = ready_tx.send(Ok(()));
                    subscription
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(AppError::Ledger(format!(
                        "signatureSubscribe failed: {}",
                        e
                    ))));
                    return;
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(subscription_id = id, "Signature listener released before firing");
                }
                _ = async {
                    while let Some(response) = notifications.next().await {
                        if let Some(result) = into_ledger_result(&signature, response) {
                            let _ = result_tx.send(result);
                            break;
                        }
                    }
                } => {}
            }

            unsubscribe().await;
        });

        match ready_rx.await {
            Ok(Ok(())) => {
                tracing::debug!(subscription_id = id, %commitment, "Signature listener opened");
                Ok(LedgerSubscription {
                    id,
                    result: result_rx,
                })
            }
            Ok(Err(e)) => {
                self.listeners.lock().remove(&id);
                Err(e)
            }
            Err(_) => {
                self.listeners.lock().remove(&id);
                Err(AppError::Ledger(
                    "subscription task ended before it was ready".to_string(),
                ))
            }
        }
    }

    async fn remove_signature_listener(&self, id: SubscriptionId) -> AppResult<()> {
        match self.listeners.lock().remove(&id) {
            Some(cancel) => {
                cancel.cancel();
                Ok(())
            }
            None => Err(AppError::Ledger(format!("unknown subscription {}", id))),
        }
    }
}

/// Map a pubsub notification; "received" notifications carry no outcome
fn into_ledger_result(
    signature: &str,
    response: Response<RpcSignatureResult>,
) -> Option<LedgerResult> {
    match response.value {
        RpcSignatureResult::ProcessedSignature(ProcessedSignatureResult { err }) => {
            Some(LedgerResult {
                signature: signature.to_string(),
                err: err.map(|e| format!("{:?}", e)),
                slot: response.context.slot,
            })
        }
        RpcSignatureResult::ReceivedSignature(_) => None,
    }
}
