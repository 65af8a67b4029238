//! Transaction confirmation waiter
//!
//! Races two independent confirmation sources for a batch of signatures:
//! push messages from the shared channel transport, and per-signature ledger
//! subscriptions. The first authoritative result wins and the notification
//! sink sees exactly one terminal toast per batch.
//!
//! Each batch runs on its own task that exclusively owns its [`WaitState`],
//! so no lock guards the "first result wins" decision.

pub mod state;

pub use state::{BatchOutcome, ConfirmationSource, Transition, WaitState};

use crate::config::WaiterConfig;
use crate::error::AppResult;
use crate::ledger::{Commitment, LedgerResult, LedgerSource, SubscriptionId};
use crate::metrics::ConfirmMetrics;
use crate::models::{ChannelRequest, ConfirmationBatch};
use crate::notifications::{AudioCue, NotificationSink, ToastId, ToastOptions};
use crate::transport::{ChannelTransport, TransportEvent};
use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Spawns one confirmation task per batch over shared sources
#[derive(Clone)]
pub struct ConfirmationWaiter {
    transport: Arc<dyn ChannelTransport>,
    ledger: Arc<dyn LedgerSource>,
    commitment: Commitment,
    texts: Arc<WaiterConfig>,
    metrics: Option<Arc<ConfirmMetrics>>,
    /// Parent of every batch cancellation token
    shutdown: Option<CancellationToken>,
}

impl ConfirmationWaiter {
    pub fn new(transport: Arc<dyn ChannelTransport>, ledger: Arc<dyn LedgerSource>) -> Self {
        Self {
            transport,
            ledger,
            commitment: Commitment::Confirmed,
            texts: Arc::new(WaiterConfig::default()),
            metrics: None,
            shutdown: None,
        }
    }

    pub fn with_commitment(mut self, commitment: Commitment) -> Self {
        self.commitment = commitment;
        self
    }

    pub fn with_texts(mut self, texts: WaiterConfig) -> Self {
        self.texts = Arc::new(texts);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<ConfirmMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Cancelling `shutdown` cancels every batch started afterwards
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Start waiting for `signatures` and return immediately.
    ///
    /// Duplicates are collapsed. Fails only when the input is empty or holds
    /// a blank signature; every later problem is logged and reported through
    /// `sink`. Must be called inside a tokio runtime.
    pub fn wait_for<I, S>(
        &self,
        signatures: I,
        sink: Arc<dyn NotificationSink>,
        audio: Option<Arc<dyn AudioCue>>,
    ) -> AppResult<WaitHandle>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let batch = ConfirmationBatch::new(signatures)?;
        let batch_id = Uuid::new_v4();
        let cancel = self
            .shutdown
            .as_ref()
            .map(CancellationToken::child_token)
            .unwrap_or_default();

        // Subscribe before returning so no message sent from now on is missed
        let events = self.transport.events();

        if let Some(metrics) = &self.metrics {
            metrics.batches_started.inc();
            metrics.pending_batches.inc();
        }

        tracing::info!(
            batch_id = %batch_id,
            signatures = batch.len(),
            "Waiting for transaction confirmation"
        );

        let run = BatchRun {
            batch_id,
            state: WaitState::new(batch),
            events: Some(events),
            waiter: self.clone(),
            sink,
            audio,
            cancel: cancel.clone(),
            listeners: HashMap::new(),
        };
        let task = tokio::spawn(run.run());

        Ok(WaitHandle {
            batch_id,
            cancel,
            task,
        })
    }
}

/// Handle to a running batch
///
/// Dropping the handle does not stop the batch.
pub struct WaitHandle {
    batch_id: Uuid,
    cancel: CancellationToken,
    task: JoinHandle<BatchOutcome>,
}

impl WaitHandle {
    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    /// Stop waiting; the loading toast is dismissed without a terminal toast
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the batch to end
    pub async fn outcome(self) -> BatchOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(batch_id = %self.batch_id, error = %e, "Confirmation task failed");
                BatchOutcome::Abandoned
            }
        }
    }
}

type LedgerEvent = (SubscriptionId, Result<LedgerResult, oneshot::error::RecvError>);

struct BatchRun {
    batch_id: Uuid,
    state: WaitState,
    /// `None` once the transport stream closed
    events: Option<broadcast::Receiver<TransportEvent>>,
    waiter: ConfirmationWaiter,
    sink: Arc<dyn NotificationSink>,
    audio: Option<Arc<dyn AudioCue>>,
    cancel: CancellationToken,
    /// Open ledger listeners and the signature each one watches
    listeners: HashMap<SubscriptionId, String>,
}

impl BatchRun {
    async fn run(mut self) -> BatchOutcome {
        let started = Instant::now();
        let loading_id = ToastId::new();

        let loading = ToastOptions::loading(loading_id, self.waiter.texts.loading_message.as_str());
        if let Err(e) = self.sink.show_toast(loading).await {
            tracing::error!(batch_id = %self.batch_id, error = %e, "Failed to show loading toast");
        }

        if let Some(join) = self.state.resubscribe_request() {
            self.send_join(join).await;
        }

        let mut pending = FuturesUnordered::new();
        let signatures: Vec<String> = self.state.batch().iter().map(str::to_string).collect();
        for signature in signatures {
            match self
                .waiter
                .ledger
                .on_signature(&signature, self.waiter.commitment)
                .await
            {
                Ok(subscription) => {
                    let id = subscription.id;
                    let result = subscription.result;
                    self.listeners.insert(id, signature);
                    pending.push(async move { (id, result.await) });
                }
                Err(e) => {
                    tracing::error!(
                        batch_id = %self.batch_id,
                        signature = %signature,
                        error = %e,
                        "Failed to open ledger listener, relying on remaining sources"
                    );
                    if let Some(metrics) = &self.waiter.metrics {
                        metrics.ledger_setup_failures.inc();
                    }
                }
            }
        }

        let outcome = loop {
            if self.events.is_none() && pending.is_empty() {
                if let Transition::Terminal(outcome) = self.state.abandon() {
                    tracing::warn!(batch_id = %self.batch_id, "All confirmation sources closed");
                    break outcome;
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    if let Transition::Terminal(outcome) = self.state.cancel() {
                        break outcome;
                    }
                }

                event = recv_event(&mut self.events), if self.events.is_some() => {
                    if let Some(outcome) = self.on_transport_event(event).await {
                        break outcome;
                    }
                }

                Some(event) = pending.next(), if !pending.is_empty() => {
                    if let Some(outcome) = self.on_ledger_event(event).await {
                        break outcome;
                    }
                }
            }
        };

        // Unregister from the transport before announcing the result
        self.events = None;
        self.announce(&outcome, loading_id).await;
        self.release_remaining().await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        if let Some(metrics) = &self.waiter.metrics {
            metrics.pending_batches.dec();
            metrics
                .batch_outcomes
                .with_label_values(&[outcome.label()])
                .inc();
            metrics.confirmation_latency.observe(elapsed_ms as f64);
        }

        tracing::info!(
            batch_id = %self.batch_id,
            outcome = outcome.label(),
            elapsed_ms,
            "Confirmation batch finished"
        );

        outcome
    }

    async fn on_transport_event(
        &mut self,
        event: Result<TransportEvent, RecvError>,
    ) -> Option<BatchOutcome> {
        match event {
            Ok(TransportEvent::Opened) => {
                if let Some(join) = self.state.resubscribe_request() {
                    tracing::info!(batch_id = %self.batch_id, "Transport reconnected, re-joining channels");
                    if let Some(metrics) = &self.waiter.metrics {
                        metrics.resubscriptions.inc();
                    }
                    self.send_join(join).await;
                }
                None
            }
            Ok(TransportEvent::Message(message)) => match self.state.on_channel_message(&message) {
                Transition::Terminal(outcome) => Some(outcome),
                Transition::Recorded => {
                    tracing::debug!(
                        batch_id = %self.batch_id,
                        signature = %message.channel,
                        timed_out = self.state.timed_out_count(),
                        of = self.state.batch().len(),
                        "Signature timed out on channel"
                    );
                    None
                }
                Transition::Unexpected(text) => {
                    tracing::warn!(
                        batch_id = %self.batch_id,
                        signature = %message.channel,
                        message = %text,
                        "Unexpected channel message"
                    );
                    if let Some(metrics) = &self.waiter.metrics {
                        metrics.unexpected_messages.inc();
                    }
                    None
                }
                Transition::Ignored => None,
            },
            Ok(TransportEvent::Closed) => {
                tracing::debug!(batch_id = %self.batch_id, "Transport connection dropped");
                None
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(batch_id = %self.batch_id, skipped, "Transport events lagged");
                None
            }
            Err(RecvError::Closed) => {
                tracing::warn!(batch_id = %self.batch_id, "Transport event stream closed");
                self.events = None;
                None
            }
        }
    }

    async fn on_ledger_event(&mut self, (id, result): LedgerEvent) -> Option<BatchOutcome> {
        // A listener fires at most once; release it right away
        if self.listeners.remove(&id).is_some() {
            self.release(id).await;
        }

        match result {
            Ok(result) => {
                tracing::debug!(
                    batch_id = %self.batch_id,
                    signature = %result.signature,
                    slot = result.slot,
                    failed = result.err.is_some(),
                    "Ledger reported signature"
                );
                match self.state.on_ledger_result(&result) {
                    Transition::Terminal(outcome) => Some(outcome),
                    _ => None,
                }
            }
            Err(_) => {
                tracing::warn!(
                    batch_id = %self.batch_id,
                    subscription_id = id,
                    "Ledger listener closed without a result"
                );
                None
            }
        }
    }

    async fn send_join(&self, join: ChannelRequest) {
        // Not fatal: the next `Opened` event re-joins
        if let Err(e) = self.waiter.transport.send(join).await {
            tracing::warn!(batch_id = %self.batch_id, error = %e, "Join request not sent");
        }
    }

    /// Terminal side effects, run exactly once per batch
    async fn announce(&self, outcome: &BatchOutcome, loading_id: ToastId) {
        if let Err(e) = self.sink.dismiss(Some(loading_id)).await {
            tracing::error!(batch_id = %self.batch_id, error = %e, "Failed to dismiss loading toast");
        }

        let texts = &self.waiter.texts;
        let result = match outcome {
            BatchOutcome::Confirmed { signature, source } => {
                tracing::info!(batch_id = %self.batch_id, signature = %signature, source = %source, "Transaction confirmed");
                let result = self.sink.success(&texts.success_message).await;
                if let Some(audio) = &self.audio {
                    audio.play();
                }
                result
            }
            BatchOutcome::Failed { signature, error } => {
                tracing::warn!(batch_id = %self.batch_id, signature = %signature, error = %error, "Transaction failed");
                self.sink
                    .error(&format!("{}: {}", texts.failure_message, error))
                    .await
            }
            BatchOutcome::TimedOut => {
                tracing::warn!(batch_id = %self.batch_id, "All signatures timed out");
                self.sink.error(&texts.timeout_message).await
            }
            BatchOutcome::Cancelled | BatchOutcome::Abandoned => Ok(()),
        };

        if let Err(e) = result {
            tracing::error!(batch_id = %self.batch_id, error = %e, "Failed to show terminal toast");
        }
    }

    async fn release(&self, id: SubscriptionId) {
        if let Err(e) = self.waiter.ledger.remove_signature_listener(id).await {
            tracing::error!(
                batch_id = %self.batch_id,
                subscription_id = id,
                error = %e,
                "Failed to remove ledger listener"
            );
            if let Some(metrics) = &self.waiter.metrics {
                metrics.ledger_teardown_failures.inc();
            }
        }
    }

    async fn release_remaining(&mut self) {
        let ids: Vec<SubscriptionId> = self.listeners.drain().map(|(id, _)| id).collect();
        for id in ids {
            self.release(id).await;
        }
    }
}

async fn recv_event(
    events: &mut Option<broadcast::Receiver<TransportEvent>>,
) -> Result<TransportEvent, RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
