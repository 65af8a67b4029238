//! Confirmation waiter flow tests
//!
//! Drives the waiter end to end over in-memory sources:
//! - channel and ledger confirmations
//! - ledger errors and channel timeouts
//! - re-join on reconnect
//! - cancellation, shutdown and abandoned batches

use crate::mocks::{wait_until, CountingAudio, MockLedger, MockTransport, RecordingSink};
use nova_confirmer::constants::{channel_messages, toasts};
use nova_confirmer::ledger::{Commitment, LedgerResult};
use nova_confirmer::metrics::ConfirmMetrics;
use nova_confirmer::models::ChannelRequest;
use nova_confirmer::notifications::{AudioCue, NotificationSink};
use nova_confirmer::transport::TransportEvent;
use nova_confirmer::waiter::{BatchOutcome, ConfirmationSource, ConfirmationWaiter, WaitHandle};
use nova_confirmer::{AppError, WaiterConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Harness {
    transport: Arc<MockTransport>,
    ledger: Arc<MockLedger>,
    sink: Arc<RecordingSink>,
    audio: Arc<CountingAudio>,
    metrics: Arc<ConfirmMetrics>,
    waiter: ConfirmationWaiter,
}

impl Harness {
    fn new() -> Self {
        Self::with_ledger(MockLedger::new())
    }

    fn with_ledger(ledger: MockLedger) -> Self {
        let transport = Arc::new(MockTransport::new());
        let ledger = Arc::new(ledger);
        let metrics = Arc::new(ConfirmMetrics::new().unwrap());
        let waiter = ConfirmationWaiter::new(transport.clone(), ledger.clone())
            .with_metrics(metrics.clone());

        Self {
            transport,
            ledger,
            sink: Arc::new(RecordingSink::new()),
            audio: Arc::new(CountingAudio::default()),
            metrics,
            waiter,
        }
    }

    fn start(&self, signatures: &[&str]) -> WaitHandle {
        let sink: Arc<dyn NotificationSink> = self.sink.clone();
        let audio: Arc<dyn AudioCue> = self.audio.clone();
        self.waiter
            .wait_for(signatures.iter().copied(), sink, Some(audio))
            .unwrap()
    }

    /// Wait until the batch has sent its join and opened `listeners` ledger listeners
    async fn started(&self, listeners: usize) {
        let ledger = self.ledger.clone();
        let transport = self.transport.clone();
        wait_until(move || ledger.opened().len() >= listeners && !transport.sent().is_empty())
            .await;
    }
}

async fn finish(handle: WaitHandle) -> BatchOutcome {
    tokio::time::timeout(Duration::from_secs(5), handle.outcome())
        .await
        .expect("batch did not finish")
}

fn loading_toast() -> String {
    format!("toast:LOADING:{}", toasts::LOADING)
}

#[tokio::test]
async fn test_channel_confirmation_succeeds() {
    let h = Harness::new();
    let handle = h.start(&["sigA", "sigB"]);
    h.started(2).await;

    assert_eq!(h.transport.sent(), vec![ChannelRequest::join(["sigA", "sigB"])]);

    h.transport
        .message("sigB", channel_messages::TRANSACTION_CONFIRMED);

    let outcome = finish(handle).await;
    assert_eq!(
        outcome,
        BatchOutcome::Confirmed {
            signature: "sigB".to_string(),
            source: ConfirmationSource::Channel,
        }
    );

    assert_eq!(
        h.sink.calls(),
        vec![
            loading_toast(),
            "dismiss:one".to_string(),
            format!("success:{}", toasts::SUCCESS),
        ]
    );
    assert_eq!(h.audio.plays(), 1);

    // Every ledger listener and the transport subscription are released
    assert_eq!(h.ledger.removed().len(), 2);
    assert_eq!(h.transport.receiver_count(), 0);
    assert_eq!(h.metrics.pending_batches.get(), 0);
    assert_eq!(
        h.metrics.batch_outcomes.with_label_values(&["confirmed"]).get(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_ledger_confirmation_after_two_seconds() {
    let h = Harness::new();
    let started = tokio::time::Instant::now();
    let handle = h.start(&["abc123"]);
    h.started(1).await;

    // Loading toast is up while the ledger is still silent
    assert_eq!(h.sink.calls(), vec![loading_toast()]);
    assert_eq!(h.ledger.opened(), vec![("abc123".to_string(), Commitment::Confirmed)]);

    let ledger = h.ledger.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        ledger.resolve(LedgerResult::ok("abc123", 42));
    });

    let outcome = finish(handle).await;
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(
        outcome,
        BatchOutcome::Confirmed {
            signature: "abc123".to_string(),
            source: ConfirmationSource::Ledger,
        }
    );
    assert_eq!(
        h.sink.calls(),
        vec![
            loading_toast(),
            "dismiss:one".to_string(),
            format!("success:{}", toasts::SUCCESS),
        ]
    );
    assert_eq!(h.audio.plays(), 1);
    assert_eq!(h.ledger.removed(), vec![1]);
}

#[tokio::test]
async fn test_ledger_error_fails_batch() {
    let h = Harness::new();
    let handle = h.start(&["sigA", "sigB"]);
    h.started(2).await;

    assert!(h
        .ledger
        .resolve(LedgerResult::failed("sigA", "InstructionError(0, Custom(1))", 7)));

    let outcome = finish(handle).await;
    assert!(matches!(
        outcome,
        BatchOutcome::Failed { ref signature, .. } if signature == "sigA"
    ));
    assert_eq!(
        h.sink.terminal_toasts(),
        vec![format!(
            "error:{}: InstructionError(0, Custom(1))",
            toasts::FAILURE
        )]
    );
    assert!(h.sink.calls().contains(&"dismiss:one".to_string()));
    assert_eq!(h.audio.plays(), 0);
    assert_eq!(h.ledger.removed().len(), 2);
}

#[tokio::test]
async fn test_all_signatures_timing_out_ends_batch() {
    let h = Harness::new();
    let handle = h.start(&["sigA", "sigB"]);
    h.started(2).await;

    h.transport.message("sigA", channel_messages::TRANSACTION_TIMEOUT);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!handle.is_finished());

    h.transport.message("sigB", channel_messages::TRANSACTION_TIMEOUT);

    assert_eq!(finish(handle).await, BatchOutcome::TimedOut);
    assert_eq!(
        h.sink.terminal_toasts(),
        vec![format!("error:{}", toasts::TIMEOUT)]
    );
    assert_eq!(h.audio.plays(), 0);
}

#[tokio::test]
async fn test_repeated_timeout_for_one_signature_counts_once() {
    let h = Harness::new();
    let handle = h.start(&["sigA", "sigB"]);
    h.started(2).await;

    h.transport.message("sigA", channel_messages::TRANSACTION_TIMEOUT);
    h.transport.message("sigA", channel_messages::TRANSACTION_TIMEOUT);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!handle.is_finished());

    assert!(h.ledger.resolve(LedgerResult::ok("sigB", 9)));

    assert_eq!(
        finish(handle).await,
        BatchOutcome::Confirmed {
            signature: "sigB".to_string(),
            source: ConfirmationSource::Ledger,
        }
    );
}

#[tokio::test]
async fn test_single_ledger_result_wins_over_pending_timeouts() {
    let h = Harness::new();
    let handle = h.start(&["sigA", "sigB", "sigC"]);
    h.started(3).await;

    h.transport.message("sigA", channel_messages::TRANSACTION_TIMEOUT);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(h.ledger.resolve(LedgerResult::failed("sigC", "BlockhashNotFound", 3)));

    assert!(matches!(finish(handle).await, BatchOutcome::Failed { .. }));

    // Late timeouts for every signature must not produce a second toast
    for signature in ["sigA", "sigB", "sigC"] {
        h.transport.message(signature, channel_messages::TRANSACTION_TIMEOUT);
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(
        h.sink.terminal_toasts(),
        vec![format!("error:{}: BlockhashNotFound", toasts::FAILURE)]
    );
    assert_eq!(
        h.metrics.batch_outcomes.with_label_values(&["timed_out"]).get(),
        0
    );
}

#[tokio::test]
async fn test_both_sources_reporting_notifies_once() {
    let h = Harness::new();
    let handle = h.start(&["sigA"]);
    h.started(1).await;

    h.transport
        .message("sigA", channel_messages::TRANSACTION_CONFIRMED);
    h.ledger.resolve(LedgerResult::ok("sigA", 11));
    h.transport
        .message("sigA", channel_messages::TRANSACTION_CONFIRMED);

    assert!(finish(handle).await.is_success());
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(h.sink.terminal_toasts(), vec![format!("success:{}", toasts::SUCCESS)]);
    assert_eq!(h.audio.plays(), 1);
}

#[tokio::test]
async fn test_foreign_and_unknown_messages_are_ignored() {
    let h = Harness::new();
    let handle = h.start(&["sigA"]);
    h.started(1).await;

    h.transport
        .message("someone-else", channel_messages::TRANSACTION_CONFIRMED);
    h.transport.message("sigA", "Processing");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!handle.is_finished());
    assert_eq!(h.metrics.unexpected_messages.get(), 1);

    handle.cancel();
    assert_eq!(finish(handle).await, BatchOutcome::Cancelled);
}

#[tokio::test]
async fn test_reconnect_resends_join() {
    let h = Harness::new();
    let handle = h.start(&["sigA", "sigB"]);
    h.started(2).await;

    h.transport.emit(TransportEvent::Closed);
    h.transport.emit(TransportEvent::Opened);

    let transport = h.transport.clone();
    wait_until(move || transport.sent().len() == 2).await;
    assert_eq!(h.transport.sent()[1], ChannelRequest::join(["sigA", "sigB"]));
    assert_eq!(h.metrics.resubscriptions.get(), 1);

    h.transport
        .message("sigA", channel_messages::TRANSACTION_CONFIRMED);
    assert!(finish(handle).await.is_success());

    // A reconnect after the batch ended does not re-join
    h.transport.emit(TransportEvent::Opened);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.transport.sent().len(), 2);
}

#[tokio::test]
async fn test_cancel_dismisses_without_terminal_toast() {
    let h = Harness::new();
    let handle = h.start(&["sigA", "sigB"]);
    h.started(2).await;

    handle.cancel();
    assert_eq!(finish(handle).await, BatchOutcome::Cancelled);

    assert_eq!(h.sink.calls(), vec![loading_toast(), "dismiss:one".to_string()]);
    assert_eq!(h.audio.plays(), 0);
    assert_eq!(h.ledger.removed().len(), 2);
    assert!(!h.ledger.resolve(LedgerResult::ok("sigA", 1)));
}

#[tokio::test]
async fn test_shutdown_cancels_every_batch() {
    let h = Harness::new();
    let shutdown = CancellationToken::new();
    let waiter = h.waiter.clone().with_shutdown(shutdown.clone());

    let sink: Arc<dyn NotificationSink> = h.sink.clone();
    let first = waiter.wait_for(["sigA"], sink.clone(), None).unwrap();
    let second = waiter.wait_for(["sigB"], sink, None).unwrap();
    h.started(2).await;

    shutdown.cancel();
    assert_eq!(finish(first).await, BatchOutcome::Cancelled);
    assert_eq!(finish(second).await, BatchOutcome::Cancelled);
    assert!(h.sink.terminal_toasts().is_empty());
}

#[tokio::test]
async fn test_batch_abandoned_when_sources_close() {
    let h = Harness::new();
    let handle = h.start(&["sigA"]);
    h.started(1).await;

    h.transport.close();
    h.ledger.close_all();

    assert_eq!(finish(handle).await, BatchOutcome::Abandoned);
    assert!(h.sink.terminal_toasts().is_empty());
    assert!(h.sink.calls().contains(&"dismiss:one".to_string()));
    assert_eq!(
        h.metrics.batch_outcomes.with_label_values(&["abandoned"]).get(),
        1
    );
}

#[tokio::test]
async fn test_failed_ledger_listener_falls_back_to_channel() {
    let h = Harness::with_ledger(MockLedger::failing_for(&["sigA"]));
    let handle = h.start(&["sigA", "sigB"]);
    h.started(1).await;

    assert_eq!(h.metrics.ledger_setup_failures.get(), 1);

    h.transport
        .message("sigA", channel_messages::TRANSACTION_CONFIRMED);
    assert_eq!(
        finish(handle).await,
        BatchOutcome::Confirmed {
            signature: "sigA".to_string(),
            source: ConfirmationSource::Channel,
        }
    );
    assert_eq!(h.ledger.removed().len(), 1);
}

#[tokio::test]
async fn test_duplicate_signatures_are_collapsed() {
    let h = Harness::new();
    let handle = h.start(&["sigA", "sigA", "sigB"]);
    h.started(2).await;

    assert_eq!(h.ledger.opened().len(), 2);
    assert_eq!(h.transport.sent(), vec![ChannelRequest::join(["sigA", "sigB"])]);

    handle.cancel();
    finish(handle).await;
}

#[tokio::test]
async fn test_custom_texts_and_commitment() {
    let h = Harness::new();
    let texts = WaiterConfig {
        loading_message: "Sending...".to_string(),
        success_message: "Done!".to_string(),
        failure_message: "Nope".to_string(),
        timeout_message: "Too slow".to_string(),
    };
    let waiter = h
        .waiter
        .clone()
        .with_texts(texts)
        .with_commitment(Commitment::Finalized);

    let sink: Arc<dyn NotificationSink> = h.sink.clone();
    let handle = waiter.wait_for(["sigA"], sink, None).unwrap();
    h.started(1).await;

    assert_eq!(h.ledger.opened()[0].1, Commitment::Finalized);
    h.ledger.resolve(LedgerResult::failed("sigA", "AccountNotFound", 1));
    finish(handle).await;

    assert_eq!(
        h.sink.calls(),
        vec![
            "toast:LOADING:Sending...".to_string(),
            "dismiss:one".to_string(),
            "error:Nope: AccountNotFound".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_empty_batch_rejected() {
    let h = Harness::new();
    let sink: Arc<dyn NotificationSink> = h.sink.clone();
    let result = h.waiter.wait_for(Vec::<String>::new(), sink, None);

    assert!(matches!(result, Err(AppError::Validation(_))));
    assert!(h.sink.calls().is_empty());
    assert_eq!(h.metrics.batches_started.get(), 0);
}
