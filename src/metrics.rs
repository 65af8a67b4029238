//! Prometheus metrics for Nova Confirmer
//!
//! Exposes metrics endpoint for monitoring:
//! - Batch counts and outcomes
//! - Pending batch gauge
//! - Confirmation latency histogram
//! - Transport re-subscriptions and ledger listener failures

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Metrics state
pub struct ConfirmMetrics {
    /// Prometheus registry
    registry: Registry,
    /// Batches handed to the waiter
    pub batches_started: IntCounter,
    /// Terminal outcomes by label (confirmed, failed, timed_out, cancelled, abandoned)
    pub batch_outcomes: IntCounterVec,
    /// Batches still waiting
    pub pending_batches: IntGauge,
    /// Time from batch start to terminal state (milliseconds)
    pub confirmation_latency: Histogram,
    /// `join` frames resent after a transport reconnect
    pub resubscriptions: IntCounter,
    /// Channel messages with an unknown status text
    pub unexpected_messages: IntCounter,
    /// Ledger listeners that could not be opened
    pub ledger_setup_failures: IntCounter,
    /// Ledger listeners that could not be released
    pub ledger_teardown_failures: IntCounter,
}

impl ConfirmMetrics {
    /// Create a new metrics state with all metrics registered
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let batches_started = IntCounter::with_opts(Opts::new(
            "nova_batches_started_total",
            "Total number of confirmation batches started",
        ))?;
        registry.register(Box::new(batches_started.clone()))?;

        let batch_outcomes = IntCounterVec::new(
            Opts::new(
                "nova_batch_outcomes_total",
                "Terminal outcomes of confirmation batches",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(batch_outcomes.clone()))?;

        let pending_batches = IntGauge::with_opts(Opts::new(
            "nova_pending_batches",
            "Confirmation batches still waiting for a result",
        ))?;
        registry.register(Box::new(pending_batches.clone()))?;

        let confirmation_latency = Histogram::with_opts(
            HistogramOpts::new(
                "nova_confirmation_latency_ms",
                "Time from batch start to terminal state in milliseconds",
            )
            .buckets(vec![
                250.0, 500.0, 1000.0, 2000.0, 5000.0, 10_000.0, 30_000.0, 60_000.0, 120_000.0,
            ]),
        )?;
        registry.register(Box::new(confirmation_latency.clone()))?;

        let resubscriptions = IntCounter::with_opts(Opts::new(
            "nova_resubscriptions_total",
            "Join requests resent after a transport reconnect",
        ))?;
        registry.register(Box::new(resubscriptions.clone()))?;

        let unexpected_messages = IntCounter::with_opts(Opts::new(
            "nova_unexpected_channel_messages_total",
            "Channel messages with an unrecognized status",
        ))?;
        registry.register(Box::new(unexpected_messages.clone()))?;

        let ledger_setup_failures = IntCounter::with_opts(Opts::new(
            "nova_ledger_setup_failures_total",
            "Signature listeners that failed to open",
        ))?;
        registry.register(Box::new(ledger_setup_failures.clone()))?;

        let ledger_teardown_failures = IntCounter::with_opts(Opts::new(
            "nova_ledger_teardown_failures_total",
            "Signature listeners that failed to be released",
        ))?;
        registry.register(Box::new(ledger_teardown_failures.clone()))?;

        Ok(Self {
            registry,
            batches_started,
            batch_outcomes,
            pending_batches,
            confirmation_latency,
            resubscriptions,
            unexpected_messages,
            ledger_setup_failures,
            ledger_teardown_failures,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in the text exposition format
    pub fn encode(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}

/// Metrics handler - returns Prometheus metrics in text format
///
/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<ConfirmMetrics>>) -> impl IntoResponse {
    match state.encode() {
        Ok(buffer) => (
            StatusCode::OK,
            [("Content-Type", "text/plain; version=0.0.4")],
            buffer,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Create metrics router
pub fn metrics_router(state: Arc<ConfirmMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}
