//! Nova Confirmer - waits for Solana transaction confirmations
//!
//! Connects the shared confirmation-service transport and the ledger pubsub
//! source, then waits for one batch given on the command line or for many
//! batches read from stdin (one batch per line).

use anyhow::Context;
use clap::Parser;
use futures_util::future::join_all;
use nova_confirmer::config::AppConfig;
use nova_confirmer::ledger::PubsubLedger;
use nova_confirmer::metrics::{self, ConfirmMetrics};
use nova_confirmer::notifications::{
    AudioCue, CompositeSink, LogSink, NotificationSink, TelegramSink, TerminalBell,
};
use nova_confirmer::transport::WsTransport;
use nova_confirmer::waiter::{BatchOutcome, ConfirmationWaiter, WaitHandle};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "nova-confirmer", version, about = "Wait for Solana transaction confirmations")]
struct Cli {
    /// Signatures of one batch
    signatures: Vec<String>,

    /// Read batches from stdin, one whitespace-separated batch per line
    #[arg(long, conflicts_with = "signatures")]
    stdin: bool,

    /// Extra configuration file
    #[arg(long, env = "NOVA_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing(&config.log_format);

    tracing::info!("Starting Nova Confirmer v{}", env!("CARGO_PKG_VERSION"));

    if cli.signatures.is_empty() && !cli.stdin {
        anyhow::bail!("no signatures given (pass them as arguments or use --stdin)");
    }

    let metrics = Arc::new(ConfirmMetrics::new().context("Failed to register metrics")?);
    if config.metrics.enabled {
        spawn_metrics_server(&config, metrics.clone()).await?;
    }

    let transport = Arc::new(WsTransport::spawn(config.transport.clone())?);
    let ledger = Arc::new(PubsubLedger::connect(&config.ledger).await?);
    tracing::info!(commitment = %config.ledger.commitment, "Confirmation sources ready");

    let sink = build_sink(&config)?;
    let audio: Option<Arc<dyn AudioCue>> = if config.notifications.audio_enabled {
        Some(Arc::new(TerminalBell))
    } else {
        None
    };

    let shutdown = CancellationToken::new();
    let waiter = ConfirmationWaiter::new(transport.clone(), ledger)
        .with_commitment(config.ledger.commitment)
        .with_texts(config.waiter.clone())
        .with_metrics(metrics)
        .with_shutdown(shutdown.clone());

    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, cancelling pending batches");
            ctrl_c_shutdown.cancel();
        }
    });

    let handles = if cli.stdin {
        read_stdin_batches(&waiter, &sink, &audio).await?
    } else {
        vec![waiter.wait_for(cli.signatures.clone(), sink.clone(), audio.clone())?]
    };

    let outcomes = join_all(handles.into_iter().map(WaitHandle::outcome)).await;
    transport.shutdown();

    let unconfirmed = outcomes
        .iter()
        .filter(|outcome| !matches!(outcome, BatchOutcome::Confirmed { .. } | BatchOutcome::Cancelled))
        .count();

    tracing::info!(
        batches = outcomes.len(),
        unconfirmed,
        "All batches finished"
    );

    if unconfirmed > 0 {
        anyhow::bail!("{} of {} batches did not confirm", unconfirmed, outcomes.len());
    }

    Ok(())
}

async fn read_stdin_batches(
    waiter: &ConfirmationWaiter,
    sink: &Arc<dyn NotificationSink>,
    audio: &Option<Arc<dyn AudioCue>>,
) -> anyhow::Result<Vec<WaitHandle>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut handles = Vec::new();

    while let Some(line) = lines.next_line().await? {
        let signatures: Vec<&str> = line.split_whitespace().collect();
        if signatures.is_empty() {
            continue;
        }
        match waiter.wait_for(signatures, sink.clone(), audio.clone()) {
            Ok(handle) => {
                tracing::debug!(batch_id = %handle.batch_id(), "Batch read from stdin");
                handles.push(handle);
            }
            Err(e) => tracing::warn!(error = %e, line = %line, "Skipping invalid batch"),
        }
    }

    Ok(handles)
}

fn build_sink(config: &AppConfig) -> anyhow::Result<Arc<dyn NotificationSink>> {
    let mut composite = CompositeSink::new();
    composite.add_sink(Arc::new(LogSink::new()));

    if let Some(telegram) = TelegramSink::from_config(&config.notifications.telegram)? {
        tracing::info!("Telegram notifications enabled");
        composite.add_sink(Arc::new(telegram));
    }

    Ok(Arc::new(composite))
}

async fn spawn_metrics_server(
    config: &AppConfig,
    metrics: Arc<ConfirmMetrics>,
) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.metrics.host, config.metrics.port)
        .parse()
        .context("Invalid metrics address")?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Metrics endpoint listening");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, metrics::metrics_router(metrics)).await {
            tracing::error!(error = %e, "Metrics server stopped");
        }
    });

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "nova_confirmer=info".into());

    if format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Load and validate configuration
fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let config = AppConfig::load(cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;

    Ok(config)
}
