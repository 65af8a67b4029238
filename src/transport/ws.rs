//! Reconnecting WebSocket channel transport
//!
//! A background task owns the socket. Outbound requests are only accepted
//! while connected; during an outage `send` fails fast and the request is
//! dropped. Inbound `{channel, message}` frames are broadcast to every
//! subscriber. Each successful (re)connect emits [`TransportEvent::Opened`]
//! so listeners can re-join their channels. When the task stops for good the
//! event stream closes.

use super::{ChannelTransport, TransportEvent};
use crate::config::TransportConfig;
use crate::error::{AppError, AppResult};
use crate::models::{ChannelMessage, ChannelRequest};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rand::Rng;
use secrecy::ExposeSecret;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Event sender shared with the connection task; emptied when the task exits
type EventSlot = Arc<Mutex<Option<broadcast::Sender<TransportEvent>>>>;

/// Handle to the shared WebSocket transport
pub struct WsTransport {
    outbound: mpsc::Sender<ChannelRequest>,
    events: EventSlot,
    connected: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl WsTransport {
    /// Validate the config and start the connection task
    pub fn spawn(config: TransportConfig) -> AppResult<Self> {
        if !(config.url.starts_with("ws://") || config.url.starts_with("wss://")) {
            return Err(AppError::Validation(format!(
                "transport url must use ws:// or wss:// (got '{}')",
                config.url
            )));
        }

        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));
        let (events_tx, _) = broadcast::channel(config.event_capacity.max(1));
        let events: EventSlot = Arc::new(Mutex::new(Some(events_tx.clone())));
        let connected = Arc::new(AtomicBool::new(false));
        let shutdown = CancellationToken::new();

        let slot = events.clone();
        let task_connected = connected.clone();
        let task_shutdown = shutdown.clone();
        tokio::spawn(async move {
            run_connection(config, outbound_rx, &events_tx, &task_connected, &task_shutdown)
                .await;
            // Last senders go away: subscribers see the stream close
            slot.lock().take();
        });

        Ok(Self {
            outbound: outbound_tx,
            events,
            connected,
            shutdown,
        })
    }

    /// Whether a connection is currently established
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Close the socket and stop reconnecting
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[async_trait::async_trait]
impl ChannelTransport for WsTransport {
    async fn send(&self, request: ChannelRequest) -> AppResult<()> {
        if !self.is_connected() {
            return Err(AppError::Transport("transport is not connected".to_string()));
        }
        self.outbound.try_send(request).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                AppError::Transport("outbound queue is full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                AppError::Transport("transport is shut down".to_string())
            }
        })
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        match self.events.lock().as_ref() {
            Some(tx) => tx.subscribe(),
            // Stopped transport: hand out an already closed stream
            None => broadcast::channel(1).1,
        }
    }
}

/// Exponential reconnect delay with random jitter
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    min: Duration,
    max: Duration,
    jitter_ms: u64,
    current: Duration,
}

impl ReconnectBackoff {
    pub fn new(min: Duration, max: Duration, jitter_ms: u64) -> Self {
        Self {
            min,
            max,
            jitter_ms,
            current: min,
        }
    }

    pub fn from_config(config: &TransportConfig) -> Self {
        Self::new(
            Duration::from_millis(config.reconnect_min_delay_ms),
            Duration::from_millis(config.reconnect_max_delay_ms),
            config.reconnect_jitter_ms,
        )
    }

    /// Delay before the next attempt; doubles up to the cap
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current;
        self.current = (self.current * 2).min(self.max);

        let jitter = if self.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        } else {
            0
        };
        base + Duration::from_millis(jitter)
    }

    pub fn reset(&mut self) {
        self.current = self.min;
    }
}

/// Discard requests that were accepted but never written; listeners re-join on `Opened`
fn drain_stale(outbound: &mut mpsc::Receiver<ChannelRequest>) -> usize {
    let mut dropped = 0;
    while outbound.try_recv().is_ok() {
        dropped += 1;
    }
    dropped
}

/// Why a connected session ended
enum SessionEnd {
    Shutdown,
    /// Every `WsTransport` handle is gone
    OutboundClosed,
    Disconnected(String),
}

async fn run_connection(
    config: TransportConfig,
    mut outbound: mpsc::Receiver<ChannelRequest>,
    events: &broadcast::Sender<TransportEvent>,
    connected: &AtomicBool,
    shutdown: &CancellationToken,
) {
    let instance = config.instance.clone();
    let mut backoff = ReconnectBackoff::from_config(&config);
    let mut failed_attempts: u32 = 0;

    tracing::info!(instance = %instance, url = %config.url, "Starting channel transport");

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        match connect(&config).await {
            Ok(stream) => {
                failed_attempts = 0;
                backoff.reset();
                connected.store(true, Ordering::Release);
                tracing::info!(instance = %instance, "Channel transport connected");
                let _ = events.send(TransportEvent::Opened);

                let end = run_session(stream, &mut outbound, events, shutdown).await;

                connected.store(false, Ordering::Release);
                let stale = drain_stale(&mut outbound);
                if stale > 0 {
                    tracing::debug!(instance = %instance, stale, "Dropped requests queued before disconnect");
                }
                let _ = events.send(TransportEvent::Closed);

                match end {
                    SessionEnd::Shutdown => break,
                    SessionEnd::OutboundClosed => {
                        tracing::debug!(instance = %instance, "All transport handles dropped");
                        break;
                    }
                    SessionEnd::Disconnected(reason) => {
                        tracing::warn!(instance = %instance, reason = %reason, "Channel transport disconnected");
                    }
                }
            }
            Err(e) => {
                failed_attempts += 1;
                tracing::warn!(
                    instance = %instance,
                    attempt = failed_attempts,
                    error = %e,
                    "Channel transport connect failed"
                );

                if let Some(max) = config.max_reconnect_attempts {
                    if failed_attempts >= max {
                        tracing::error!(
                            instance = %instance,
                            attempts = failed_attempts,
                            "Maximum reconnection attempts reached, giving up"
                        );
                        break;
                    }
                }
            }
        }

        let delay = backoff.next_delay();
        tracing::debug!(instance = %instance, delay_ms = delay.as_millis() as u64, "Reconnecting after delay");

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    connected.store(false, Ordering::Release);
    tracing::info!(instance = %instance, "Channel transport stopped");
}

async fn connect(config: &TransportConfig) -> AppResult<WsStream> {
    let mut request = config.url.as_str().into_client_request()?;

    if let Some(token) = &config.auth_token {
        let value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
            .map_err(|e| AppError::Transport(format!("invalid auth token: {}", e)))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }

    let timeout = Duration::from_millis(config.connect_timeout_ms);
    let (stream, _response) = tokio::time::timeout(timeout, connect_async(request))
        .await
        .map_err(|_| {
            AppError::Transport(format!(
                "connect timed out after {}ms",
                config.connect_timeout_ms
            ))
        })??;

    Ok(stream)
}

async fn run_session(
    stream: WsStream,
    outbound: &mut mpsc::Receiver<ChannelRequest>,
    events: &broadcast::Sender<TransportEvent>,
    shutdown: &CancellationToken,
) -> SessionEnd {
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return SessionEnd::Shutdown;
            }

            request = outbound.recv() => {
                let Some(request) = request else {
                    let _ = write.send(Message::Close(None)).await;
                    return SessionEnd::OutboundClosed;
                };

                let text = match serde_json::to_string(&request) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to serialize channel request");
                        continue;
                    }
                };

                tracing::debug!(channels = request.channels.len(), "Sending channel request");
                if let Err(e) = write.send(Message::Text(text)).await {
                    return SessionEnd::Disconnected(format!("send failed: {}", e));
                }
            }

            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => dispatch(&text, events),
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(e) = write.send(Message::Pong(payload)).await {
                            return SessionEnd::Disconnected(format!("pong failed: {}", e));
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return SessionEnd::Disconnected(format!("close frame: {:?}", frame));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return SessionEnd::Disconnected(e.to_string()),
                    None => return SessionEnd::Disconnected("stream ended".to_string()),
                }
            }
        }
    }
}

/// Broadcast an inbound text frame if it is a channel message
fn dispatch(text: &str, events: &broadcast::Sender<TransportEvent>) {
    match serde_json::from_str::<ChannelMessage>(text) {
        Ok(message) => {
            tracing::trace!(channel = %message.channel, "Channel message received");
            // No receivers is fine: nobody is waiting right now
            let _ = events.send(TransportEvent::Message(message));
        }
        Err(_) => {
            tracing::debug!(frame = %text, "Ignoring non-channel frame");
        }
    }
}
