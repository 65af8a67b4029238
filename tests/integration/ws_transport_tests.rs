//! WebSocket transport tests against a loopback server

use futures_util::{SinkExt, StreamExt};
use nova_confirmer::config::TransportConfig;
use nova_confirmer::models::{ChannelMessage, ChannelRequest};
use nova_confirmer::transport::{ChannelTransport, TransportEvent, WsTransport};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, accept_hdr_async};

fn test_config(addr: std::net::SocketAddr) -> TransportConfig {
    let mut config = TransportConfig::new(format!("ws://{}", addr));
    config.reconnect_min_delay_ms = 10;
    config.reconnect_max_delay_ms = 50;
    config.reconnect_jitter_ms = 0;
    config.connect_timeout_ms = 2000;
    config
}

async fn next_event(events: &mut broadcast::Receiver<TransportEvent>) -> TransportEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("no transport event in time")
        .expect("transport event stream closed")
}

#[tokio::test]
async fn test_join_and_receive_channel_message() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let transport = WsTransport::spawn(test_config(listener.local_addr().unwrap())).unwrap();
    let mut events = transport.events();

    let (stream, _) = listener.accept().await.unwrap();
    let mut server = accept_async(stream).await.unwrap();
    assert_eq!(next_event(&mut events).await, TransportEvent::Opened);
    assert!(transport.is_connected());

    transport
        .send(ChannelRequest::join(["sigA", "sigB"]))
        .await
        .unwrap();

    let frame = server.next().await.unwrap().unwrap();
    let request: ChannelRequest = serde_json::from_str(frame.to_text().unwrap()).unwrap();
    assert_eq!(request, ChannelRequest::join(["sigA", "sigB"]));
    assert_eq!(
        frame.to_text().unwrap(),
        r#"{"action":"join","channels":["sigA","sigB"]}"#
    );

    // Non-channel frames are dropped, channel frames are broadcast
    server
        .send(Message::Text(r#"{"type":"welcome"}"#.to_string()))
        .await
        .unwrap();
    server
        .send(Message::Text(
            r#"{"channel":"sigA","message":"Transaction confirmed"}"#.to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Message(ChannelMessage::new("sigA", "Transaction confirmed"))
    );

    transport.shutdown();
}

#[tokio::test]
async fn test_reconnect_emits_opened_again() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let transport = WsTransport::spawn(test_config(listener.local_addr().unwrap())).unwrap();
    let mut events = transport.events();

    let (stream, _) = listener.accept().await.unwrap();
    let server = accept_async(stream).await.unwrap();
    assert_eq!(next_event(&mut events).await, TransportEvent::Opened);

    // Server drops the connection without a close handshake
    drop(server);
    assert_eq!(next_event(&mut events).await, TransportEvent::Closed);

    let (stream, _) = listener.accept().await.unwrap();
    let mut server = accept_async(stream).await.unwrap();
    assert_eq!(next_event(&mut events).await, TransportEvent::Opened);

    // Requests keep flowing on the new connection
    transport.send(ChannelRequest::join(["sigC"])).await.unwrap();
    let frame = server.next().await.unwrap().unwrap();
    let request: ChannelRequest = serde_json::from_str(frame.to_text().unwrap()).unwrap();
    assert_eq!(request.channels, vec!["sigC".to_string()]);

    transport.shutdown();
}

#[tokio::test]
async fn test_bearer_token_sent_on_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = test_config(listener.local_addr().unwrap());
    config.auth_token = Some(SecretString::new("s3cret".to_string()));
    let transport = WsTransport::spawn(config).unwrap();
    let mut events = transport.events();

    let seen = Arc::new(parking_lot::Mutex::new(None));
    let captured = seen.clone();
    let (stream, _) = listener.accept().await.unwrap();
    let _server = accept_hdr_async(stream, move |request: &Request, response: Response| {
        *captured.lock() = request
            .headers()
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        Ok::<_, ErrorResponse>(response)
    })
    .await
    .unwrap();

    assert_eq!(next_event(&mut events).await, TransportEvent::Opened);
    assert_eq!(seen.lock().as_deref(), Some("Bearer s3cret"));

    transport.shutdown();
}

/// Port nobody listens on
async fn dead_addr() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

#[tokio::test]
async fn test_event_stream_closes_after_max_attempts() {
    let mut config = test_config(dead_addr().await);
    config.max_reconnect_attempts = Some(2);
    let transport = WsTransport::spawn(config).unwrap();
    let mut events = transport.events();

    let closed = tokio::time::timeout(Duration::from_secs(5), events.recv()).await;
    assert!(matches!(closed, Ok(Err(broadcast::error::RecvError::Closed))));
    assert!(!transport.is_connected());

    // Late subscribers get a closed stream too
    let mut late = transport.events();
    assert!(matches!(late.recv().await, Err(broadcast::error::RecvError::Closed)));
}

#[tokio::test]
async fn test_send_fails_fast_while_disconnected() {
    let mut config = test_config(dead_addr().await);
    config.outbound_capacity = 1;
    config.reconnect_min_delay_ms = 1000;
    config.reconnect_max_delay_ms = 1000;
    let transport = WsTransport::spawn(config).unwrap();

    for _ in 0..3 {
        let sent = tokio::time::timeout(
            Duration::from_millis(500),
            transport.send(ChannelRequest::join(["sigA"])),
        )
        .await
        .expect("send blocked during outage");
        assert!(sent.is_err());
    }

    transport.shutdown();
}

#[tokio::test]
async fn test_shutdown_closes_event_stream() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let transport = WsTransport::spawn(test_config(listener.local_addr().unwrap())).unwrap();
    let mut events = transport.events();

    let (stream, _) = listener.accept().await.unwrap();
    let _server = accept_async(stream).await.unwrap();
    assert_eq!(next_event(&mut events).await, TransportEvent::Opened);

    transport.shutdown();
    assert_eq!(next_event(&mut events).await, TransportEvent::Closed);
    let closed = tokio::time::timeout(Duration::from_secs(5), events.recv()).await;
    assert!(matches!(closed, Ok(Err(broadcast::error::RecvError::Closed))));
}
