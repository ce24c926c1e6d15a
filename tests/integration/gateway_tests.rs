//! Integration tests for the gateway client against a scripted local
//! websocket server speaking the Discord gateway protocol.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

use discord_relay::discord::directory::ChannelDirectory;
use discord_relay::discord::gateway::{GatewayClient, GatewayConfig};
use discord_relay::discord::protocol::RELAY_INTENTS;
use discord_relay::models::message::{ChannelKind, MessageEvent};
use discord_relay::AppError;

use super::test_helpers::MONITORED;

type Socket = WebSocketStream<tokio::net::TcpStream>;

async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    (listener, format!("ws://{addr}/?v=10&encoding=json"))
}

async fn accept(listener: &TcpListener) -> Socket {
    let (tcp, _) = listener.accept().await.expect("accept");
    tokio_tungstenite::accept_async(tcp).await.expect("handshake")
}

async fn send(socket: &mut Socket, frame: Value) {
    socket
        .send(Message::Text(frame.to_string().into()))
        .await
        .expect("send frame");
}

async fn recv(socket: &mut Socket) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("client frame in time")
            .expect("stream open")
            .expect("frame");
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).expect("json frame");
        }
    }
}

/// Read until the client closes its side.
async fn until_closed(socket: &mut Socket) {
    while let Some(Ok(message)) = socket.next().await {
        if message.is_close() {
            break;
        }
    }
}

fn hello(interval_ms: u64) -> Value {
    json!({"op": 10, "d": {"heartbeat_interval": interval_ms}, "s": null, "t": null})
}

fn dispatch(event: &str, seq: u64, d: Value) -> Value {
    json!({"op": 0, "d": d, "s": seq, "t": event})
}

fn ready() -> Value {
    dispatch(
        "READY",
        1,
        json!({
            "v": 10,
            "user": {"id": "1", "username": "relay", "discriminator": "0", "bot": true},
            "session_id": "abc",
            "guilds": [{"id": "900", "unavailable": true}]
        }),
    )
}

fn guild_create() -> Value {
    dispatch(
        "GUILD_CREATE",
        2,
        json!({
            "id": "900",
            "name": "Relay Test",
            "channels": [{"id": MONITORED, "type": 0, "name": "general"}],
            "threads": []
        }),
    )
}

fn message_create(id: &str) -> Value {
    dispatch(
        "MESSAGE_CREATE",
        3,
        json!({
            "id": id,
            "channel_id": MONITORED,
            "guild_id": "900",
            "author": {"id": "42", "username": "alice", "discriminator": "0"},
            "content": "hello",
            "timestamp": "2024-05-01T12:00:00.000000+00:00",
            "attachments": [],
            "embeds": [],
            "mentions": [],
            "type": 0
        }),
    )
}

fn client(url: String, events: mpsc::Sender<MessageEvent>) -> GatewayClient {
    GatewayClient::new(
        GatewayConfig {
            url,
            token: "test-token".into(),
            intents: RELAY_INTENTS,
        },
        Arc::new(ChannelDirectory::new()),
        events,
    )
}

#[tokio::test]
async fn identifies_and_forwards_resolved_messages() {
    let (listener, url) = listen().await;
    let server = tokio::spawn(async move {
        let mut socket = accept(&listener).await;
        send(&mut socket, hello(45_000)).await;
        let identify = recv(&mut socket).await;
        send(&mut socket, ready()).await;
        send(&mut socket, guild_create()).await;
        send(&mut socket, message_create("1001")).await;
        until_closed(&mut socket).await;
        identify
    });

    let (tx, mut rx) = mpsc::channel(8);
    let ct = CancellationToken::new();
    let handle = client(url, tx).spawn(ct.clone());

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event in time")
        .expect("channel open");
    assert_eq!(event.message.id.as_deref(), Some("1001"));
    assert_eq!(event.channel_name.as_deref(), Some("general"));
    assert_eq!(event.channel_kind, Some(ChannelKind::Text));
    assert_eq!(event.guild_name.as_deref(), Some("Relay Test"));

    ct.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("client stops")
        .expect("task");
    assert!(result.is_ok());

    let identify = server.await.expect("server task");
    assert_eq!(identify["op"], 2);
    assert_eq!(identify["d"]["token"], "test-token");
    assert_eq!(identify["d"]["intents"], 33_281);
}

#[tokio::test]
async fn heartbeats_carry_the_last_sequence() {
    let (listener, url) = listen().await;
    let (beat_tx, beat_rx) = oneshot::channel();
    let server = tokio::spawn(async move {
        let mut socket = accept(&listener).await;
        send(&mut socket, hello(100)).await;
        let _identify = recv(&mut socket).await;
        send(&mut socket, ready()).await;
        let beat = recv(&mut socket).await;
        let _ = beat_tx.send(beat);
        send(&mut socket, json!({"op": 11, "d": null})).await;
        until_closed(&mut socket).await;
    });

    let (tx, _rx) = mpsc::channel(8);
    let ct = CancellationToken::new();
    let handle = client(url, tx).spawn(ct.clone());

    let beat = tokio::time::timeout(Duration::from_secs(5), beat_rx)
        .await
        .expect("heartbeat in time")
        .expect("server alive");
    assert_eq!(beat["op"], 1);
    assert_eq!(beat["d"], 1, "sequence from READY");

    ct.cancel();
    handle.await.expect("task").expect("clean stop");
    server.await.expect("server task");
}

#[tokio::test]
async fn reconnects_after_server_requested_reconnect() {
    let (listener, url) = listen().await;
    let server = tokio::spawn(async move {
        let mut first = accept(&listener).await;
        send(&mut first, hello(45_000)).await;
        let _ = recv(&mut first).await;
        send(&mut first, json!({"op": 7, "d": null})).await;

        let mut second = accept(&listener).await;
        send(&mut second, hello(45_000)).await;
        let identify = recv(&mut second).await;
        send(&mut second, guild_create()).await;
        send(&mut second, message_create("2002")).await;
        until_closed(&mut second).await;
        identify
    });

    let (tx, mut rx) = mpsc::channel(8);
    let ct = CancellationToken::new();
    let handle = client(url, tx).spawn(ct.clone());

    let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("event after reconnect")
        .expect("channel open");
    assert_eq!(event.message.id.as_deref(), Some("2002"));

    ct.cancel();
    handle.await.expect("task").expect("clean stop");
    let identify = server.await.expect("server task");
    assert_eq!(identify["op"], 2);
}

#[tokio::test]
async fn authentication_failure_ends_the_client() {
    let (listener, url) = listen().await;
    tokio::spawn(async move {
        let mut socket = accept(&listener).await;
        send(&mut socket, hello(45_000)).await;
        let _ = recv(&mut socket).await;
        socket
            .close(Some(CloseFrame {
                code: CloseCode::from(4004),
                reason: "Authentication failed.".into(),
            }))
            .await
            .expect("close");
        until_closed(&mut socket).await;
    });

    let (tx, _rx) = mpsc::channel(8);
    let handle = client(url, tx).spawn(CancellationToken::new());

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("client gives up")
        .expect("task");
    let err = result.unwrap_err();
    assert!(matches!(err, AppError::Gateway(_)));
    assert!(err.to_string().contains("4004"), "{err}");
}

/// Serve one connection with `first_script`, then expect the client to
/// come back on a second connection and identify again. Returns the
/// second identify frame.
async fn reidentify_after<F, Fut>(first_script: F) -> Value
where
    F: FnOnce(Socket) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Socket> + Send,
{
    let (listener, url) = listen().await;
    let (identify_tx, identify_rx) = oneshot::channel();
    let server = tokio::spawn(async move {
        let mut first = accept(&listener).await;
        send(&mut first, hello(100)).await;
        let identify = recv(&mut first).await;
        assert_eq!(identify["op"], 2);
        let _first = first_script(first).await;

        let mut second = accept(&listener).await;
        send(&mut second, hello(45_000)).await;
        let identify = recv(&mut second).await;
        let _ = identify_tx.send(identify);
        until_closed(&mut second).await;
    });

    let (tx, _rx) = mpsc::channel(8);
    let ct = CancellationToken::new();
    let handle = client(url, tx).spawn(ct.clone());

    let identify = tokio::time::timeout(Duration::from_secs(10), identify_rx)
        .await
        .expect("second identify in time")
        .expect("server alive");

    ct.cancel();
    handle.await.expect("task").expect("clean stop");
    server.await.expect("server task");
    identify
}

#[tokio::test]
async fn unacknowledged_heartbeat_forces_a_fresh_identify() {
    let identify = reidentify_after(|mut socket| async move {
        let beat = recv(&mut socket).await;
        assert_eq!(beat["op"], 1);
        // Never acknowledge; the next beat finds the connection dead.
        socket
    })
    .await;

    assert_eq!(identify["op"], 2);
    assert_eq!(identify["d"]["token"], "test-token");
}

#[tokio::test]
async fn invalid_session_leads_to_a_new_identify() {
    let identify = reidentify_after(|mut socket| async move {
        send(&mut socket, json!({"op": 9, "d": false})).await;
        socket
    })
    .await;

    assert_eq!(identify["op"], 2);
    assert_eq!(identify["d"]["intents"], 33_281);
}
