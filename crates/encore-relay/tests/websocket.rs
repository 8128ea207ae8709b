//! Relay behaviour over real WebSocket connections on localhost.

use std::time::Duration;

use encore_relay::{Relay, RelayConfig, RelayHandle};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const TIMEOUT: Duration = Duration::from_secs(5);

async fn start() -> (RelayHandle, String) {
    let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();
    let config = RelayConfig::new().bind_addr("127.0.0.1:0".parse().unwrap());
    let (relay, addr) = Relay::bind(config).await.unwrap();
    (relay, format!("ws://{addr}"))
}

async fn connect(url: &str) -> Ws {
    let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    ws
}

fn envelope(session: &str, kind: &str, payload: Value) -> String {
    json!({"v": 1, "sessionId": session, "kind": kind, "ts": 0, "payload": payload}).to_string()
}

async fn send(ws: &mut Ws, text: String) {
    ws.send(Message::Text(text)).await.unwrap();
}

async fn hello(ws: &mut Ws, role: &str, session: &str) -> Value {
    send(ws, envelope(session, "hello", json!({"role": role}))).await;
    let welcome = recv(ws).await;
    assert_eq!(welcome["kind"], "welcome");
    welcome
}

/// Next text frame as JSON.
async fn recv(ws: &mut Ws) -> Value {
    loop {
        let msg = tokio::time::timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .unwrap();
        match msg {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

async fn recv_close(ws: &mut Ws) -> CloseFrame<'static> {
    loop {
        let msg = tokio::time::timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for close")
            .expect("stream ended before close")
            .unwrap();
        if let Message::Close(frame) = msg {
            return frame.expect("close without frame");
        }
    }
}

fn player_payload(track_id: &str) -> Value {
    json!({
        "currentTrack": {"id": track_id, "name": "Song", "artists": ["A"], "album": "B", "durationMs": 1000},
        "isPlaying": true,
        "positionMs": 0,
        "volume": 1.0,
        "shuffleEnabled": false,
        "repeatMode": "off"
    })
}

fn empty_queue() -> Value {
    json!({"current": null, "next": [], "prev": []})
}

#[tokio::test]
async fn first_frame_must_be_hello() {
    let (relay, url) = start().await;
    let mut ws = connect(&url).await;

    send(&mut ws, envelope("", "heartbeat", json!({}))).await;
    let frame = recv_close(&mut ws).await;
    assert_eq!(frame.code, CloseCode::Policy);
    assert_eq!(frame.reason, "first message must be hello");

    relay.shutdown().await;
}

#[tokio::test]
async fn late_joiner_receives_cached_state() {
    let (relay, url) = start().await;

    let mut producer = connect(&format!("{url}/?sessionId=s1")).await;
    hello(&mut producer, "producer", "").await;
    for _ in 0..3 {
        send(&mut producer, envelope("s1", "queue_update", empty_queue())).await;
    }
    send(&mut producer, envelope("s1", "player_state", player_payload("t1"))).await;
    send(
        &mut producer,
        envelope("s1", "lyrics", json!({"trackId": "t1", "synced": null, "unsynced": null})),
    )
    .await;

    // The hub answers frames in order, so the error reply to a bad frame
    // means everything before it has been cached.
    send(&mut producer, "{}".to_string()).await;
    assert_eq!(recv(&mut producer).await["payload"]["code"], "INVALID_MESSAGE");

    let mut consumer = connect(&format!("{url}/?sessionId=s1")).await;
    let welcome = hello(&mut consumer, "consumer", "").await;
    assert_eq!(welcome["payload"]["sessionId"], "s1");

    let player = recv(&mut consumer).await;
    let queue = recv(&mut consumer).await;
    let lyrics = recv(&mut consumer).await;
    assert_eq!(player["kind"], "player_state");
    assert_eq!(queue["kind"], "queue_update");
    assert_eq!(queue["payload"]["version"], 3);
    assert_eq!(lyrics["kind"], "lyrics");

    // Live broadcasts follow the replay.
    send(&mut producer, envelope("s1", "queue_update", empty_queue())).await;
    let live = recv(&mut consumer).await;
    assert_eq!(live["payload"]["version"], 4);

    relay.shutdown().await;
}

#[tokio::test]
async fn auto_join_without_sessions_is_refused() {
    let (relay, url) = start().await;
    let mut ws = connect(&format!("{url}/?autoJoin=true")).await;

    send(&mut ws, envelope("", "hello", json!({"role": "consumer"}))).await;
    let error = recv(&mut ws).await;
    assert_eq!(error["kind"], "error");
    assert_eq!(error["payload"]["code"], "NO_SESSIONS");

    let frame = recv_close(&mut ws).await;
    assert_eq!(frame.code, CloseCode::Normal);
    assert_eq!(frame.reason, "no sessions");

    relay.shutdown().await;
}

#[tokio::test]
async fn control_reaches_producer() {
    let (relay, url) = start().await;

    let mut producer = connect(&url).await;
    let welcome = hello(&mut producer, "producer", "").await;
    let session = welcome["payload"]["sessionId"].as_str().unwrap().to_string();

    let mut consumer = connect(&format!("{url}/?autoJoin=true")).await;
    let joined = hello(&mut consumer, "consumer", "").await;
    assert_eq!(joined["payload"]["sessionId"], session.as_str());

    send(
        &mut consumer,
        envelope(&session, "control", json!({"command": "seek", "positionMs": 0})),
    )
    .await;
    let control = recv(&mut producer).await;
    assert_eq!(control["kind"], "control");
    assert_eq!(control["payload"]["command"], "seek");

    relay.shutdown().await;
}

#[tokio::test]
async fn discover_lists_active_sessions() {
    let (relay, url) = start().await;

    let mut producer = connect(&format!("{url}/?sessionId=abc")).await;
    hello(&mut producer, "producer", "").await;

    let mut discoverer = connect(&url).await;
    send(&mut discoverer, json!({"kind": "discover"}).to_string()).await;
    let reply = recv(&mut discoverer).await;
    assert_eq!(reply["kind"], "sessions");
    assert_eq!(reply["sessionId"], "");
    assert_eq!(reply["payload"]["sessions"], json!(["abc"]));

    drop(producer);
    for _ in 0..100 {
        if relay.active_sessions().await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(relay.active_sessions().await.is_empty());

    relay.shutdown().await;
}

#[tokio::test]
async fn invalid_message_keeps_connection_open() {
    let (relay, url) = start().await;
    let mut producer = connect(&url).await;
    hello(&mut producer, "producer", "").await;

    send(&mut producer, "{\"kind\":\"player_state\"}".to_string()).await;
    let error = recv(&mut producer).await;
    assert_eq!(error["payload"]["code"], "INVALID_MESSAGE");

    send(&mut producer, envelope("", "heartbeat", json!({}))).await;
    assert_eq!(relay.active_sessions().await.len(), 1);

    relay.shutdown().await;
}

#[tokio::test]
async fn shutdown_closes_connections_normally() {
    let (relay, url) = start().await;
    let mut consumer = connect(&format!("{url}/?sessionId=s1")).await;
    hello(&mut consumer, "consumer", "").await;

    relay.shutdown().await;
    let frame = recv_close(&mut consumer).await;
    assert_eq!(frame.code, CloseCode::Normal);
}
