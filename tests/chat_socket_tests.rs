//! End-to-end tests for the `/socket` chat channel over a real listener.

mod common;

use common::TestApp;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Serve the app on an ephemeral port and return its address
async fn serve(app: &TestApp) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr.to_string()
}

async fn connect(addr: &str) -> Client {
    let (client, _) = connect_async(format!("ws://{}/socket", addr))
        .await
        .expect("Failed to connect to chat socket");
    client
}

/// Wait until the server has registered `expected` connections
async fn wait_for_connections(app: &TestApp, expected: usize) {
    for _ in 0..100 {
        if app.state.chat.connection_count().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("server never saw {} connections", expected);
}

async fn send_event(client: &mut Client, data: Value) {
    let envelope = json!({ "event": "my event", "data": data });
    client
        .send(Message::Text(envelope.to_string()))
        .await
        .unwrap();
}

/// Next text frame as JSON, skipping control frames
async fn next_envelope(client: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a chat message")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_message_is_broadcast_and_persisted() {
    let app = TestApp::new().await;
    let addr = serve(&app).await;

    let mut ana = connect(&addr).await;
    let mut bob = connect(&addr).await;
    wait_for_connections(&app, 2).await;

    send_event(&mut ana, json!({ "user_name": "ana", "message": "lunch?" })).await;

    for client in [&mut ana, &mut bob] {
        let envelope = next_envelope(client).await;
        assert_eq!(envelope["event"], "my response");
        assert_eq!(envelope["data"]["user_name"], "ana");
        assert_eq!(envelope["data"]["message"], "lunch?");
        let time = envelope["data"]["time"].as_str().unwrap();
        assert!(chrono::NaiveDateTime::parse_from_str(time, "%H:%M %d/%m/%Y").is_ok());
    }

    let raw = std::fs::read_to_string(app.data_dir().join("chat.json")).unwrap();
    let log: Value = serde_json::from_str(&raw).unwrap();
    let entries = log.as_object().unwrap();
    assert_eq!(entries.len(), 1);
    let (key, stored) = entries.iter().next().unwrap();
    assert!(key.parse::<f64>().is_ok(), "key should be a timestamp: {}", key);
    assert_eq!(stored["message"], "lunch?");
}

#[tokio::test]
async fn test_empty_message_is_broadcast_only() {
    let app = TestApp::new().await;
    let addr = serve(&app).await;

    let mut ana = connect(&addr).await;
    wait_for_connections(&app, 1).await;

    send_event(&mut ana, json!({ "user_name": "ana", "message": "" })).await;

    let envelope = next_envelope(&mut ana).await;
    assert_eq!(envelope["event"], "my response");
    assert_eq!(envelope["data"]["message"], "");
    assert!(envelope["data"]["time"].is_string());

    assert!(!app.data_dir().join("chat.json").exists());
}

#[tokio::test]
async fn test_disconnect_unregisters_client() {
    let app = TestApp::new().await;
    let addr = serve(&app).await;

    let mut ana = connect(&addr).await;
    wait_for_connections(&app, 1).await;

    ana.close(None).await.unwrap();
    wait_for_connections(&app, 0).await;
}

#[tokio::test]
async fn test_irregular_payloads_are_still_broadcast() {
    let app = TestApp::new().await;
    let addr = serve(&app).await;

    let mut ana = connect(&addr).await;
    wait_for_connections(&app, 1).await;

    send_event(&mut ana, json!({ "user_name": "ana", "message": 5 })).await;
    let envelope = next_envelope(&mut ana).await;
    assert_eq!(envelope["event"], "my response");
    assert_eq!(envelope["data"]["message"], 5);
    assert!(envelope["data"]["time"].is_string());

    send_event(&mut ana, json!("hello")).await;
    assert_eq!(next_envelope(&mut ana).await["data"], "hello");

    ana.send(Message::Text(json!({ "event": "my event" }).to_string()))
        .await
        .unwrap();
    let envelope = next_envelope(&mut ana).await;
    assert_eq!(envelope["event"], "my response");
    assert!(envelope["data"].is_null());

    // Only the numeric message qualified for the log
    let raw = std::fs::read_to_string(app.data_dir().join("chat.json")).unwrap();
    let log: Value = serde_json::from_str(&raw).unwrap();
    let entries = log.as_object().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries.values().next().unwrap()["message"], 5);
}
