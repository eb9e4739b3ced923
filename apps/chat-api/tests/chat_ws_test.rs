//! End-to-end tests over real WebSocket connections.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use chat_api::chat::handler::ChatService;
use chat_api::chat::store::MemoryChatStore;
use chat_api::config::Config;
use chat_api::directory::{FileDirectory, SubscriberRecord};
use chat_api::AppState;

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Bind the full router on an ephemeral port and return its address.
async fn spawn_app(subscribers: Vec<SubscriberRecord>) -> SocketAddr {
    let state = AppState {
        config: Arc::new(Config {
            port: 0,
            subscribers_file: None,
        }),
        chat: Arc::new(ChatService::new(
            Arc::new(MemoryChatStore::new()),
            Arc::new(FileDirectory::from_records(subscribers)),
        )),
    };

    let app = chat_api::routes::router().with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server error");
    });
    addr
}

async fn connect(addr: SocketAddr, query: &str) -> WsClient {
    let url = format!("ws://{addr}/ws/chat?{query}");
    let (ws, _resp) = connect_async(url).await.expect("ws connect");
    ws
}

/// Read the next text frame as a parsed event, with a timeout so a missing
/// event fails the test instead of hanging it.
async fn next_event(ws: &mut WsClient) -> serde_json::Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("connection closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("event is json");
        }
    }
}

async fn send_frame(ws: &mut WsClient, frame: &str) {
    ws.send(Message::text(frame)).await.expect("ws send");
}

#[tokio::test]
async fn user_support_message_reaches_admins_with_sound_cue() {
    let addr = spawn_app(Vec::new()).await;

    let mut admin = connect(addr, "type=admin&userId=admin1").await;
    let greeting = next_event(&mut admin).await;
    assert_eq!(greeting["type"], "connection_established");
    assert_eq!(greeting["data"]["userType"], "admin");

    let mut alice = connect(addr, "type=user&userId=u1&email=alice%40example.com").await;
    let greeting = next_event(&mut alice).await;
    assert_eq!(greeting["type"], "connection_established");
    assert_eq!(greeting["data"]["isSubscriber"], false);

    let joined = next_event(&mut admin).await;
    assert_eq!(joined["type"], "user_connected");
    assert_eq!(joined["data"]["email"], "alice@example.com");

    send_frame(
        &mut alice,
        r#"{"type":"chat_message","data":{"message":"hello"}}"#,
    )
    .await;

    // The sender is a participant and gets the message echoed.
    let message = next_event(&mut alice).await;
    assert_eq!(message["type"], "new_message");
    assert_eq!(message["data"]["message"], "hello");
    let conversation_id = message["data"]["conversationId"]
        .as_str()
        .expect("conversation id")
        .to_string();

    // Admins get the message plus a distinct sound notification.
    let message = next_event(&mut admin).await;
    assert_eq!(message["type"], "new_message");
    let sound = next_event(&mut admin).await;
    assert_eq!(sound["type"], "sound_notification");
    assert_eq!(sound["data"]["sound"], "message_received");
    assert_eq!(sound["data"]["conversationId"], conversation_id.as_str());
}

#[tokio::test]
async fn malformed_frame_keeps_the_connection_usable() {
    let addr = spawn_app(Vec::new()).await;

    let mut alice = connect(addr, "type=user&userId=u1&email=alice%40example.com").await;
    next_event(&mut alice).await; // connection_established

    send_frame(&mut alice, "definitely not json").await;
    let error = next_event(&mut alice).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["data"]["message"], "Invalid message format");

    // The connection is still open and processes valid frames.
    send_frame(
        &mut alice,
        r#"{"type":"chat_message","data":{"message":"still here"}}"#,
    )
    .await;
    let message = next_event(&mut alice).await;
    assert_eq!(message["type"], "new_message");
    assert_eq!(message["data"]["message"], "still here");
}

#[tokio::test]
async fn admin_direct_message_round_trip_to_live_subscriber() {
    let addr = spawn_app(vec![SubscriberRecord {
        email: "carol@example.com".to_string(),
        verified: true,
        subscribed: true,
    }])
    .await;

    let mut admin = connect(addr, "type=admin&userId=admin1").await;
    next_event(&mut admin).await;

    let mut carol = connect(addr, "type=subscriber&userId=carol&email=carol%40example.com").await;
    let greeting = next_event(&mut carol).await;
    assert_eq!(greeting["data"]["isSubscriber"], true);
    next_event(&mut admin).await; // user_connected

    send_frame(
        &mut admin,
        r#"{"type":"admin_message_subscriber","data":{"subscriberEmail":"carol@example.com","message":"welcome"}}"#,
    )
    .await;

    let message = next_event(&mut carol).await;
    assert_eq!(message["type"], "admin_message");
    assert_eq!(message["data"]["message"], "welcome");
    let sound = next_event(&mut carol).await;
    assert_eq!(sound["type"], "sound_notification");

    let confirmation = next_event(&mut admin).await;
    assert_eq!(confirmation["type"], "message_sent");
    assert_eq!(confirmation["data"]["delivered"], true);
}

#[tokio::test]
async fn disconnect_is_announced_to_admins() {
    let addr = spawn_app(Vec::new()).await;

    let mut admin = connect(addr, "type=admin&userId=admin1").await;
    next_event(&mut admin).await;

    let mut alice = connect(addr, "type=user&userId=u1&email=alice%40example.com").await;
    next_event(&mut alice).await;
    next_event(&mut admin).await; // user_connected

    alice.close(None).await.expect("close");

    let left = next_event(&mut admin).await;
    assert_eq!(left["type"], "user_disconnected");
    assert_eq!(left["data"]["email"], "alice@example.com");
}
