use std::{sync::Arc, time::Duration};

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use soulmegle::{
    AppState, Config,
    connections::SqliteConnections,
    rooms::Relay,
    similarity::{MemoryIndex, Metadata},
    waiting::MemoryWaiting,
};
use sqlx::sqlite::SqlitePoolOptions;
use tokio::{net::TcpStream, time::timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Server {
    base: String,
    ws_url: String,
    index: Arc<MemoryIndex>,
    relay: Relay,
}

async fn start() -> Server {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let store = SqliteConnections::new(db_pool, Duration::from_secs(3600));
    store.migrate().await.unwrap();

    let index = Arc::new(MemoryIndex::new());
    let state = AppState::new(
        Config::default(),
        Arc::new(store),
        Arc::new(MemoryWaiting::new()),
        index.clone(),
    );
    let relay = state.relay.clone();
    let app = soulmegle::app(state).unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    Server {
        base: format!("http://{addr}"),
        ws_url: format!("ws://{addr}/ws"),
        index,
        relay,
    }
}

async fn find_match(server: &Server, user: &str) -> (u16, Value) {
    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/video-chat/findmatch", server.base))
        .json(&json!({ "userId": user }))
        .send()
        .await
        .unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

async fn connect(server: &Server) -> Ws {
    let (ws, _) = connect_async(server.ws_url.as_str()).await.unwrap();
    ws
}

async fn send(ws: &mut Ws, event: Value) {
    ws.send(Message::Text(event.to_string().into())).await.unwrap();
}

async fn next_event(ws: &mut Ws) -> Value {
    timeout(Duration::from_secs(2), async {
        loop {
            match ws.next().await.expect("socket closed").unwrap() {
                Message::Text(text) => return serde_json::from_str::<Value>(text.as_str()).unwrap(),
                Message::Close(_) => panic!("socket closed"),
                _ => continue,
            }
        }
    })
    .await
    .expect("timed out waiting for an event")
}

async fn assert_quiet(ws: &mut Ws) {
    let got = timeout(Duration::from_millis(150), ws.next()).await;
    assert!(got.is_err(), "unexpected frame: {got:?}");
}

async fn join(server: &Server, ws: &mut Ws, user: &str, room: &str) {
    send(ws, json!({ "event": "join-room", "data": { "userId": user, "roomId": room } })).await;
    timeout(Duration::from_secs(2), async {
        while server.relay.presence().get(user).is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("join never registered");
}

#[tokio::test]
async fn test_health() {
    let server = start().await;
    let body = reqwest::get(&server.base).await.unwrap().text().await.unwrap();
    assert_eq!(body, "signaling server is running");
}

#[tokio::test]
async fn test_waiting_user_is_paired_with_next_caller() {
    let server = start().await;
    server.index.upsert("u1", vec![1.0, 0.0], Some(Metadata::at(40.7, -74.0)));

    let (status, first) = find_match(&server, "u1").await;
    assert_eq!(status, 200);
    assert_eq!(first["success"], true);
    assert_eq!(first["matchedUserId"], Value::Null);
    let room = first["roomId"].as_str().unwrap().to_owned();

    let (status, second) = find_match(&server, "u2").await;
    assert_eq!(status, 200);
    assert_eq!(second, json!({ "success": true, "roomId": room, "matchedUserId": "u1" }));

    let (_, again) = find_match(&server, "u1").await;
    assert_eq!(again, json!({ "success": true, "roomId": room, "matchedUserId": "u2" }));
}

#[tokio::test]
async fn test_match_failures_map_to_status_codes() {
    let server = start().await;
    server.index.upsert("lost", vec![1.0], Some(Metadata::default()));

    let (status, body) = find_match(&server, "nobody").await;
    assert_eq!(status, 404);
    assert_eq!(body["success"], false);

    let (status, _) = find_match(&server, "lost").await;
    assert_eq!(status, 400);

    let (status, _) = find_match(&server, "").await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_unreadable_body_gets_json_failure() {
    let server = start().await;
    let client = reqwest::Client::new();
    let url = format!("{}/api/v1/video-chat/findmatch", server.base);

    let requests = [
        client.post(&url).body("userId=u1"),
        client.post(&url).header("content-type", "application/json").body("{not json"),
    ];
    for request in requests {
        let response = request.send().await.unwrap();
        assert_eq!(response.status().as_u16(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("userId"));
    }
}

#[tokio::test]
async fn test_chat_is_relayed_to_the_peer_only() {
    let server = start().await;
    let mut ws1 = connect(&server).await;
    let mut ws2 = connect(&server).await;

    join(&server, &mut ws1, "u1", "r1").await;
    join(&server, &mut ws2, "u2", "r1").await;
    assert_eq!(
        next_event(&mut ws1).await,
        json!({ "event": "peer-joined", "data": { "userId": "u2" } })
    );

    let chat = json!({ "event": "chat-message", "data": { "roomId": "r1", "userId": "u1", "message": "hi" } });
    send(&mut ws1, chat.clone()).await;
    assert_eq!(next_event(&mut ws2).await, chat);
    assert_quiet(&mut ws1).await;

    let offer = json!({ "event": "offer", "data": { "roomId": "r1", "userId": "u2", "payload": { "sdp": "v=0" } } });
    send(&mut ws2, offer).await;
    let got = next_event(&mut ws1).await;
    assert_eq!(got["event"], "negotiation-offer");
    assert_eq!(got["data"]["payload"]["sdp"], "v=0");
}

#[tokio::test]
async fn test_problems_are_reported_to_the_sender() {
    let server = start().await;
    let mut ws1 = connect(&server).await;
    let mut ws2 = connect(&server).await;
    let mut ws3 = connect(&server).await;

    send(&mut ws1, json!({ "event": "join-room", "data": { "userId": "u1" } })).await;
    assert_eq!(next_event(&mut ws1).await["data"]["code"], "protocol-violation");

    send(&mut ws1, json!("not an event")).await;
    assert_eq!(next_event(&mut ws1).await["data"]["code"], "protocol-violation");

    join(&server, &mut ws1, "u1", "r1").await;
    join(&server, &mut ws2, "u2", "r1").await;
    send(&mut ws3, json!({ "event": "join-room", "data": { "userId": "u3", "roomId": "r1" } })).await;
    assert_eq!(next_event(&mut ws3).await["data"]["code"], "room-full");

    send(&mut ws3, json!({ "event": "chat-message", "data": { "roomId": "r1", "userId": "u3", "message": "let me in" } })).await;
    assert_eq!(next_event(&mut ws3).await["data"]["code"], "not-joined");
}

#[tokio::test]
async fn test_disconnect_notifies_peer_and_clears_presence() {
    let server = start().await;
    let mut ws1 = connect(&server).await;
    let mut ws2 = connect(&server).await;
    join(&server, &mut ws1, "u1", "r1").await;
    join(&server, &mut ws2, "u2", "r1").await;
    next_event(&mut ws1).await;

    ws2.close(None).await.unwrap();
    assert_eq!(
        next_event(&mut ws1).await,
        json!({ "event": "peer-left", "data": { "userId": "u2" } })
    );
    assert!(server.relay.presence().get("u2").is_none());
    assert!(server.relay.presence().get("u1").is_some());
}
