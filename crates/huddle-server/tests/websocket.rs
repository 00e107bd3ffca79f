//! End-to-end tests against the real axum server.

use futures_util::{SinkExt, StreamExt};
use huddle_core::StaticUser;
use huddle_server::{serve, AppState, Config};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

fn user(user_id: &str, name: &str, profile: i64) -> StaticUser {
    StaticUser {
        user_id: user_id.into(),
        name: name.into(),
        email: None,
        profile: Some(profile),
    }
}

struct TestServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    stop: Option<oneshot::Sender<()>>,
}

impl TestServer {
    async fn start() -> Self {
        let mut config = Config::default();
        config.metrics.enabled = false;
        config.transport.max_message_size = 1024;
        config.auth.tokens.insert("tok-alice".into(), user("u1", "Alice", 1));
        config.auth.tokens.insert("tok-bob".into(), user("u2", "Bob", 4));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(AppState::new(config));
        let (stop, stopped) = oneshot::channel::<()>();

        tokio::spawn(serve(listener, state.clone(), async move {
            let _ = stopped.await;
        }));

        Self {
            addr,
            state,
            stop: Some(stop),
        }
    }

    fn url(&self, query: &str) -> String {
        format!("ws://{}/ws{}", self.addr, query)
    }

    async fn health(&self) -> Value {
        let mut stream = TcpStream::connect(self.addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        let body = response.split("\r\n\r\n").nth(1).unwrap();
        serde_json::from_str(body).unwrap()
    }

    fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

async fn next_json(socket: &mut Socket) -> Value {
    loop {
        let message = timeout(WAIT, socket.next())
            .await
            .expect("timed out waiting for frame")
            .expect("socket closed")
            .expect("socket error");
        match message {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Binary(data) => return serde_json::from_slice(&data).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

async fn expect_closed(socket: &mut Socket) {
    loop {
        match timeout(WAIT, socket.next()).await.expect("timed out waiting for close") {
            None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(other)) => panic!("expected close, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_websocket_presence_and_rooms() {
    let mut server = TestServer::start().await;

    // Token in the query string
    let (mut alice, _) = connect_async(server.url("?token=tok-alice")).await.unwrap();
    let snapshot = next_json(&mut alice).await;
    assert_eq!(snapshot["type"], "presence_snapshot");
    assert_eq!(snapshot["data"]["users"], json!([]));

    // Token in the Authorization header
    let mut request = server.url("").into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Authorization", "Bearer tok-bob".parse().unwrap());
    let (mut bob, _) = connect_async(request).await.unwrap();
    let snapshot = next_json(&mut bob).await;
    assert_eq!(snapshot["data"]["users"][0]["userId"], "u1");

    let online = next_json(&mut alice).await;
    assert_eq!(online["type"], "user_presence");
    assert_eq!(online["status"], "online");
    assert_eq!(online["data"]["profile"], 4);

    let health = server.health().await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["users"], 2);
    assert_eq!(health["connections"], 2);

    // Oversized frames are skipped without closing the connection
    alice
        .send(Message::Text("x".repeat(4096)))
        .await
        .unwrap();

    let create = json!({
        "type": "create_room",
        "data": {"chatName": "Lobby", "background": "6", "isPublic": true}
    });
    alice.send(Message::Text(create.to_string())).await.unwrap();

    let created = next_json(&mut bob).await;
    assert_eq!(created["type"], "create_room");
    assert_eq!(created["data"]["chatName"], "Lobby");
    assert_eq!(next_json(&mut alice).await, created);

    let room_id = created["data"]["roomId"].as_str().unwrap().to_string();
    let join = json!({"type": "join_room", "data": {"roomId": room_id}});
    bob.send(Message::Text(join.to_string())).await.unwrap();
    assert_eq!(next_json(&mut alice).await["data"]["userId"], "u2");
    assert_eq!(next_json(&mut bob).await["type"], "join_room");

    let text = json!({"type": "message", "data": {"roomId": room_id, "content": "hi all"}});
    bob.send(Message::Text(text.to_string())).await.unwrap();
    let received = next_json(&mut alice).await;
    assert_eq!(received["type"], "message");
    assert_eq!(received["data"]["senderName"], "Bob");
    assert_eq!(next_json(&mut bob).await["data"]["content"], "hi all");

    bob.close(None).await.unwrap();
    let offline = next_json(&mut alice).await;
    assert_eq!(offline["status"], "offline");
    assert_eq!(offline["data"]["userId"], "u2");

    server.stop();
    expect_closed(&mut alice).await;
    assert!(server.state.hub().is_shut_down());
    assert_eq!(server.state.hub().stats().connection_count, 0);
}

#[tokio::test]
async fn test_websocket_rejects_bad_token() {
    let mut server = TestServer::start().await;

    let (mut intruder, _) = connect_async(server.url("?token=forged")).await.unwrap();
    expect_closed(&mut intruder).await;

    let (mut anonymous, _) = connect_async(server.url("")).await.unwrap();
    expect_closed(&mut anonymous).await;

    assert_eq!(server.state.hub().stats().connection_count, 0);
    server.stop();
}
