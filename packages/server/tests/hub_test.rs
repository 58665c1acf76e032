//! End-to-end tests: the hub runs in-process on an ephemeral port and is
//! driven over real WebSocket and HTTP connections.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use futures_util::{SinkExt, StreamExt};
use kizuna_server::{
    config::HubConfig,
    ui::{AppState, Server},
};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

const SECRET: &str = "s3cret";
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Helper struct to manage an in-process server
struct TestServer {
    addr: SocketAddr,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn start() -> Self {
        let config = HubConfig {
            secret_key: Some(SECRET.to_string()),
            ..HubConfig::default()
        };
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Failed to read local address");
        let server = Server::new(Arc::new(AppState::from_config(config)));
        let handle = tokio::spawn(async move {
            server.serve(listener).await.expect("Server error");
        });
        TestServer { addr, handle }
    }

    fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Connect a client and consume its `connected` event
    async fn client(&self) -> TestClient {
        let (ws, _) = connect_async(self.ws_url())
            .await
            .expect("Failed to connect");
        let mut client = TestClient { ws };
        let connected = client.wait_for("connected").await;
        assert!(connected["data"]["connectionId"].is_string());
        client
    }

    /// Connect a client and register it under `user_id`
    async fn registered(&self, user_id: &str) -> TestClient {
        let mut client = self.client().await;
        client.send("register-user", json!({ "userId": user_id })).await;
        let registered = client.wait_for("registered").await;
        assert_eq!(registered["data"]["userId"], user_id);
        client
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Helper struct wrapping one WebSocket client
struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    async fn send(&mut self, event: &str, data: Value) {
        let frame = json!({ "event": event, "data": data }).to_string();
        self.ws
            .send(Message::text(frame))
            .await
            .expect("Failed to send frame");
    }

    /// Next event, whatever it is
    async fn next_event(&mut self) -> Value {
        loop {
            let msg = tokio::time::timeout(RECV_TIMEOUT, self.ws.next())
                .await
                .expect("Timed out waiting for an event")
                .expect("Connection closed")
                .expect("WebSocket error");
            if let Message::Text(text) = msg {
                return serde_json::from_str(text.as_str()).expect("Invalid JSON from server");
            }
        }
    }

    /// Skip events until one named `name` arrives
    async fn wait_for(&mut self, name: &str) -> Value {
        loop {
            let event = self.next_event().await;
            if event["event"] == name {
                return event;
            }
        }
    }

    async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

#[tokio::test]
async fn test_private_message_reaches_recipient_and_echoes_to_sender() {
    // テスト項目: 1:1 メッセージが相手に届き、送信者にもエコーされる
    // given (前提条件):
    let server = TestServer::start().await;
    let mut alice = server.registered("7").await;
    let mut bob = server.registered("42").await;

    // when (操作):
    alice
        .send(
            "send-private-message",
            json!({ "toUserId": "42", "message": "hi" }),
        )
        .await;

    // then (期待する結果):
    let received = bob.wait_for("receive-private-message").await;
    assert_eq!(received["data"]["sender"], "7");
    assert_eq!(received["data"]["recipient"], "42");
    assert_eq!(received["data"]["content"], "hi");

    let echo = alice.wait_for("receive-private-message").await;
    assert_eq!(echo["data"]["content"], "hi");
    assert_eq!(echo["data"]["msgId"], received["data"]["msgId"]);

    let bob_conversation = bob.wait_for("conversation-updated").await;
    assert_eq!(bob_conversation["data"]["userId"], "7");
    let alice_conversation = alice.wait_for("conversation-updated").await;
    assert_eq!(alice_conversation["data"]["userId"], "42");
}

#[tokio::test]
async fn test_eleventh_member_is_rejected_with_room_full() {
    // テスト項目: 会議ルームの 11 人目は room-full を受け取り参加できない
    // given (前提条件):
    let server = TestServer::start().await;
    let mut members = Vec::new();
    for _ in 0..10 {
        let mut client = server.client().await;
        client.send("join-room", json!({ "roomId": "standup" })).await;
        let count = client.wait_for("room-participant-count").await;
        assert_eq!(count["data"]["roomId"], "standup");
        members.push(client);
    }

    // when (操作):
    let mut late = server.client().await;
    late.send("join-room", json!({ "roomId": "standup" })).await;

    // then (期待する結果):
    let full = late.next_event().await;
    assert_eq!(full["event"], "room-full");
    assert_eq!(full["data"]["max"], 10);

    let rooms: Value = reqwest::get(server.http_url("/api/rooms"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(rooms[0]["participantCount"], 10);
}

#[tokio::test]
async fn test_calling_an_offline_user() {
    // テスト項目: オフラインのユーザーを呼び出すと user-offline が返る
    // given (前提条件):
    let server = TestServer::start().await;
    let mut caller = server.registered("7").await;

    // when (操作):
    caller
        .send("call-user", json!({ "toUserId": "99", "callType": "video" }))
        .await;

    // then (期待する結果):
    let reply = caller.next_event().await;
    assert_eq!(reply["event"], "user-offline");
    assert_eq!(reply["data"]["userId"], "99");
}

#[tokio::test]
async fn test_late_joiner_receives_room_history() {
    // テスト項目: 後から参加したメンバーに履歴が再生される
    // given (前提条件):
    let server = TestServer::start().await;
    let mut first = server.client().await;
    first
        .send(
            "join-room",
            json!({ "roomId": "lobby", "userInfo": { "firstName": "Ada" } }),
        )
        .await;
    first.wait_for("room-participant-count").await;
    first
        .send("room-message", json!({ "roomId": "lobby", "message": "hello" }))
        .await;
    let hello = loop {
        let event = first.wait_for("room-message").await;
        if event["data"]["message"]["text"] == "hello" {
            break event;
        }
    };
    assert_eq!(hello["data"]["message"]["type"], "user");

    // when (操作):
    let mut second = server.client().await;
    second.send("join-room", json!({ "roomId": "lobby" })).await;

    // then (期待する結果):
    let existing = second.wait_for("existing-users").await;
    assert_eq!(existing["data"]["users"].as_array().unwrap().len(), 1);
    let history = second.wait_for("room-history").await;
    let texts: Vec<&str> = history["data"]["messages"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|m| m["text"].as_str())
        .collect();
    assert!(texts.contains(&"hello"));

    let joined = first.wait_for("user-joined").await;
    assert_eq!(joined["data"]["roomId"], "lobby");
}

#[tokio::test]
async fn test_call_flow_and_disconnect_ends_call_for_peer() {
    // テスト項目: 着信・応答の後、片方が切断すると相手に call-ended(disconnected) が届く
    // given (前提条件):
    let server = TestServer::start().await;
    let mut caller = server.registered("7").await;
    let mut callee = server.registered("42").await;

    caller
        .send(
            "call-user",
            json!({ "toUserId": "42", "callType": "audio", "roomId": "call-7-42" }),
        )
        .await;
    let incoming = callee.wait_for("incoming-call").await;
    assert_eq!(incoming["data"]["fromUserId"], "7");
    assert_eq!(incoming["data"]["callType"], "audio");

    callee.send("accept-call", json!({ "fromUserId": "7" })).await;
    let accepted = caller.wait_for("call-accepted").await;
    assert_eq!(accepted["data"]["byUserId"], "42");

    // when (操作):
    callee.close().await;

    // then (期待する結果):
    let ended = caller.wait_for("call-ended").await;
    assert_eq!(ended["data"]["reason"], "disconnected");

    // 双方が free に戻っているので再度呼び出すと user-offline になる
    caller.send("call-user", json!({ "toUserId": "42" })).await;
    let reply = caller.wait_for("user-offline").await;
    assert_eq!(reply["data"]["userId"], "42");
}

#[tokio::test]
async fn test_trusted_counter_endpoint() {
    // テスト項目: 信頼済みエンドポイントは鍵を検証し、届いた端末数を返す
    // given (前提条件):
    let server = TestServer::start().await;
    let mut bob = server.registered("42").await;
    let http = reqwest::Client::new();
    let url = server.http_url("/api/notifications/count");

    // when (操作):
    let without_key = http
        .post(&url)
        .json(&json!({ "toUserId": "42", "count": 3 }))
        .send()
        .await
        .unwrap();
    let missing_target = http
        .post(format!("{}?key={}", url, SECRET))
        .json(&json!({ "count": 3 }))
        .send()
        .await
        .unwrap();
    let accepted = http
        .post(&url)
        .header("x-api-key", SECRET)
        .json(&json!({ "toUserId": 42, "count": 3 }))
        .send()
        .await
        .unwrap();
    let unreachable = http
        .post(format!("{}?key={}", url, SECRET))
        .json(&json!({ "toUserId": "nobody", "count": 1 }))
        .send()
        .await
        .unwrap();

    // then (期待する結果):
    assert_eq!(without_key.status(), reqwest::StatusCode::FORBIDDEN);
    assert_eq!(missing_target.status(), reqwest::StatusCode::BAD_REQUEST);

    assert_eq!(accepted.status(), reqwest::StatusCode::OK);
    let ack: Value = accepted.json().await.unwrap();
    assert_eq!(ack, json!({ "status": "ok", "delivered": 1 }));

    assert_eq!(unreachable.status(), reqwest::StatusCode::OK);
    let ack: Value = unreachable.json().await.unwrap();
    assert_eq!(ack["delivered"], 0);

    let pushed = bob.wait_for("new-notification-count").await;
    assert_eq!(pushed["data"]["count"], 3);
}

#[tokio::test]
async fn test_health_check() {
    // テスト項目: ヘルスチェックは ok を返す
    // given (前提条件):
    let server = TestServer::start().await;

    // when (操作):
    let response = reqwest::get(server.http_url("/api/health")).await.unwrap();

    // then (期待する結果):
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_refused_join_keeps_connection_usable() {
    // テスト項目: live 種別での join-room は拒否されるが、接続はそのまま使える
    // given (前提条件):
    let server = TestServer::start().await;
    let mut client = server.client().await;

    // when (操作):
    client
        .send("join-room", json!({ "roomId": "show", "kind": "live" }))
        .await;
    client.send("join-room", json!({ "roomId": "standup" })).await;

    // then (期待する結果):
    let existing = client.next_event().await;
    assert_eq!(existing["event"], "existing-users");
    assert_eq!(existing["data"]["roomId"], "standup");
    client.close().await;
}

#[tokio::test]
async fn test_file_reaches_recipient() {
    // テスト項目: send-file のファイルが receive-file として相手に届く
    // given (前提条件):
    let server = TestServer::start().await;
    let mut alice = server.registered("7").await;
    let mut bob = server.registered("42").await;

    // when (操作):
    alice
        .send(
            "send-file",
            json!({ "toUserId": "42", "file": "data:,hello", "fileName": "hello.txt", "preview": true }),
        )
        .await;

    // then (期待する結果):
    let received = bob.wait_for("receive-file").await;
    assert_eq!(received["data"]["sender"], "7");
    assert_eq!(received["data"]["fileName"], "hello.txt");
    assert_eq!(received["data"]["preview"], true);
    let echo = alice.wait_for("receive-file").await;
    assert_eq!(echo["data"]["msgId"], received["data"]["msgId"]);
}
