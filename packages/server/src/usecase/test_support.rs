//! ユースケースのテスト用ヘルパー
//!
//! 実際のストアと WebSocketMessagePusher を組み合わせ、接続ごとの受信チャンネルから
//! 届いたイベントを JSON として取り出す。

use std::sync::Arc;

use kizuna_shared::time::FixedClock;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::{
    config::HubConfig,
    domain::{ConnectionId, MessagePusher, UserId},
    infrastructure::{
        message_pusher::WebSocketMessagePusher,
        store::{CallStore, ConnectionStore, RoomStore},
    },
};

use super::{
    CallUseCase, ChatUseCase, ConnectUseCase, DisconnectUseCase, LiveUseCase,
    NotificationUseCase, RoomQueryUseCase, RoomSessionUseCase, SignalingUseCase,
};

const TEST_NOW: i64 = 1_700_000_000_000;

pub(crate) struct TestHub {
    pub connections: ConnectionStore,
    pub rooms: RoomStore,
    pub calls: CallStore,
    pub connect_usecase: ConnectUseCase,
    pub disconnect: DisconnectUseCase,
    pub room_session: RoomSessionUseCase,
    pub signaling: SignalingUseCase,
    pub call: CallUseCase,
    pub chat: ChatUseCase,
    pub notification: NotificationUseCase,
    pub live: LiveUseCase,
    pub room_query: RoomQueryUseCase,
}

impl TestHub {
    pub fn new() -> Self {
        let config = Arc::new(HubConfig::default());
        let connections = ConnectionStore::default();
        let rooms = RoomStore::default();
        let calls = CallStore::default();
        let pusher: Arc<dyn MessagePusher> = Arc::new(WebSocketMessagePusher::new());
        let clock = Arc::new(FixedClock::new(TEST_NOW));

        Self {
            connect_usecase: ConnectUseCase::new(
                connections.clone(),
                calls.clone(),
                pusher.clone(),
            ),
            disconnect: DisconnectUseCase::new(
                connections.clone(),
                rooms.clone(),
                calls.clone(),
                pusher.clone(),
                clock.clone(),
            ),
            room_session: RoomSessionUseCase::new(
                connections.clone(),
                rooms.clone(),
                pusher.clone(),
                clock.clone(),
                config.clone(),
            ),
            signaling: SignalingUseCase::new(connections.clone(), pusher.clone()),
            call: CallUseCase::new(
                connections.clone(),
                calls.clone(),
                pusher.clone(),
                config.ring_timeout,
            ),
            chat: ChatUseCase::new(connections.clone(), pusher.clone(), clock.clone()),
            notification: NotificationUseCase::new(connections.clone(), pusher.clone()),
            live: LiveUseCase::new(
                connections.clone(),
                rooms.clone(),
                pusher,
                clock,
                config,
            ),
            room_query: RoomQueryUseCase::new(rooms.clone()),
            connections,
            rooms,
            calls,
        }
    }

    /// 接続を受け入れる（`connected` は読み捨てる）
    pub async fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let connection = self.connect_usecase.connect(tx).await;
        drain(&mut rx);
        (connection, rx)
    }

    /// 接続してユーザー登録まで済ませる（`registered` は読み捨てる）
    pub async fn registered(&self, id: &str) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
        let (connection, mut rx) = self.connect().await;
        self.connect_usecase
            .register(connection, user(id))
            .await
            .unwrap();
        drain(&mut rx);
        (connection, rx)
    }
}

pub(crate) fn user(id: &str) -> UserId {
    UserId::new(id.to_string()).unwrap()
}

/// 受信済みのイベントを全て取り出す
pub(crate) fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<Value> {
    let mut events = Vec::new();
    while let Ok(text) = rx.try_recv() {
        events.push(serde_json::from_str(&text).unwrap());
    }
    events
}

pub(crate) fn event_names(events: &[Value]) -> Vec<&str> {
    events
        .iter()
        .map(|e| e["event"].as_str().unwrap_or_default())
        .collect()
}
