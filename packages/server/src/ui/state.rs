//! Server state shared by every handler.

use std::sync::Arc;

use kizuna_shared::time::SystemClock;

use crate::{
    config::HubConfig,
    domain::MessagePusher,
    infrastructure::{
        message_pusher::WebSocketMessagePusher,
        store::{CallStore, ConnectionStore, RoomStore},
    },
    usecase::{
        CallUseCase, ChatUseCase, ConnectUseCase, DisconnectUseCase, LiveUseCase,
        NotificationUseCase, RoomQueryUseCase, RoomSessionUseCase, SignalingUseCase,
    },
};

/// Shared application state
pub struct AppState {
    pub config: Arc<HubConfig>,
    /// ConnectUseCase（接続・ユーザー登録のユースケース）
    pub connect_usecase: Arc<ConnectUseCase>,
    /// DisconnectUseCase（切断処理のユースケース）
    pub disconnect_usecase: Arc<DisconnectUseCase>,
    /// RoomSessionUseCase（ルーム参加・退出のユースケース）
    pub room_session_usecase: Arc<RoomSessionUseCase>,
    /// SignalingUseCase（シグナリング中継のユースケース）
    pub signaling_usecase: Arc<SignalingUseCase>,
    /// CallUseCase（1:1 通話のユースケース）
    pub call_usecase: Arc<CallUseCase>,
    /// ChatUseCase（1:1 チャットのユースケース）
    pub chat_usecase: Arc<ChatUseCase>,
    /// NotificationUseCase（通知中継のユースケース）
    pub notification_usecase: Arc<NotificationUseCase>,
    /// LiveUseCase（ライブ配信のユースケース）
    pub live_usecase: Arc<LiveUseCase>,
    /// RoomQueryUseCase（ルーム参照のユースケース）
    pub room_query_usecase: Arc<RoomQueryUseCase>,
}

impl AppState {
    /// Wire every dependency for the given configuration.
    pub fn from_config(config: HubConfig) -> Self {
        // Initialize dependencies in order:
        // 1. Stores
        // 2. MessagePusher
        // 3. UseCases

        // 1. Create Stores (in-memory, lock order: connections -> rooms -> calls)
        let connections = ConnectionStore::default();
        let rooms = RoomStore::default();
        let calls = CallStore::default();

        // 2. Create MessagePusher (WebSocket implementation)
        let message_pusher: Arc<dyn MessagePusher> = Arc::new(WebSocketMessagePusher::new());
        let clock = Arc::new(SystemClock);
        let config = Arc::new(config);

        // 3. Create UseCases
        let connect_usecase = Arc::new(ConnectUseCase::new(
            connections.clone(),
            calls.clone(),
            message_pusher.clone(),
        ));
        let disconnect_usecase = Arc::new(DisconnectUseCase::new(
            connections.clone(),
            rooms.clone(),
            calls.clone(),
            message_pusher.clone(),
            clock.clone(),
        ));
        let room_session_usecase = Arc::new(RoomSessionUseCase::new(
            connections.clone(),
            rooms.clone(),
            message_pusher.clone(),
            clock.clone(),
            config.clone(),
        ));
        let signaling_usecase = Arc::new(SignalingUseCase::new(
            connections.clone(),
            message_pusher.clone(),
        ));
        let call_usecase = Arc::new(CallUseCase::new(
            connections.clone(),
            calls,
            message_pusher.clone(),
            config.ring_timeout,
        ));
        let chat_usecase = Arc::new(ChatUseCase::new(
            connections.clone(),
            message_pusher.clone(),
            clock.clone(),
        ));
        let notification_usecase = Arc::new(NotificationUseCase::new(
            connections.clone(),
            message_pusher.clone(),
        ));
        let live_usecase = Arc::new(LiveUseCase::new(
            connections,
            rooms.clone(),
            message_pusher,
            clock,
            config.clone(),
        ));
        let room_query_usecase = Arc::new(RoomQueryUseCase::new(rooms));

        Self {
            config,
            connect_usecase,
            disconnect_usecase,
            room_session_usecase,
            signaling_usecase,
            call_usecase,
            chat_usecase,
            notification_usecase,
            live_usecase,
            room_query_usecase,
        }
    }
}
