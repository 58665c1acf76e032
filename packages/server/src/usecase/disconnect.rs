//! UseCase: 切断時の後始末
//!
//! 切断は唯一のキャンセル契機であり、次の 3 つを不可分に行う:
//!
//! 1. 接続レジストリから外す
//! 2. 参加していた全ルームから退出する（逆引きで参加ルームだけを辿る）
//! 3. ringing / in-call の通話を両者とも free に戻し、相手に通知する
//!
//! 3 つのストアのロックを順に取得し、全て保持したまま処理するため、
//! 途中の状態が他のタスクから見えることはない。
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - 切断後にレジストリ・ルーム・通話のどこにも接続が残らないこと
//! - 残ったメンバー・通話相手に通知が届くこと
//! - 同じユーザーの他の端末が残っている場合、そちらがプライマリになること

use std::sync::Arc;

use kizuna_shared::time::Clock;

use crate::{
    domain::{CallEndReason, ConnectionId, MessagePusher, RoomId, Timestamp, UserId},
    infrastructure::store::{CallStore, ConnectionStore, RoomStore},
};

use super::{call::release_call_locked, room_session::leave_locked};

/// 切断処理の結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisconnectReport {
    pub identity: Option<UserId>,
    pub rooms_left: Vec<RoomId>,
    pub call_released: bool,
}

/// 切断のユースケース
pub struct DisconnectUseCase {
    connections: ConnectionStore,
    rooms: RoomStore,
    calls: CallStore,
    /// MessagePusher（メッセージ通知の抽象化）
    message_pusher: Arc<dyn MessagePusher>,
    clock: Arc<dyn Clock>,
}

impl DisconnectUseCase {
    pub fn new(
        connections: ConnectionStore,
        rooms: RoomStore,
        calls: CallStore,
        message_pusher: Arc<dyn MessagePusher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            connections,
            rooms,
            calls,
            message_pusher,
            clock,
        }
    }

    pub async fn execute(&self, connection: ConnectionId) -> DisconnectReport {
        let now = Timestamp::new(self.clock.now_millis());

        let mut registry = self.connections.lock().await;
        self.message_pusher.unregister_connection(&connection).await;
        let identity = registry.detach(&connection);

        let mut rooms = self.rooms.lock().await;
        let mut rooms_left = Vec::new();
        for room_id in rooms.rooms_of(&connection) {
            if leave_locked(
                &mut rooms,
                &self.rooms,
                self.message_pusher.as_ref(),
                &room_id,
                &connection,
                now,
            )
            .await
            .is_some()
            {
                rooms_left.push(room_id);
            }
        }

        let mut calls = self.calls.lock().await;
        let call_released = match &identity {
            Some(user) => release_call_locked(
                &registry,
                &mut calls,
                self.message_pusher.as_ref(),
                user,
                &connection,
                CallEndReason::Disconnected,
            )
            .await
            .is_some(),
            None => false,
        };

        tracing::info!(
            "Connection '{}' detached (identity: {:?}, rooms left: {}, call released: {})",
            connection,
            identity.as_ref().map(UserId::as_str),
            rooms_left.len(),
            call_released
        );

        DisconnectReport {
            identity,
            rooms_left,
            call_released,
        }
    }
}
