//! UseCase: 外部から依頼された通知の配信
//!
//! バックエンドサーバー（HTTP の信頼済みエンドポイント）とクライアント（WebSocket）の
//! 両方から呼ばれる。相手に届かなくてもエラーにはせず、届いた端末数だけを返す。

use std::sync::Arc;

use serde_json::Value;

use crate::{
    domain::{ConnectionId, MessagePusher, ServerEvent, UserId},
    infrastructure::store::ConnectionStore,
};

/// 信頼済みエンドポイントが更新するカウンターの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterKind {
    Notifications,
    Messages,
    FriendRequests,
}

impl CounterKind {
    fn into_event(self, count: u64) -> ServerEvent {
        match self {
            Self::Notifications => ServerEvent::NewNotificationCount { count },
            Self::Messages => ServerEvent::NewMessageCount { count },
            Self::FriendRequests => ServerEvent::NewFriendRequestCount { count },
        }
    }
}

/// 通知配信のユースケース
pub struct NotificationUseCase {
    connections: ConnectionStore,
    /// MessagePusher（メッセージ通知の抽象化）
    message_pusher: Arc<dyn MessagePusher>,
}

impl NotificationUseCase {
    pub fn new(connections: ConnectionStore, message_pusher: Arc<dyn MessagePusher>) -> Self {
        Self {
            connections,
            message_pusher,
        }
    }

    async fn deliver(&self, to: &UserId, event: &ServerEvent) -> usize {
        let registry = self.connections.lock().await;
        let devices = registry.resolve_devices(to);
        if devices.is_empty() {
            tracing::info!("User '{}' is unreachable, notification dropped", to);
            return 0;
        }
        self.message_pusher.broadcast(&devices, event).await
    }

    /// 種類付きの通知をユーザーの全端末へ届ける
    pub async fn notify(&self, to: &UserId, kind: String, payload: Value) -> usize {
        self.deliver(to, &ServerEvent::NewNotification { kind, payload })
            .await
    }

    /// 友達一覧の再取得を促す。宛先が無ければ全接続へ
    pub async fn update_friends(&self, to: Option<&UserId>) -> usize {
        let event = ServerEvent::UpdateFriends {};
        match to {
            Some(to) => self.deliver(to, &event).await,
            None => self.message_pusher.broadcast_all(&event).await,
        }
    }

    /// 未読メッセージ数を相手に届ける
    pub async fn unread_messages_count(
        &self,
        from: ConnectionId,
        to: &UserId,
        unread: u64,
    ) -> usize {
        let from_user_id = self.connections.lock().await.resolve_owner(&from);
        self.deliver(to, &ServerEvent::UnreadMessagesCount { from_user_id, unread })
            .await
    }

    /// 友達申請の件数を相手に届ける
    pub async fn new_friend_request(&self, to: &UserId, count: u64) -> usize {
        self.deliver(to, &ServerEvent::NewFriendRequest { count }).await
    }

    /// カウンターの新しい値を届ける
    pub async fn push_count(&self, to: &UserId, counter: CounterKind, count: u64) -> usize {
        tracing::debug!("Pushing {:?} count {} to '{}'", counter, count, to);
        self.deliver(to, &counter.into_event(count)).await
    }
}
