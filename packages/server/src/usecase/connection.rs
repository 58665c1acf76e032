//! UseCase: 接続の受け入れとユーザー登録
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - 接続時に ConnectionId が払い出され、`connected` が届くこと
//! - ユーザー登録（後勝ち）と `registered` の応答
//! - 接続を別ユーザーで登録し直したとき、旧ユーザーの通話が解放されること

use std::sync::Arc;

use crate::{
    domain::{
        CallEndReason, ConnectionId, MessagePusher, PusherChannel, Registration, RegistryError,
        ServerEvent, UserId,
    },
    infrastructure::store::{CallStore, ConnectionStore},
};

use super::call::release_call_locked;

/// 接続受け入れ・ユーザー登録のユースケース
pub struct ConnectUseCase {
    connections: ConnectionStore,
    calls: CallStore,
    /// MessagePusher（メッセージ通知の抽象化）
    message_pusher: Arc<dyn MessagePusher>,
}

impl ConnectUseCase {
    pub fn new(
        connections: ConnectionStore,
        calls: CallStore,
        message_pusher: Arc<dyn MessagePusher>,
    ) -> Self {
        Self {
            connections,
            calls,
            message_pusher,
        }
    }

    /// 新しい接続を受け入れる
    ///
    /// # Returns
    ///
    /// 払い出した `ConnectionId`。以降この接続へのイベントは `sender` に流れる。
    pub async fn connect(&self, sender: PusherChannel) -> ConnectionId {
        let connection = ConnectionId::generate();

        let mut registry = self.connections.lock().await;
        registry.attach(connection);
        self.message_pusher
            .register_connection(connection, sender)
            .await;

        let connected = ServerEvent::Connected {
            connection_id: connection,
        };
        if let Err(e) = self.message_pusher.push_to(&connection, &connected).await {
            tracing::warn!("Failed to send connected to '{}': {}", connection, e);
        }
        tracing::info!(
            "Connection '{}' attached ({} online)",
            connection,
            registry.attached_count()
        );
        connection
    }

    /// 接続にユーザーを紐付ける（同じユーザーの後の登録が優先される）
    pub async fn register(
        &self,
        connection: ConnectionId,
        user_id: UserId,
    ) -> Result<Registration, RegistryError> {
        let mut registry = self.connections.lock().await;
        let registration = registry.register(user_id.clone(), connection)?;

        if let Some(previous) = &registration.previous_identity {
            tracing::info!(
                "Connection '{}' switched identity from '{}' to '{}'",
                connection,
                previous,
                user_id
            );
            let mut calls = self.calls.lock().await;
            release_call_locked(
                &registry,
                &mut calls,
                self.message_pusher.as_ref(),
                previous,
                &connection,
                CallEndReason::Disconnected,
            )
            .await;
        }
        if let Some(displaced) = &registration.displaced_primary {
            tracing::debug!(
                "User '{}' primary connection moved from '{}' to '{}'",
                user_id,
                displaced,
                connection
            );
        }
        tracing::info!("User '{}' registered on '{}'", user_id, connection);

        let registered = ServerEvent::Registered {
            user_id,
            connection_id: connection,
        };
        if let Err(e) = self.message_pusher.push_to(&connection, &registered).await {
            tracing::warn!("Failed to send registered to '{}': {}", connection, e);
        }
        Ok(registration)
    }
}
