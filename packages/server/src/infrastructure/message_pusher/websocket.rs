//! WebSocket を使った MessagePusher 実装
//!
//! ## 責務
//!
//! - 接続ごとの `UnboundedSender` を管理
//! - `ServerEvent` を JSON に直列化して接続へ送信（push_to, broadcast）
//!
//! ## 設計ノート
//!
//! WebSocket の生成は UI 層（`ui/handler/websocket.rs`）で行われる。
//! この実装は生成された `UnboundedSender` を受け取り、送信だけを担当する。
//! 送信はチャンネルへの書き込みで完結するため、呼び出し側を待たせない。

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{ConnectionId, MessagePushError, MessagePusher, PusherChannel, ServerEvent};

/// WebSocket を使った MessagePusher 実装
#[derive(Default, Clone)]
pub struct WebSocketMessagePusher {
    /// 接続中の WebSocket sender
    channels: Arc<Mutex<HashMap<ConnectionId, PusherChannel>>>,
}

impl WebSocketMessagePusher {
    pub fn new() -> Self {
        Self::default()
    }

    fn encode(event: &ServerEvent) -> Result<String, MessagePushError> {
        serde_json::to_string(event).map_err(|e| MessagePushError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl MessagePusher for WebSocketMessagePusher {
    async fn register_connection(&self, connection: ConnectionId, sender: PusherChannel) {
        let mut channels = self.channels.lock().await;
        channels.insert(connection, sender);
        tracing::debug!("Connection '{}' registered to MessagePusher", connection);
    }

    async fn unregister_connection(&self, connection: &ConnectionId) {
        let mut channels = self.channels.lock().await;
        channels.remove(connection);
        tracing::debug!("Connection '{}' unregistered from MessagePusher", connection);
    }

    async fn push_to(
        &self,
        connection: &ConnectionId,
        event: &ServerEvent,
    ) -> Result<(), MessagePushError> {
        let content = Self::encode(event)?;
        let channels = self.channels.lock().await;

        let sender = channels
            .get(connection)
            .ok_or_else(|| MessagePushError::ConnectionNotFound(connection.to_string()))?;
        sender
            .send(content)
            .map_err(|e| MessagePushError::PushFailed(e.to_string()))?;
        tracing::debug!("Pushed event to connection '{}'", connection);
        Ok(())
    }

    async fn broadcast(&self, targets: &[ConnectionId], event: &ServerEvent) -> usize {
        let content = match Self::encode(event) {
            Ok(content) => content,
            Err(e) => {
                tracing::error!("{}", e);
                return 0;
            }
        };
        let channels = self.channels.lock().await;

        let mut delivered = 0;
        for target in targets {
            match channels.get(target) {
                // ブロードキャストでは一部の送信失敗を許容
                Some(sender) => match sender.send(content.clone()) {
                    Ok(()) => {
                        delivered += 1;
                        tracing::debug!("Broadcasted event to connection '{}'", target);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to push event to connection '{}': {}", target, e);
                    }
                },
                None => {
                    tracing::warn!(
                        "Connection '{}' not found during broadcast, skipping",
                        target
                    );
                }
            }
        }
        delivered
    }

    async fn broadcast_all(&self, event: &ServerEvent) -> usize {
        let content = match Self::encode(event) {
            Ok(content) => content,
            Err(e) => {
                tracing::error!("{}", e);
                return 0;
            }
        };
        let channels = self.channels.lock().await;

        channels
            .iter()
            .filter(|(connection, sender)| match sender.send(content.clone()) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("Failed to push event to connection '{}': {}", connection, e);
                    false
                }
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UserId;
    use serde_json::Value;
    use tokio::sync::mpsc;

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - push_to: 特定の接続への送信と JSON 形式
    // - broadcast: 複数接続への送信と届いた数
    // - broadcast_all: 登録済みの全接続への送信
    //
    // 【どのようなシナリオをテストするか】
    // 1. push_to の成功ケース
    // 2. push_to の失敗ケース（接続が存在しない）
    // 3. broadcast の部分失敗ケース（一部の接続が存在しない、受信側が閉じている）
    // 4. unregister 後は届かない
    // ========================================

    fn event() -> ServerEvent {
        ServerEvent::UserOffline {
            user_id: UserId::new("42".to_string()).unwrap(),
        }
    }

    async fn registered(
        pusher: &WebSocketMessagePusher,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = ConnectionId::generate();
        pusher.register_connection(connection, tx).await;
        (connection, rx)
    }

    #[tokio::test]
    async fn test_push_to_success() {
        // テスト項目: 特定の接続にイベントを JSON で送信できる
        // given (前提条件):
        let pusher = WebSocketMessagePusher::new();
        let (connection, mut rx) = registered(&pusher).await;

        // when (操作):
        let result = pusher.push_to(&connection, &event()).await;

        // then (期待する結果):
        assert!(result.is_ok());
        let received: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(received["event"], "user-offline");
        assert_eq!(received["data"]["userId"], "42");
    }

    #[tokio::test]
    async fn test_push_to_connection_not_found() {
        // テスト項目: 存在しない接続への送信はエラーを返す
        // given (前提条件):
        let pusher = WebSocketMessagePusher::new();

        // when (操作):
        let result = pusher.push_to(&ConnectionId::generate(), &event()).await;

        // then (期待する結果):
        assert!(matches!(
            result,
            Err(MessagePushError::ConnectionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_broadcast_partial_failure() {
        // テスト項目: 一部の接続が存在しない・閉じていても残りには届く
        // given (前提条件):
        let pusher = WebSocketMessagePusher::new();
        let (alive, mut alive_rx) = registered(&pusher).await;
        let (closed, closed_rx) = registered(&pusher).await;
        drop(closed_rx);
        let missing = ConnectionId::generate();

        // when (操作):
        let delivered = pusher.broadcast(&[alive, closed, missing], &event()).await;

        // then (期待する結果):
        assert_eq!(delivered, 1);
        assert!(alive_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_broadcast_empty_targets() {
        // テスト項目: 空のターゲットリストでもエラーにならない
        // given (前提条件):
        let pusher = WebSocketMessagePusher::new();

        // when (操作):
        let delivered = pusher.broadcast(&[], &event()).await;

        // then (期待する結果):
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_broadcast_all_reaches_every_connection() {
        // テスト項目: broadcast_all は登録済みの全接続に届く
        // given (前提条件):
        let pusher = WebSocketMessagePusher::new();
        let (_, mut rx1) = registered(&pusher).await;
        let (_, mut rx2) = registered(&pusher).await;

        // when (操作):
        let delivered = pusher.broadcast_all(&event()).await;

        // then (期待する結果):
        assert_eq!(delivered, 2);
        assert!(rx1.recv().await.is_some());
        assert!(rx2.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_unregistered_connection_receives_nothing() {
        // テスト項目: 登録解除した接続には送信されない
        // given (前提条件):
        let pusher = WebSocketMessagePusher::new();
        let (connection, _rx) = registered(&pusher).await;

        // when (操作):
        pusher.unregister_connection(&connection).await;
        let result = pusher.push_to(&connection, &event()).await;

        // then (期待する結果):
        assert!(result.is_err());
    }
}
