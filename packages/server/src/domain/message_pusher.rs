//! MessagePusher trait 定義
//!
//! 接続へのイベント送信の抽象化。具体的な実装は Infrastructure 層が提供する。

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{error::MessagePushError, event::ServerEvent, value_object::ConnectionId};

/// 接続ごとの送信チャンネル（JSON テキストを流す）
pub type PusherChannel = mpsc::UnboundedSender<String>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessagePusher: Send + Sync {
    /// 接続の送信チャンネルを登録
    async fn register_connection(&self, connection: ConnectionId, sender: PusherChannel);

    /// 接続の送信チャンネルを削除
    async fn unregister_connection(&self, connection: &ConnectionId);

    /// 1 つの接続へ送信
    async fn push_to(
        &self,
        connection: &ConnectionId,
        event: &ServerEvent,
    ) -> Result<(), MessagePushError>;

    /// 複数の接続へ送信。届いた接続数を返す（一部の失敗は許容）
    async fn broadcast(&self, targets: &[ConnectionId], event: &ServerEvent) -> usize;

    /// 登録済みの全接続へ送信
    async fn broadcast_all(&self, event: &ServerEvent) -> usize;
}
