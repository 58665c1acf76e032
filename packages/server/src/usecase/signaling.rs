//! UseCase: シグナリングの中継
//!
//! offer / answer / ICE candidate のペイロードを解釈せず、宛先へ 1 ホップだけ転送する。
//! 宛先が見つからない場合は黙って捨てる（再送はしない）。

use std::sync::Arc;

use serde_json::Value;

use crate::{
    domain::{ConnectionId, MessagePusher, SignalKind, SignalTarget},
    infrastructure::store::ConnectionStore,
};

/// シグナリング中継のユースケース
pub struct SignalingUseCase {
    connections: ConnectionStore,
    /// MessagePusher（メッセージ通知の抽象化）
    message_pusher: Arc<dyn MessagePusher>,
}

impl SignalingUseCase {
    pub fn new(connections: ConnectionStore, message_pusher: Arc<dyn MessagePusher>) -> Self {
        Self {
            connections,
            message_pusher,
        }
    }

    /// 宛先へ転送する。届けられたかどうかを返す
    pub async fn relay(
        &self,
        from: ConnectionId,
        kind: SignalKind,
        target: SignalTarget,
        payload: Value,
    ) -> bool {
        let registry = self.connections.lock().await;
        let resolved = match &target {
            SignalTarget::Connection(connection) => {
                registry.is_attached(connection).then_some(*connection)
            }
            SignalTarget::User(user_id) => registry.resolve(user_id),
        };
        let Some(destination) = resolved else {
            tracing::debug!("Dropping {:?} from '{}': {:?} is unreachable", kind, from, target);
            return false;
        };

        let event = kind.into_event(payload, from, registry.resolve_owner(&from));
        match self.message_pusher.push_to(&destination, &event).await {
            Ok(()) => {
                tracing::debug!("Relayed {:?} from '{}' to '{}'", kind, from, destination);
                true
            }
            Err(e) => {
                tracing::warn!("Failed to relay {:?} to '{}': {}", kind, destination, e);
                false
            }
        }
    }
}
