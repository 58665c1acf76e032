//! UseCase: 1:1 通話の発信・応答・拒否・取り消し・終了
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - 発信→応答で両者が in-call になり、切断で両者が free に戻ること
//! - オフライン・通話中の相手への発信が状態を変えずに拒否されること
//! - 応答されないまま呼び出し時間を過ぎた通話が解放されること
//!
//! ### どのような状況を想定しているか
//! - 正常系：発信、応答、拒否、取り消し、終了
//! - 異常系：相手がオフライン・通話中、未登録の接続からの操作
//! - エッジケース：呼び出しのタイムアウト

use std::{sync::Arc, time::Duration};

use crate::{
    domain::{
        CallBook, CallDetails, CallEndReason, CallError, CallPair, ConnectionId,
        ConnectionRegistry, MessagePusher, ServerEvent, UserId,
    },
    infrastructure::store::{CallStore, ConnectionStore},
};

/// ユーザーのプライマリ接続へ送る（オフラインなら捨てる）
async fn push_to_user(
    registry: &ConnectionRegistry,
    pusher: &dyn MessagePusher,
    user: &UserId,
    event: &ServerEvent,
) -> bool {
    let Some(connection) = registry.resolve(user) else {
        tracing::debug!("User '{}' is offline, dropping call event", user);
        return false;
    };
    match pusher.push_to(&connection, event).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Failed to push call event to '{}': {}", user, e);
            false
        }
    }
}

/// 接続で行っていた通話を解放し、相手に `call-ended` を送る
///
/// 接続ストアと通話ストアのロックを保持したまま呼ぶこと。
pub(crate) async fn release_call_locked(
    registry: &ConnectionRegistry,
    calls: &mut CallBook,
    pusher: &dyn MessagePusher,
    user: &UserId,
    connection: &ConnectionId,
    reason: CallEndReason,
) -> Option<CallPair> {
    let pair = calls.release(user, connection)?;
    let peer = pair.peer_of(user).clone();
    tracing::info!(
        "Call {} between '{}' and '{}' released ({:?})",
        pair.call_id,
        pair.caller,
        pair.callee,
        reason
    );
    let ended = ServerEvent::CallEnded {
        call_id: pair.call_id,
        by_user_id: Some(user.clone()),
        reason,
    };
    push_to_user(registry, pusher, &peer, &ended).await;
    Some(pair)
}

/// 通話のユースケース
pub struct CallUseCase {
    connections: ConnectionStore,
    calls: CallStore,
    /// MessagePusher（メッセージ通知の抽象化）
    message_pusher: Arc<dyn MessagePusher>,
    ring_timeout: Duration,
}

impl CallUseCase {
    pub fn new(
        connections: ConnectionStore,
        calls: CallStore,
        message_pusher: Arc<dyn MessagePusher>,
        ring_timeout: Duration,
    ) -> Self {
        Self {
            connections,
            calls,
            message_pusher,
            ring_timeout,
        }
    }

    async fn reply(&self, connection: &ConnectionId, event: &ServerEvent) {
        if let Err(e) = self.message_pusher.push_to(connection, event).await {
            tracing::warn!("Failed to reply to '{}': {}", connection, e);
        }
    }

    async fn reply_error(&self, connection: &ConnectionId, error: &CallError) {
        let event = match error {
            CallError::UserOffline(user_id) => ServerEvent::UserOffline {
                user_id: user_id.clone(),
            },
            CallError::UserBusy(user_id) => ServerEvent::UserBusy {
                user_id: user_id.clone(),
            },
            other => ServerEvent::CallError {
                message: other.to_string(),
            },
        };
        self.reply(connection, &event).await;
    }

    /// 発信する
    ///
    /// 相手がオフラインなら `user-offline`、通話中なら `user-busy` を発信者に返し、
    /// どちらの状態も変えない。
    pub async fn call_user(
        &self,
        connection: ConnectionId,
        callee: UserId,
        details: CallDetails,
    ) -> Result<u64, CallError> {
        let registry = self.connections.lock().await;
        let result = match registry.resolve_owner(&connection) {
            None => Err(CallError::NotRegistered),
            Some(caller) => match registry.resolve(&callee) {
                None => Err(CallError::UserOffline(callee.clone())),
                Some(callee_connection) => {
                    let mut calls = self.calls.lock().await;
                    calls
                        .ring(
                            caller.clone(),
                            connection,
                            callee.clone(),
                            callee_connection,
                            details.clone(),
                        )
                        .map(|call_id| (call_id, caller, callee_connection))
                }
            },
        };

        let (call_id, caller, callee_connection) = match result {
            Ok(ringing) => ringing,
            Err(e) => {
                tracing::info!("Call from '{}' to '{}' refused: {}", connection, callee, e);
                self.reply_error(&connection, &e).await;
                return Err(e);
            }
        };

        tracing::info!("Call {} ringing: '{}' -> '{}'", call_id, caller, callee);
        let incoming = ServerEvent::IncomingCall {
            call_id,
            from_user_id: caller,
            from_user: details.caller_info,
            call_type: details.call_type,
            room_id: details.room_id,
        };
        if let Err(e) = self.message_pusher.push_to(&callee_connection, &incoming).await {
            tracing::warn!("Failed to deliver incoming call to '{}': {}", callee, e);
        }
        self.spawn_ring_timeout(call_id);
        Ok(call_id)
    }

    fn spawn_ring_timeout(&self, call_id: u64) {
        let connections = self.connections.clone();
        let calls = self.calls.clone();
        let pusher = Arc::clone(&self.message_pusher);
        let timeout = self.ring_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let registry = connections.lock().await;
            let mut calls = calls.lock().await;
            let Some(pair) = calls.expire_ringing(call_id) else {
                return;
            };
            tracing::info!(
                "Call {} between '{}' and '{}' timed out",
                call_id,
                pair.caller,
                pair.callee
            );
            let ended = ServerEvent::CallEnded {
                call_id,
                by_user_id: None,
                reason: CallEndReason::Timeout,
            };
            for user in [&pair.caller, &pair.callee] {
                push_to_user(&registry, pusher.as_ref(), user, &ended).await;
            }
        });
    }

    /// 着信に応答する（`caller` は発信者）
    pub async fn accept(
        &self,
        connection: ConnectionId,
        caller: UserId,
    ) -> Result<CallPair, CallError> {
        let registry = self.connections.lock().await;
        let Some(callee) = registry.resolve_owner(&connection) else {
            self.reply_error(&connection, &CallError::NotRegistered).await;
            return Err(CallError::NotRegistered);
        };
        let mut calls = self.calls.lock().await;
        let pair = match calls.accept(&callee, connection, &caller) {
            Ok(pair) => pair,
            Err(e) => {
                self.reply_error(&connection, &e).await;
                return Err(e);
            }
        };
        tracing::info!("Call {} accepted by '{}'", pair.call_id, callee);

        let accepted = ServerEvent::CallAccepted {
            call_id: pair.call_id,
            by_user_id: callee,
            room_id: pair.details.room_id.clone(),
        };
        push_to_user(&registry, self.message_pusher.as_ref(), &caller, &accepted).await;
        Ok(pair)
    }

    /// 着信を拒否する（`caller` は発信者）
    pub async fn reject(
        &self,
        connection: ConnectionId,
        caller: UserId,
    ) -> Result<CallPair, CallError> {
        let registry = self.connections.lock().await;
        let Some(callee) = registry.resolve_owner(&connection) else {
            self.reply_error(&connection, &CallError::NotRegistered).await;
            return Err(CallError::NotRegistered);
        };
        let mut calls = self.calls.lock().await;
        let pair = match calls.reject(&callee, &caller) {
            Ok(pair) => pair,
            Err(e) => {
                self.reply_error(&connection, &e).await;
                return Err(e);
            }
        };
        tracing::info!("Call {} rejected by '{}'", pair.call_id, callee);

        let rejected = ServerEvent::CallRejected {
            call_id: pair.call_id,
            by_user_id: callee,
        };
        push_to_user(&registry, self.message_pusher.as_ref(), &caller, &rejected).await;
        Ok(pair)
    }

    /// 呼び出しを取り消す（`callee` は着信者）
    pub async fn cancel(
        &self,
        connection: ConnectionId,
        callee: UserId,
    ) -> Result<CallPair, CallError> {
        let registry = self.connections.lock().await;
        let Some(caller) = registry.resolve_owner(&connection) else {
            self.reply_error(&connection, &CallError::NotRegistered).await;
            return Err(CallError::NotRegistered);
        };
        let mut calls = self.calls.lock().await;
        let pair = match calls.cancel(&caller, &callee) {
            Ok(pair) => pair,
            Err(e) => {
                self.reply_error(&connection, &e).await;
                return Err(e);
            }
        };
        tracing::info!("Call {} cancelled by '{}'", pair.call_id, caller);

        let cancelled = ServerEvent::CallCancelled {
            call_id: pair.call_id,
            by_user_id: caller,
        };
        push_to_user(&registry, self.message_pusher.as_ref(), &callee, &cancelled).await;
        Ok(pair)
    }

    /// 通話を終了する（`peer` は相手）
    pub async fn end(&self, connection: ConnectionId, peer: UserId) -> Result<CallPair, CallError> {
        let registry = self.connections.lock().await;
        let Some(user) = registry.resolve_owner(&connection) else {
            self.reply_error(&connection, &CallError::NotRegistered).await;
            return Err(CallError::NotRegistered);
        };
        let mut calls = self.calls.lock().await;
        let pair = match calls.end(&user, &peer) {
            Ok(pair) => pair,
            Err(e) => {
                self.reply_error(&connection, &e).await;
                return Err(e);
            }
        };
        tracing::info!("Call {} ended by '{}'", pair.call_id, user);

        let ended = ServerEvent::CallEnded {
            call_id: pair.call_id,
            by_user_id: Some(user),
            reason: CallEndReason::Hangup,
        };
        push_to_user(&registry, self.message_pusher.as_ref(), &peer, &ended).await;
        Ok(pair)
    }
}
