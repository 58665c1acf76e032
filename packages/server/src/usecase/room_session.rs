//! UseCase: ルームの参加・退出・マイク更新・ルームメッセージ
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - 参加時に既存メンバー・履歴が参加者へ、参加通知と人数が全員へ届くこと
//! - 上限に達したルームへの参加が RoomFull で拒否されること
//! - 退出・切断で空になったルームが猶予の後に削除され、猶予内の再参加で削除が取り消されること
//!
//! ### どのような状況を想定しているか
//! - 正常系：参加、退出、マイク更新、メッセージ送信
//! - 異常系：満員、未接続、非メンバーの操作
//! - エッジケース：削除待ちのルームへの再参加

use std::sync::Arc;

use kizuna_shared::time::Clock;

use crate::{
    config::HubConfig,
    domain::{
        ConnectionId, JoinOutcome, LeaveOutcome, Member, MessagePusher, RoomCleanup,
        RoomDirectory, RoomError, RoomId, RoomKind, RoomMessage, ServerEvent, Timestamp,
        UserProfile,
    },
    infrastructure::store::{ConnectionStore, RoomStore},
};

/// 参加が成立した後の通知
///
/// - 参加者へ: 既存メンバー一覧、（履歴を持つルームなら）履歴
/// - 他のメンバーへ: 参加通知
/// - 全員へ: 参加のシステムメッセージ、人数
pub(crate) async fn publish_join(pusher: &dyn MessagePusher, outcome: &JoinOutcome) {
    let joiner = outcome.member.connection;

    let existing = ServerEvent::ExistingUsers {
        room_id: outcome.room_id.clone(),
        users: outcome.existing.clone(),
    };
    if let Err(e) = pusher.push_to(&joiner, &existing).await {
        tracing::warn!("Failed to send existing users to '{}': {}", joiner, e);
    }

    if outcome.retains_history {
        let history = ServerEvent::RoomHistory {
            room_id: outcome.room_id.clone(),
            messages: outcome.history.clone(),
        };
        if let Err(e) = pusher.push_to(&joiner, &history).await {
            tracing::warn!("Failed to send room history to '{}': {}", joiner, e);
        }
    }

    if !outcome.rejoined {
        let others: Vec<ConnectionId> = outcome
            .recipients
            .iter()
            .filter(|c| **c != joiner)
            .copied()
            .collect();
        let joined = ServerEvent::UserJoined {
            room_id: outcome.room_id.clone(),
            user: outcome.member.clone(),
        };
        pusher.broadcast(&others, &joined).await;
    }

    if let Some(announcement) = &outcome.announcement {
        let message = ServerEvent::RoomMessage {
            room_id: outcome.room_id.clone(),
            message: announcement.clone(),
        };
        pusher.broadcast(&outcome.recipients, &message).await;
    }

    let count = ServerEvent::RoomParticipantCount {
        room_id: outcome.room_id.clone(),
        count: outcome.participant_count,
    };
    pusher.broadcast(&outcome.recipients, &count).await;
}

/// ライブ配信のルームを閉じ、`live-ended` の宛先を返す
///
/// 宛先は閉じた時点の視聴者と、終了のきっかけになった配信者の接続。
/// 最後のメンバーが抜けてルームが既に消えている場合は配信者の接続だけになる。
fn close_live(
    rooms: &mut RoomDirectory,
    live_id: &RoomId,
    owner_connection: &ConnectionId,
) -> Vec<ConnectionId> {
    let mut recipients = match rooms.close(live_id) {
        Some(closed) => {
            tracing::info!(
                "Live '{}' ended ({} viewers released)",
                closed.room_id,
                closed.recipients.len()
            );
            closed.recipients
        }
        None => {
            tracing::info!("Live '{}' ended", live_id);
            Vec::new()
        }
    };
    if !recipients.contains(owner_connection) {
        recipients.push(*owner_connection);
    }
    recipients
}

/// ライブ配信を終了し、配信ルームの参加者へ通知する
pub(crate) async fn end_live_locked(
    rooms: &mut RoomDirectory,
    pusher: &dyn MessagePusher,
    live_id: &RoomId,
    owner_connection: &ConnectionId,
) {
    let recipients = close_live(rooms, live_id, owner_connection);
    let ended = ServerEvent::LiveEnded {
        live_id: live_id.clone(),
    };
    pusher.broadcast(&recipients, &ended).await;
}

/// 空になったルームの削除タイマーを仕掛ける
///
/// ルームストアのロックを保持したまま呼ぶこと。タイマーはロックを取り直してから
/// トークンを照合するため、再参加で取り消された削除は実行されない。
pub(crate) fn schedule_cleanup(
    rooms: &mut RoomDirectory,
    store: &RoomStore,
    room_id: &RoomId,
    token: u64,
    delay: std::time::Duration,
) {
    let store = store.clone();
    let target = room_id.clone();
    let handle = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let mut rooms = store.lock().await;
        if rooms.expire(&target, token) {
            tracing::info!("Room '{}' deleted after idle grace period", target);
        }
    });
    if !rooms.arm_cleanup(room_id, token, handle.abort_handle()) {
        handle.abort();
    }
}

/// ルームから退出させ、残りのメンバーへ通知する
///
/// ルームストアのロックを保持したまま呼ぶこと。メンバーでなければ何もしない。
pub(crate) async fn leave_locked(
    rooms: &mut RoomDirectory,
    store: &RoomStore,
    pusher: &dyn MessagePusher,
    room_id: &RoomId,
    connection: &ConnectionId,
    now: Timestamp,
) -> Option<LeaveOutcome> {
    let outcome = rooms.leave(room_id, connection, now)?;
    tracing::info!(
        "Connection '{}' left room '{}' ({} remaining)",
        connection,
        room_id,
        outcome.participant_count
    );

    // 状態の変更は最初の await より前に終える（呼び出し元は通知の途中で中断されうる）
    match outcome.cleanup {
        RoomCleanup::Occupied => {}
        RoomCleanup::Removed => tracing::info!("Room '{}' deleted", room_id),
        RoomCleanup::Scheduled { token, delay } => {
            tracing::info!(
                "Room '{}' is empty, deleting in {}s unless someone rejoins",
                room_id,
                delay.as_secs()
            );
            schedule_cleanup(rooms, store, room_id, token, delay);
        }
    }
    let live_ended = if outcome.owner_left && outcome.kind == RoomKind::Live {
        Some(close_live(rooms, room_id, connection))
    } else {
        None
    };

    let left = ServerEvent::UserLeft {
        room_id: room_id.clone(),
        connection_id: *connection,
        user_id: outcome.member.user_id.clone(),
    };
    pusher.broadcast(&outcome.remaining, &left).await;

    if let Some(announcement) = &outcome.announcement {
        let message = ServerEvent::RoomMessage {
            room_id: room_id.clone(),
            message: announcement.clone(),
        };
        pusher.broadcast(&outcome.remaining, &message).await;
    }

    let count = ServerEvent::RoomParticipantCount {
        room_id: room_id.clone(),
        count: outcome.participant_count,
    };
    pusher.broadcast(&outcome.remaining, &count).await;

    if let Some(recipients) = live_ended {
        let ended = ServerEvent::LiveEnded {
            live_id: room_id.clone(),
        };
        pusher.broadcast(&recipients, &ended).await;
    }

    Some(outcome)
}

/// ルームセッションのユースケース
pub struct RoomSessionUseCase {
    connections: ConnectionStore,
    rooms: RoomStore,
    /// MessagePusher（メッセージ通知の抽象化）
    message_pusher: Arc<dyn MessagePusher>,
    clock: Arc<dyn Clock>,
    config: Arc<HubConfig>,
}

impl RoomSessionUseCase {
    pub fn new(
        connections: ConnectionStore,
        rooms: RoomStore,
        message_pusher: Arc<dyn MessagePusher>,
        clock: Arc<dyn Clock>,
        config: Arc<HubConfig>,
    ) -> Self {
        Self {
            connections,
            rooms,
            message_pusher,
            clock,
            config,
        }
    }

    fn now(&self) -> Timestamp {
        Timestamp::new(self.clock.now_millis())
    }

    /// ルームに参加する
    ///
    /// 満員の場合は参加者に `room-full` を送り、`RoomError::RoomFull` を返す。
    pub async fn join(
        &self,
        connection: ConnectionId,
        room_id: RoomId,
        kind: RoomKind,
        profile: UserProfile,
        micro_on: bool,
    ) -> Result<JoinOutcome, RoomError> {
        if kind == RoomKind::Live {
            return Err(RoomError::KindMismatch(room_id));
        }

        let registry = self.connections.lock().await;
        if !registry.is_attached(&connection) {
            return Err(RoomError::NotConnected);
        }
        let now = self.now();
        let member = Member::new(
            connection,
            registry.resolve_owner(&connection),
            profile,
            micro_on,
            now,
        );

        let mut rooms = self.rooms.lock().await;
        let policy = self.config.policy_for(kind);
        match rooms.join(room_id, kind, policy, member, now) {
            Ok(outcome) => {
                tracing::info!(
                    "Connection '{}' joined room '{}' ({} members)",
                    connection,
                    outcome.room_id,
                    outcome.participant_count
                );
                publish_join(self.message_pusher.as_ref(), &outcome).await;
                Ok(outcome)
            }
            Err(RoomError::RoomFull { room_id, max }) => {
                tracing::warn!("Room '{}' is full, rejecting '{}'", room_id, connection);
                let full = ServerEvent::RoomFull {
                    room_id: room_id.clone(),
                    max,
                };
                if let Err(e) = self.message_pusher.push_to(&connection, &full).await {
                    tracing::warn!("Failed to send room-full to '{}': {}", connection, e);
                }
                Err(RoomError::RoomFull { room_id, max })
            }
            Err(e) => {
                tracing::warn!("Connection '{}' could not join: {}", connection, e);
                Err(e)
            }
        }
    }

    /// ルームから退出する（メンバーでなければ何もしない）
    pub async fn leave(&self, connection: ConnectionId, room_id: RoomId) -> Option<LeaveOutcome> {
        let mut rooms = self.rooms.lock().await;
        leave_locked(
            &mut rooms,
            &self.rooms,
            self.message_pusher.as_ref(),
            &room_id,
            &connection,
            self.now(),
        )
        .await
    }

    /// マイク状態を更新してルームに通知する
    pub async fn update_microphone(
        &self,
        connection: ConnectionId,
        room_id: RoomId,
        micro_on: bool,
    ) -> bool {
        let mut rooms = self.rooms.lock().await;
        let Some(recipients) = rooms.update_microphone(&room_id, &connection, micro_on) else {
            tracing::debug!(
                "Ignoring micro update from non-member '{}' in '{}'",
                connection,
                room_id
            );
            return false;
        };
        let event = ServerEvent::MicroUpdated {
            room_id,
            connection_id: connection,
            micro_on,
        };
        self.message_pusher.broadcast(&recipients, &event).await;
        true
    }

    /// ルームにメッセージを投稿し、全メンバーへ配信する
    pub async fn send_message(
        &self,
        connection: ConnectionId,
        room_id: RoomId,
        text: String,
        attachments: Vec<serde_json::Value>,
    ) -> Result<RoomMessage, RoomError> {
        let mut rooms = self.rooms.lock().await;
        let (message, recipients) =
            rooms.post_message(&room_id, &connection, text, attachments, self.now())?;
        let event = ServerEvent::RoomMessage {
            room_id,
            message: message.clone(),
        };
        self.message_pusher.broadcast(&recipients, &event).await;
        Ok(message)
    }
}
