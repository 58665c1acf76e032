//! UseCase: ライブ配信
//!
//! 配信者（owner）が `live` 種別のルームを開き、視聴者が参加する。
//! 配信者が停止・退出・切断すると配信は終了し、ルームは削除される。
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - 開始・終了の通知が配信ルームの参加者にだけ届き、視聴者の参加で既存メンバーが返ること
//! - 存在しない配信への参加、配信者以外の停止が `live-error` になること
//! - 配信者の退出・切断で `live-ended` が届き、ルームが消えること

use std::sync::Arc;

use kizuna_shared::time::Clock;

use crate::{
    config::HubConfig,
    domain::{
        ConnectionId, JoinOutcome, LiveInfo, Member, MessagePusher, RoomError, RoomId,
        RoomKind, ServerEvent, Timestamp, UserProfile,
    },
    infrastructure::store::{ConnectionStore, RoomStore},
};

use super::{
    error::LiveError,
    room_session::{end_live_locked, leave_locked, publish_join},
};

/// ライブ配信のユースケース
pub struct LiveUseCase {
    connections: ConnectionStore,
    rooms: RoomStore,
    /// MessagePusher（メッセージ通知の抽象化）
    message_pusher: Arc<dyn MessagePusher>,
    clock: Arc<dyn Clock>,
    config: Arc<HubConfig>,
}

impl LiveUseCase {
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

    async fn reply_error(&self, connection: &ConnectionId, live_id: &RoomId, error: &LiveError) {
        let event = ServerEvent::LiveError {
            live_id: Some(live_id.clone()),
            message: error.to_string(),
        };
        if let Err(e) = self.message_pusher.push_to(connection, &event).await {
            tracing::warn!("Failed to send live-error to '{}': {}", connection, e);
        }
    }

    /// 配信を開始する（既にあれば参加する）
    pub async fn create(
        &self,
        connection: ConnectionId,
        live_id: RoomId,
        info: LiveInfo,
        profile: UserProfile,
    ) -> Result<JoinOutcome, LiveError> {
        let registry = self.connections.lock().await;
        let Some(owner) = registry.resolve_owner(&connection) else {
            self.reply_error(&connection, &live_id, &LiveError::NotRegistered)
                .await;
            return Err(LiveError::NotRegistered);
        };
        let now = self.now();
        let member = Member::new(connection, Some(owner.clone()), profile, true, now);

        let mut rooms = self.rooms.lock().await;
        let outcome = match rooms.open_live(
            live_id.clone(),
            owner.clone(),
            info.clone(),
            self.config.policy_for(RoomKind::Live),
            member,
            now,
        ) {
            Ok(outcome) => outcome,
            Err(e) => {
                let error = LiveError::from(e);
                self.reply_error(&connection, &live_id, &error).await;
                return Err(error);
            }
        };

        if outcome.created {
            tracing::info!("Live '{}' started by '{}'", live_id, owner);
            let started = ServerEvent::LiveStarted {
                live_id: live_id.clone(),
                owner_id: owner,
                title: info.title,
                kind: info.kind,
            };
            self.message_pusher
                .broadcast(&outcome.recipients, &started)
                .await;
        }
        publish_join(self.message_pusher.as_ref(), &outcome).await;
        Ok(outcome)
    }

    /// 既存の配信に視聴者として参加する
    pub async fn join(
        &self,
        connection: ConnectionId,
        live_id: RoomId,
        profile: UserProfile,
    ) -> Result<JoinOutcome, LiveError> {
        let registry = self.connections.lock().await;
        if !registry.is_attached(&connection) {
            return Err(RoomError::NotConnected.into());
        }
        let now = self.now();
        let member = Member::new(
            connection,
            registry.resolve_owner(&connection),
            profile,
            true,
            now,
        );

        let mut rooms = self.rooms.lock().await;
        match rooms.join_existing(live_id.clone(), RoomKind::Live, member, now) {
            Ok(outcome) => {
                tracing::info!(
                    "Connection '{}' is watching live '{}' ({} members)",
                    connection,
                    live_id,
                    outcome.participant_count
                );
                publish_join(self.message_pusher.as_ref(), &outcome).await;
                Ok(outcome)
            }
            Err(e) => {
                let error = LiveError::from(e);
                self.reply_error(&connection, &live_id, &error).await;
                Err(error)
            }
        }
    }

    /// 配信から退出する（配信者なら配信が終わる）
    pub async fn leave(&self, connection: ConnectionId, live_id: RoomId) -> bool {
        let mut rooms = self.rooms.lock().await;
        leave_locked(
            &mut rooms,
            &self.rooms,
            self.message_pusher.as_ref(),
            &live_id,
            &connection,
            self.now(),
        )
        .await
        .is_some()
    }

    /// 配信者が配信を停止する
    pub async fn stop(&self, connection: ConnectionId, live_id: RoomId) -> Result<(), LiveError> {
        let registry = self.connections.lock().await;
        let Some(user) = registry.resolve_owner(&connection) else {
            self.reply_error(&connection, &live_id, &LiveError::NotRegistered)
                .await;
            return Err(LiveError::NotRegistered);
        };

        let mut rooms = self.rooms.lock().await;
        let check = match rooms.get(&live_id) {
            Some(room) if room.kind == RoomKind::Live && room.owner.as_ref() == Some(&user) => {
                Ok(())
            }
            Some(_) => Err(RoomError::NotOwner(live_id.clone())),
            None => Err(RoomError::NotFound(live_id.clone())),
        };
        if let Err(e) = check {
            let error = LiveError::from(e);
            self.reply_error(&connection, &live_id, &error).await;
            return Err(error);
        }

        end_live_locked(
            &mut rooms,
            self.message_pusher.as_ref(),
            &live_id,
            &connection,
        )
        .await;
        Ok(())
    }
}
