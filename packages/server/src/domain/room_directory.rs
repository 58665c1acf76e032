//! ルームストア
//!
//! ルーム ID → ルーム集約のマップと、接続 → 参加中ルームの逆引きインデックスを
//! 同じ値の中で管理する。切断時の後始末は逆引きで参加ルームだけを辿る。

use std::{
    collections::{BTreeSet, HashMap},
    time::Duration,
};

use serde_json::Value;
use tokio::task::AbortHandle;

use super::{
    entity::{
        LiveInfo, Member, MessageKind, MessageSender, PendingDeletion, Room, RoomKind,
        RoomMessage, RoomPolicy,
    },
    error::RoomError,
    value_object::{ConnectionId, RoomId, Timestamp, UserId},
};

/// 参加処理の結果
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub room_id: RoomId,
    pub kind: RoomKind,
    pub member: Member,
    /// 参加前から居たメンバー（参加者はここからピア接続を張る）
    pub existing: Vec<Member>,
    /// 参加時点の履歴（参加通知のシステムメッセージは含まない）
    pub history: Vec<RoomMessage>,
    /// 履歴を持つルームで生成された参加通知
    pub announcement: Option<RoomMessage>,
    /// 参加者を含む全メンバー
    pub recipients: Vec<ConnectionId>,
    pub participant_count: usize,
    pub created: bool,
    /// 既に参加済みの接続が再度 join した
    pub rejoined: bool,
    pub retains_history: bool,
}

/// 空になったルームの扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomCleanup {
    /// まだメンバーが居る
    Occupied,
    /// 即座に削除した
    Removed,
    /// 猶予の後に削除する。`token` が一致する場合のみ削除される
    Scheduled { token: u64, delay: Duration },
}

/// 退出処理の結果
#[derive(Debug, Clone)]
pub struct LeaveOutcome {
    pub room_id: RoomId,
    pub kind: RoomKind,
    pub member: Member,
    pub announcement: Option<RoomMessage>,
    /// 残ったメンバー
    pub remaining: Vec<ConnectionId>,
    pub participant_count: usize,
    pub cleanup: RoomCleanup,
    /// ライブ配信の配信者が抜けた
    pub owner_left: bool,
}

/// ルームを閉じた結果
#[derive(Debug, Clone)]
pub struct ClosedRoom {
    pub room_id: RoomId,
    pub kind: RoomKind,
    pub recipients: Vec<ConnectionId>,
}

/// ルームストア本体
#[derive(Debug, Default)]
pub struct RoomDirectory {
    rooms: HashMap<RoomId, Room>,
    memberships: HashMap<ConnectionId, BTreeSet<RoomId>>,
    next_cleanup_token: u64,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, room_id: &RoomId) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// 接続が参加しているルーム
    pub fn rooms_of(&self, connection: &ConnectionId) -> Vec<RoomId> {
        self.memberships
            .get(connection)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// ルームに参加する（ルームが無ければ作る）
    pub fn join(
        &mut self,
        room_id: RoomId,
        kind: RoomKind,
        policy: RoomPolicy,
        member: Member,
        now: Timestamp,
    ) -> Result<JoinOutcome, RoomError> {
        let created = !self.rooms.contains_key(&room_id);
        if created {
            self.rooms.insert(
                room_id.clone(),
                Room::new(room_id.clone(), kind, policy, now),
            );
        }
        self.admit(room_id, kind, member, now, created)
    }

    /// 既存のルームにだけ参加する
    pub fn join_existing(
        &mut self,
        room_id: RoomId,
        kind: RoomKind,
        member: Member,
        now: Timestamp,
    ) -> Result<JoinOutcome, RoomError> {
        if !self.rooms.contains_key(&room_id) {
            return Err(RoomError::NotFound(room_id));
        }
        self.admit(room_id, kind, member, now, false)
    }

    /// ライブ配信を開始する（既にあれば配信者を変えずに参加する）
    pub fn open_live(
        &mut self,
        room_id: RoomId,
        owner: UserId,
        info: LiveInfo,
        policy: RoomPolicy,
        member: Member,
        now: Timestamp,
    ) -> Result<JoinOutcome, RoomError> {
        let created = !self.rooms.contains_key(&room_id);
        if created {
            let mut room = Room::new(room_id.clone(), RoomKind::Live, policy, now);
            room.owner = Some(owner);
            room.owner_connection = Some(member.connection);
            room.live = Some(info);
            self.rooms.insert(room_id.clone(), room);
        }
        self.admit(room_id, RoomKind::Live, member, now, created)
    }

    fn admit(
        &mut self,
        room_id: RoomId,
        kind: RoomKind,
        member: Member,
        now: Timestamp,
        created: bool,
    ) -> Result<JoinOutcome, RoomError> {
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;
        if room.kind != kind {
            return Err(RoomError::KindMismatch(room_id));
        }

        if let Some(existing) = room.member_mut(&member.connection) {
            existing.profile = member.profile;
            existing.micro_on = member.micro_on;
            let member = existing.clone();
            return Ok(JoinOutcome {
                room_id,
                kind,
                existing: room
                    .members()
                    .iter()
                    .filter(|m| m.connection != member.connection)
                    .cloned()
                    .collect(),
                history: room.history(),
                announcement: None,
                recipients: room.connections(),
                participant_count: room.member_count(),
                created,
                rejoined: true,
                retains_history: room.policy.retains_history(),
                member,
            });
        }

        let existing = room.members().to_vec();
        let history = room.history();
        let connection = member.connection;

        if let Err(error) = room.add_member(member) {
            if created && room.is_empty() {
                self.rooms.remove(&room_id);
            }
            return Err(error);
        }

        // 再参加で削除待ちを取り消す
        if let Some(pending) = room.pending_deletion.take() {
            pending.cancel();
        }

        let member = room
            .member(&connection)
            .cloned()
            .ok_or_else(|| RoomError::NotMember(room_id.clone()))?;

        let announcement = room.policy.retains_history().then(|| {
            room.record_message(
                MessageKind::System,
                format!("{} joined the room", member.profile.display_name()),
                Vec::new(),
                MessageSender {
                    connection,
                    user_id: member.user_id.clone(),
                    profile: member.profile.clone(),
                },
                now,
            )
        });

        let outcome = JoinOutcome {
            room_id: room_id.clone(),
            kind,
            member,
            existing,
            history,
            announcement,
            recipients: room.connections(),
            participant_count: room.member_count(),
            created,
            rejoined: false,
            retains_history: room.policy.retains_history(),
        };

        self.memberships
            .entry(connection)
            .or_default()
            .insert(room_id);

        Ok(outcome)
    }

    /// ルームから退出する
    ///
    /// ルームが無い、またはメンバーでない場合は何もしない。
    pub fn leave(
        &mut self,
        room_id: &RoomId,
        connection: &ConnectionId,
        now: Timestamp,
    ) -> Option<LeaveOutcome> {
        let room = self.rooms.get_mut(room_id)?;
        let member = room.remove_member(connection)?;

        if let Some(rooms) = self.memberships.get_mut(connection) {
            rooms.remove(room_id);
            if rooms.is_empty() {
                self.memberships.remove(connection);
            }
        }

        let owner_left = room.owner_connection.as_ref() == Some(connection);
        let announcement = room.policy.retains_history().then(|| {
            room.record_message(
                MessageKind::System,
                format!("{} left the room", member.profile.display_name()),
                Vec::new(),
                MessageSender {
                    connection: *connection,
                    user_id: member.user_id.clone(),
                    profile: member.profile.clone(),
                },
                now,
            )
        });

        let remaining = room.connections();
        let participant_count = room.member_count();
        let kind = room.kind;

        let cleanup = if !room.is_empty() {
            RoomCleanup::Occupied
        } else if let Some(delay) = room.policy.idle_cleanup {
            self.next_cleanup_token += 1;
            let token = self.next_cleanup_token;
            if let Some(previous) = room.pending_deletion.replace(PendingDeletion {
                token,
                abort: None,
            }) {
                previous.cancel();
            }
            RoomCleanup::Scheduled { token, delay }
        } else {
            self.rooms.remove(room_id);
            RoomCleanup::Removed
        };

        Some(LeaveOutcome {
            room_id: room_id.clone(),
            kind,
            member,
            announcement,
            remaining,
            participant_count,
            cleanup,
            owner_left,
        })
    }

    /// 削除タイマーのハンドルを紐付ける
    ///
    /// トークンが一致しない（既に再参加などで取り消された）場合は `false` を返す。
    pub fn arm_cleanup(&mut self, room_id: &RoomId, token: u64, abort: AbortHandle) -> bool {
        match self
            .rooms
            .get_mut(room_id)
            .and_then(|room| room.pending_deletion.as_mut())
        {
            Some(pending) if pending.token == token => {
                pending.abort = Some(abort);
                true
            }
            _ => false,
        }
    }

    /// 猶予の満了したルームを削除する
    ///
    /// 削除待ちのまま空であり、トークンが一致する場合だけ削除する。
    pub fn expire(&mut self, room_id: &RoomId, token: u64) -> bool {
        let expired = self.rooms.get(room_id).is_some_and(|room| {
            room.is_empty()
                && room
                    .pending_deletion
                    .as_ref()
                    .is_some_and(|pending| pending.token == token)
        });
        if expired {
            self.rooms.remove(room_id);
        }
        expired
    }

    /// マイク状態を更新する。メンバーでなければ `None`
    pub fn update_microphone(
        &mut self,
        room_id: &RoomId,
        connection: &ConnectionId,
        micro_on: bool,
    ) -> Option<Vec<ConnectionId>> {
        let room = self.rooms.get_mut(room_id)?;
        let member = room.member_mut(connection)?;
        member.micro_on = micro_on;
        Some(room.connections())
    }

    /// メンバーとしてルームにメッセージを投稿する
    pub fn post_message(
        &mut self,
        room_id: &RoomId,
        connection: &ConnectionId,
        text: String,
        attachments: Vec<Value>,
        now: Timestamp,
    ) -> Result<(RoomMessage, Vec<ConnectionId>), RoomError> {
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;
        let member = room
            .member(connection)
            .cloned()
            .ok_or_else(|| RoomError::NotMember(room_id.clone()))?;

        let message = room.record_message(
            MessageKind::User,
            text,
            attachments,
            MessageSender {
                connection: *connection,
                user_id: member.user_id,
                profile: member.profile,
            },
            now,
        );
        Ok((message, room.connections()))
    }

    /// ルームを閉じて全メンバーを外す
    pub fn close(&mut self, room_id: &RoomId) -> Option<ClosedRoom> {
        let mut room = self.rooms.remove(room_id)?;
        if let Some(pending) = room.pending_deletion.take() {
            pending.cancel();
        }
        let recipients = room.connections();
        for connection in &recipients {
            if let Some(rooms) = self.memberships.get_mut(connection) {
                rooms.remove(room_id);
                if rooms.is_empty() {
                    self.memberships.remove(connection);
                }
            }
        }
        Some(ClosedRoom {
            room_id: room.id,
            kind: room.kind,
            recipients,
        })
    }
}
