//! Entity 定義
//!
//! ルーム・メンバー・メッセージなど、ライフサイクルを持つドメインオブジェクト。

use std::{collections::VecDeque, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::task::AbortHandle;

use super::{
    error::RoomError,
    value_object::{ConnectionId, RoomId, Timestamp, UserId},
};

/// 表示名が無いときに使うラベル
const FALLBACK_DISPLAY_NAME: &str = "User";

/// クライアントが送ってくる表示用のプロフィール
///
/// 既知のフィールド以外もそのまま保持し、他の参加者へ転送する。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserProfile {
    pub fn display_name(&self) -> &str {
        self.first_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(FALLBACK_DISPLAY_NAME)
    }
}

/// ルーム内での役割
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    /// ルームを作成した（最初に参加した）メンバー
    Creator,
    Participant,
}

/// ルームのメンバー（接続単位）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    #[serde(rename = "connectionId")]
    pub connection: ConnectionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub profile: UserProfile,
    pub micro_on: bool,
    pub role: MemberRole,
    pub joined_at: Timestamp,
}

impl Member {
    pub fn new(
        connection: ConnectionId,
        user_id: Option<UserId>,
        profile: UserProfile,
        micro_on: bool,
        joined_at: Timestamp,
    ) -> Self {
        Self {
            connection,
            user_id,
            profile,
            micro_on,
            role: MemberRole::Participant,
            joined_at,
        }
    }
}

/// ルームメッセージの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    System,
    User,
}

/// メッセージの送信者
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSender {
    #[serde(rename = "connectionId")]
    pub connection: ConnectionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub profile: UserProfile,
}

/// ルームに流れるメッセージ（履歴として遅れて参加したメンバーに再生される）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMessage {
    /// ルーム内で単調増加する連番
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub text: String,
    pub attachments: Vec<Value>,
    pub sender: MessageSender,
    pub created_at: Timestamp,
}

/// ルームの種類
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    /// 多人数のボイス/ビデオ会議とチャット
    #[default]
    Conference,
    /// 1:1 通話用の一時的なルーム
    Call,
    /// 配信者と視聴者のライブ配信
    Live,
}

/// ルーム種別ごとの運用ポリシー
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoomPolicy {
    /// 同時参加数の上限
    pub capacity: Option<usize>,
    /// 空になってから削除するまでの猶予。`None` なら即削除
    pub idle_cleanup: Option<Duration>,
    /// 保持する履歴の件数。`None` または 0 なら履歴を持たない
    pub history_limit: Option<usize>,
}

impl RoomPolicy {
    pub fn retains_history(&self) -> bool {
        self.history_limit.is_some_and(|limit| limit > 0)
    }
}

/// ライブ配信の付帯情報
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveInfo {
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// 削除待ちのタイマー
#[derive(Debug)]
pub(crate) struct PendingDeletion {
    pub(crate) token: u64,
    pub(crate) abort: Option<AbortHandle>,
}

impl PendingDeletion {
    pub(crate) fn cancel(self) {
        if let Some(abort) = self.abort {
            abort.abort();
        }
    }
}

/// ルーム集約
#[derive(Debug)]
pub struct Room {
    pub id: RoomId,
    pub kind: RoomKind,
    pub policy: RoomPolicy,
    pub created_at: Timestamp,
    /// ライブ配信の配信者
    pub owner: Option<UserId>,
    pub owner_connection: Option<ConnectionId>,
    pub live: Option<LiveInfo>,
    members: Vec<Member>,
    history: VecDeque<RoomMessage>,
    next_message_id: u64,
    pub(crate) pending_deletion: Option<PendingDeletion>,
}

impl Room {
    pub fn new(id: RoomId, kind: RoomKind, policy: RoomPolicy, created_at: Timestamp) -> Self {
        Self {
            id,
            kind,
            policy,
            created_at,
            owner: None,
            owner_connection: None,
            live: None,
            members: Vec::new(),
            history: VecDeque::new(),
            next_message_id: 1,
            pending_deletion: None,
        }
    }

    /// 参加順のメンバー一覧
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn member(&self, connection: &ConnectionId) -> Option<&Member> {
        self.members.iter().find(|m| &m.connection == connection)
    }

    pub fn contains(&self, connection: &ConnectionId) -> bool {
        self.member(connection).is_some()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_pending_deletion(&self) -> bool {
        self.pending_deletion.is_some()
    }

    pub fn connections(&self) -> Vec<ConnectionId> {
        self.members.iter().map(|m| m.connection).collect()
    }

    pub fn history(&self) -> Vec<RoomMessage> {
        self.history.iter().cloned().collect()
    }

    /// メンバーを追加する
    ///
    /// 上限は追加前に判定するため、一時的にも上限を超えることはない。
    pub(crate) fn add_member(&mut self, mut member: Member) -> Result<(), RoomError> {
        if let Some(max) = self.policy.capacity
            && self.members.len() >= max
        {
            return Err(RoomError::RoomFull {
                room_id: self.id.clone(),
                max,
            });
        }
        if self.members.is_empty() {
            member.role = MemberRole::Creator;
        }
        self.members.push(member);
        Ok(())
    }

    pub(crate) fn remove_member(&mut self, connection: &ConnectionId) -> Option<Member> {
        let index = self
            .members
            .iter()
            .position(|m| &m.connection == connection)?;
        Some(self.members.remove(index))
    }

    pub(crate) fn member_mut(&mut self, connection: &ConnectionId) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| &m.connection == connection)
    }

    /// メッセージを作成し、履歴を持つルームなら履歴に追加する
    ///
    /// 履歴は `history_limit` 件のリングバッファ。
    pub(crate) fn record_message(
        &mut self,
        kind: MessageKind,
        text: String,
        attachments: Vec<Value>,
        sender: MessageSender,
        created_at: Timestamp,
    ) -> RoomMessage {
        let message = RoomMessage {
            id: self.next_message_id,
            kind,
            text,
            attachments,
            sender,
            created_at,
        };
        self.next_message_id += 1;

        if let Some(limit) = self.policy.history_limit
            && limit > 0
        {
            while self.history.len() >= limit {
                self.history.pop_front();
            }
            self.history.push_back(message.clone());
        }

        message
    }
}
