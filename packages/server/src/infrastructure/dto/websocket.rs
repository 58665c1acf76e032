//! WebSocket で受信するイベントの DTO
//!
//! `{"event": "<kebab-case 名>", "data": {...}}` 形式。識別子は受信時点で
//! Value Object として検証され、不正なイベントは丸ごと破棄される。

use serde::Deserialize;
use serde_json::Value;

use crate::domain::{ConnectionId, RoomId, RoomKind, SignalKind, SignalTarget, UserId, UserProfile};

/// `register-user` のデータ。`"42"` のような裸の ID も受け付ける
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RegisterUserPayload {
    Object {
        #[serde(rename = "userId")]
        user_id: UserId,
    },
    Bare(UserId),
}

impl RegisterUserPayload {
    pub fn into_user_id(self) -> UserId {
        match self {
            Self::Object { user_id } | Self::Bare(user_id) => user_id,
        }
    }
}

/// シグナリングのデータ
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalData {
    pub offer: Option<Value>,
    pub answer: Option<Value>,
    pub candidate: Option<Value>,
    /// 宛先の接続
    pub to: Option<ConnectionId>,
    /// 宛先のユーザー（`to` が無い場合に使う）
    pub to_user_id: Option<UserId>,
}

impl SignalData {
    /// 種類に対応するペイロードを取り出す
    pub fn take_payload(&mut self, kind: SignalKind) -> Option<Value> {
        match kind {
            SignalKind::Offer | SignalKind::OfferLive => self.offer.take(),
            SignalKind::Answer | SignalKind::AnswerLive => self.answer.take(),
            SignalKind::IceCandidate | SignalKind::IceCandidateLive => self.candidate.take(),
        }
    }

    pub fn target(&self) -> Option<SignalTarget> {
        self.to
            .map(SignalTarget::Connection)
            .or_else(|| self.to_user_id.clone().map(SignalTarget::User))
    }
}

/// クライアントから届くイベント
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    #[serde(alias = "join-user")]
    RegisterUser(RegisterUserPayload),

    JoinRoom {
        room_id: RoomId,
        #[serde(default)]
        user_info: UserProfile,
        micro_on: Option<bool>,
        #[serde(default)]
        kind: RoomKind,
    },
    LeaveRoom {
        room_id: RoomId,
    },
    UpdateMicro {
        room_id: RoomId,
        micro_on: bool,
    },
    RoomMessage {
        room_id: RoomId,
        message: Option<String>,
        #[serde(default)]
        files: Vec<Value>,
    },

    Offer(SignalData),
    Answer(SignalData),
    IceCandidate(SignalData),
    OfferLive(SignalData),
    AnswerLive(SignalData),
    IceCandidateLive(SignalData),

    CallUser {
        to_user_id: UserId,
        call_type: Option<String>,
        room_id: Option<RoomId>,
        from_user: Option<Value>,
    },
    AcceptCall {
        from_user_id: UserId,
    },
    RejectCall {
        from_user_id: UserId,
    },
    CancelCall {
        to_user_id: UserId,
    },
    EndCall {
        user_id: UserId,
    },

    SendPrivateMessage {
        to_user_id: UserId,
        from_user_id: Option<UserId>,
        message: Option<String>,
        #[serde(default)]
        files: Vec<Value>,
        msg_id: Option<Value>,
        reply_to: Option<Value>,
    },
    SendFile {
        to_user_id: UserId,
        from_user_id: Option<UserId>,
        file: Value,
        file_name: Option<String>,
        mime_type: Option<String>,
        msg_id: Option<Value>,
        #[serde(default)]
        preview: bool,
        reply_to: Option<Value>,
    },
    EditMessage {
        to_user_id: UserId,
        message_id: Value,
        content: String,
    },
    DeleteMessage {
        to_user_id: UserId,
        message_id: Value,
    },
    Typing {
        to_user_id: UserId,
    },
    StopTyping {
        to_user_id: UserId,
    },
    MarkMessagesRead {
        to_user_id: UserId,
    },
    BroadcastMessage {
        content: String,
    },
    /// 公開チャット。中身は解釈せずに他の全接続へ中継する
    NewMessage(Value),

    NewNotification {
        to_user_id: UserId,
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        payload: Value,
    },
    UpdateFriends {
        to_user_id: Option<UserId>,
    },
    UnreadMessagesCount {
        to_user_id: UserId,
        unread: u64,
    },
    NewFriendRequest {
        to_user_id: UserId,
        count: u64,
    },

    LiveCreate {
        live_id: RoomId,
        title: Option<String>,
        #[serde(rename = "type")]
        kind: Option<String>,
        #[serde(default)]
        user_info: UserProfile,
    },
    JoinLive {
        live_id: RoomId,
        #[serde(default)]
        user_info: UserProfile,
    },
    LeaveLive {
        live_id: RoomId,
    },
    LiveStop {
        live_id: RoomId,
    },
}

impl ClientEvent {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
