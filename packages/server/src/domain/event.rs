//! クライアントへ送るイベント
//!
//! ワイヤ上では `{"event": "<kebab-case 名>", "data": {...}}` の JSON になる。

use serde::Serialize;
use serde_json::Value;

use super::{
    entity::{Member, RoomMessage},
    value_object::{ConnectionId, RoomId, UserId},
};

/// 通話が終了した理由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallEndReason {
    Hangup,
    Disconnected,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    Connected {
        connection_id: ConnectionId,
    },
    Registered {
        user_id: UserId,
        connection_id: ConnectionId,
    },

    // ルーム
    ExistingUsers {
        room_id: RoomId,
        users: Vec<Member>,
    },
    RoomHistory {
        room_id: RoomId,
        messages: Vec<RoomMessage>,
    },
    UserJoined {
        room_id: RoomId,
        user: Member,
    },
    UserLeft {
        room_id: RoomId,
        connection_id: ConnectionId,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<UserId>,
    },
    RoomMessage {
        room_id: RoomId,
        message: RoomMessage,
    },
    RoomParticipantCount {
        room_id: RoomId,
        count: usize,
    },
    RoomFull {
        room_id: RoomId,
        max: usize,
    },
    MicroUpdated {
        room_id: RoomId,
        connection_id: ConnectionId,
        micro_on: bool,
    },

    // シグナリング（ペイロードは解釈しない）
    Offer {
        offer: Value,
        from: ConnectionId,
        #[serde(skip_serializing_if = "Option::is_none")]
        from_user_id: Option<UserId>,
    },
    Answer {
        answer: Value,
        from: ConnectionId,
        #[serde(skip_serializing_if = "Option::is_none")]
        from_user_id: Option<UserId>,
    },
    IceCandidate {
        candidate: Value,
        from: ConnectionId,
        #[serde(skip_serializing_if = "Option::is_none")]
        from_user_id: Option<UserId>,
    },
    OfferLive {
        offer: Value,
        from: ConnectionId,
        #[serde(skip_serializing_if = "Option::is_none")]
        from_user_id: Option<UserId>,
    },
    AnswerLive {
        answer: Value,
        from: ConnectionId,
        #[serde(skip_serializing_if = "Option::is_none")]
        from_user_id: Option<UserId>,
    },
    IceCandidateLive {
        candidate: Value,
        from: ConnectionId,
        #[serde(skip_serializing_if = "Option::is_none")]
        from_user_id: Option<UserId>,
    },

    // 通話
    IncomingCall {
        call_id: u64,
        from_user_id: UserId,
        #[serde(skip_serializing_if = "Option::is_none")]
        from_user: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        call_type: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        room_id: Option<RoomId>,
    },
    CallAccepted {
        call_id: u64,
        by_user_id: UserId,
        #[serde(skip_serializing_if = "Option::is_none")]
        room_id: Option<RoomId>,
    },
    CallRejected {
        call_id: u64,
        by_user_id: UserId,
    },
    CallCancelled {
        call_id: u64,
        by_user_id: UserId,
    },
    CallEnded {
        call_id: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        by_user_id: Option<UserId>,
        reason: CallEndReason,
    },
    UserOffline {
        user_id: UserId,
    },
    UserBusy {
        user_id: UserId,
    },
    CallError {
        message: String,
    },

    // チャット
    ReceivePrivateMessage {
        msg_id: Value,
        sender: UserId,
        recipient: UserId,
        content: String,
        files: Vec<Value>,
        time: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reply_to: Option<Value>,
    },
    ReceiveFile {
        msg_id: Value,
        sender: UserId,
        recipient: UserId,
        file: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        time: String,
        preview: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        reply_to: Option<Value>,
    },
    MessageEdited {
        message_id: Value,
        content: String,
        by_user_id: UserId,
    },
    MessageDeleted {
        message_id: Value,
        by_user_id: UserId,
    },
    ConversationUpdated {
        user_id: UserId,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        time: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        read: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        typing: Option<bool>,
    },
    UserTyping {
        from_user_id: UserId,
    },
    UserStopTyping {
        from_user_id: UserId,
    },
    MessagesRead {
        by_user_id: UserId,
    },
    ReceiveBroadcastMessage {
        content: String,
        from: ConnectionId,
        #[serde(skip_serializing_if = "Option::is_none")]
        from_user_id: Option<UserId>,
        time: String,
    },
    /// 公開チャットの中継（中身は解釈しない）
    NewMessage(Value),

    // 通知
    NewNotification {
        #[serde(rename = "type")]
        kind: String,
        payload: Value,
    },
    UpdateFriends {},
    UnreadMessagesCount {
        #[serde(skip_serializing_if = "Option::is_none")]
        from_user_id: Option<UserId>,
        unread: u64,
    },
    NewNotificationCount {
        count: u64,
    },
    NewMessageCount {
        count: u64,
    },
    NewFriendRequestCount {
        count: u64,
    },
    NewFriendRequest {
        count: u64,
    },

    // ライブ配信
    LiveStarted {
        live_id: RoomId,
        owner_id: UserId,
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
        kind: Option<String>,
    },
    LiveEnded {
        live_id: RoomId,
    },
    LiveError {
        #[serde(skip_serializing_if = "Option::is_none")]
        live_id: Option<RoomId>,
        message: String,
    },
}
