//! ドメイン層のエラー定義

use thiserror::Error;

use super::value_object::{RoomId, UserId};

/// Value Object の生成エラー（入力検証エラー）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueObjectError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{kind} must be at most {max} bytes")]
    TooLong { kind: &'static str, max: usize },

    #[error("{0} is malformed")]
    Malformed(&'static str),
}

/// ルーム操作のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("room '{room_id}' is full (max {max})")]
    RoomFull { room_id: RoomId, max: usize },

    #[error("room '{0}' not found")]
    NotFound(RoomId),

    #[error("connection is not a member of room '{0}'")]
    NotMember(RoomId),

    #[error("room '{0}' exists with a different kind")]
    KindMismatch(RoomId),

    #[error("only the owner can close room '{0}'")]
    NotOwner(RoomId),

    #[error("connection is not attached")]
    NotConnected,
}

/// 通話ステートマシンのエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("user '{0}' is offline")]
    UserOffline(UserId),

    #[error("user '{0}' is busy")]
    UserBusy(UserId),

    #[error("caller is already in a call")]
    AlreadyInCall,

    #[error("cannot call yourself")]
    SelfCall,

    #[error("no pending call with '{0}'")]
    NoPendingCall(UserId),

    #[error("connection has no registered identity")]
    NotRegistered,
}

/// メッセージ送信のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessagePushError {
    #[error("connection '{0}' not found")]
    ConnectionNotFound(String),

    #[error("failed to push message: {0}")]
    PushFailed(String),

    #[error("failed to serialize event: {0}")]
    Serialization(String),
}

/// 接続レジストリのエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("connection '{0}' is not attached")]
    NotAttached(String),
}
