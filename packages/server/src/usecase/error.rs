//! UseCase 層のエラー定義

use thiserror::Error;

use crate::domain::RoomError;

/// チャット系ユースケースのエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("sender identity is unknown")]
    SenderUnknown,

    #[error("message has neither text nor attachments")]
    EmptyMessage,
}

/// ライブ配信のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LiveError {
    #[error("connection has no registered identity")]
    NotRegistered,

    #[error(transparent)]
    Room(#[from] RoomError),
}
