//! UseCase 層
//!
//! 各ユースケースはストアのロックを決められた順序（接続 → ルーム → 通話）で取得し、
//! 状態の変更と通知をロックの内側で行う。ルーム内の配信順は変更の適用順と一致する。

pub mod call;
pub mod chat;
pub mod connection;
pub mod disconnect;
pub mod error;
pub mod live;
pub mod notification;
pub mod room_query;
pub mod room_session;
pub mod signaling;

#[cfg(test)]
pub(crate) mod test_support;

pub use call::CallUseCase;
pub use chat::{ChatUseCase, Delivery, FileMessage, PrivateMessage};
pub use connection::ConnectUseCase;
pub use disconnect::{DisconnectReport, DisconnectUseCase};
pub use error::{ChatError, LiveError};
pub use live::LiveUseCase;
pub use notification::{CounterKind, NotificationUseCase};
pub use room_query::RoomQueryUseCase;
pub use room_session::RoomSessionUseCase;
pub use signaling::SignalingUseCase;
