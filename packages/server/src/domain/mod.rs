//! ドメイン層
//!
//! 接続レジストリ・ルームストア・通話ステートマシンの純粋な集約と、
//! それらが使う Value Object / Entity / イベント / trait を定義する。

pub mod call;
pub mod entity;
pub mod error;
pub mod event;
pub mod message_pusher;
pub mod registry;
pub mod room_directory;
pub mod signal;
pub mod value_object;

pub use call::{CallBook, CallDetails, CallPair, CallRole, CallSlot, CallState};
pub use entity::{
    LiveInfo, Member, MemberRole, MessageKind, MessageSender, Room, RoomKind, RoomMessage,
    RoomPolicy, UserProfile,
};
pub use error::{CallError, MessagePushError, RegistryError, RoomError, ValueObjectError};
pub use event::{CallEndReason, ServerEvent};
pub use message_pusher::{MessagePusher, PusherChannel};
pub use registry::{ConnectionRegistry, Registration};
pub use room_directory::{ClosedRoom, JoinOutcome, LeaveOutcome, RoomCleanup, RoomDirectory};
pub use signal::{SignalKind, SignalTarget};
pub use value_object::{ConnectionId, RoomId, Timestamp, UserId};

#[cfg(test)]
pub use message_pusher::MockMessagePusher;
