//! Request handlers.

mod http;
mod websocket;

pub use http::{
    get_room_detail, get_rooms, health_check, notify, post_friend_request_count,
    post_message_count, post_notification_count,
};
pub use websocket::websocket_handler;
