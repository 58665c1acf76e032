//! Infrastructure 層
//!
//! ドメイン層が定義する trait の具体的な実装と、外部とのデータ変換。

pub mod dto;
pub mod message_pusher;
pub mod store;
