//! Data Transfer Objects
//!
//! ワイヤ上の JSON 表現とドメインモデルの境界。
//!
//! - `websocket`: クライアントから届くイベント
//! - `http`: HTTP API のリクエスト/レスポンス
//! - `conversion`: ドメインモデル → DTO の変換

pub mod conversion;
pub mod http;
pub mod websocket;
