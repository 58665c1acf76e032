//! HTTP API の DTO

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `GET /api/rooms` の要素
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummaryDto {
    pub id: String,
    pub kind: String,
    pub participant_count: usize,
    pub created_at: String,
}

/// ルーム参加者の詳細
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantDetailDto {
    pub connection_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub display_name: String,
    pub micro_on: bool,
    pub role: String,
    pub joined_at: String,
}

/// `GET /api/rooms/{room_id}` のレスポンス
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDetailDto {
    pub id: String,
    pub kind: String,
    pub participants: Vec<ParticipantDetailDto>,
    pub history_length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub pending_deletion: bool,
    pub created_at: String,
}

/// カウンター更新のリクエスト
///
/// `toUserId` の検証はハンドラで行う（欠落・空文字は 400）。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountRequest {
    pub to_user_id: Option<Value>,
    #[serde(default)]
    pub count: u64,
}

/// 任意の通知を届けるリクエスト
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyRequest {
    pub to_user_id: Option<Value>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

/// 信頼済みエンドポイントの応答（相手に届いたかどうかに関わらず 200）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryAck {
    pub status: String,
    pub delivered: usize,
}

impl DeliveryAck {
    pub fn ok(delivered: usize) -> Self {
        Self {
            status: "ok".to_string(),
            delivered,
        }
    }
}
