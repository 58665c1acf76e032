//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::{
    domain::{RoomError, RoomId, UserId},
    infrastructure::dto::http::{
        CountRequest, DeliveryAck, NotifyRequest, RoomDetailDto, RoomSummaryDto,
    },
    ui::state::AppState,
    usecase::CounterKind,
};

/// 共有鍵を受け取るヘッダー
const API_KEY_HEADER: &str = "x-api-key";

/// HTTP API のエラー
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("forbidden")]
    Forbidden,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        };
        let body = Json(serde_json::json!({
            "status": "error",
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

/// `?key=` クエリ
#[derive(Debug, Default, Deserialize)]
pub struct KeyQuery {
    pub key: Option<String>,
}

fn authorize(state: &AppState, query: &KeyQuery, headers: &HeaderMap) -> Result<(), ApiError> {
    let presented = query
        .key
        .as_deref()
        .or_else(|| headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()));
    if state.config.accepts_key(presented) {
        Ok(())
    } else {
        tracing::warn!("Rejected trusted request with a missing or wrong key");
        Err(ApiError::Forbidden)
    }
}

/// `toUserId` を UserId に変換する（文字列・数値を受け付ける）
fn target_user(raw: Option<Value>) -> Result<UserId, ApiError> {
    let raw = match raw {
        Some(Value::String(text)) => text,
        Some(Value::Number(number)) => number.to_string(),
        _ => return Err(ApiError::BadRequest("toUserId is required".to_string())),
    };
    UserId::new(raw).map_err(|e| ApiError::BadRequest(e.to_string()))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

/// Health check endpoint
pub async fn health_check() -> Json<Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Get list of rooms
pub async fn get_rooms(State(state): State<Arc<AppState>>) -> Json<Vec<RoomSummaryDto>> {
    // Domain Model から DTO への変換
    let rooms = state
        .room_query_usecase
        .list(|room| RoomSummaryDto::from(room))
        .await;
    Json(rooms)
}

/// Get room detail by ID
pub async fn get_room_detail(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomDetailDto>, ApiError> {
    let room_id = RoomId::new(room_id).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    match state
        .room_query_usecase
        .detail(&room_id, |room| RoomDetailDto::from(room))
        .await
    {
        Ok(detail) => Ok(Json(detail)),
        Err(RoomError::NotFound(room_id)) => Err(ApiError::NotFound(room_id.into_string())),
        Err(e) => Err(ApiError::BadRequest(e.to_string())),
    }
}

/// Push an arbitrary notification to a user's devices
pub async fn notify(
    State(state): State<Arc<AppState>>,
    Query(query): Query<KeyQuery>,
    headers: HeaderMap,
    payload: Result<Json<NotifyRequest>, JsonRejection>,
) -> Result<Json<DeliveryAck>, ApiError> {
    authorize(&state, &query, &headers)?;
    let request = body(payload)?;
    let to = target_user(request.to_user_id)?;
    let delivered = state
        .notification_usecase
        .notify(&to, request.kind, request.payload)
        .await;
    Ok(Json(DeliveryAck::ok(delivered)))
}

async fn push_count(
    state: &AppState,
    query: &KeyQuery,
    headers: &HeaderMap,
    payload: Result<Json<CountRequest>, JsonRejection>,
    counter: CounterKind,
) -> Result<Json<DeliveryAck>, ApiError> {
    authorize(state, query, headers)?;
    let request = body(payload)?;
    let to = target_user(request.to_user_id)?;
    let delivered = state
        .notification_usecase
        .push_count(&to, counter, request.count)
        .await;
    Ok(Json(DeliveryAck::ok(delivered)))
}

pub async fn post_notification_count(
    State(state): State<Arc<AppState>>,
    Query(query): Query<KeyQuery>,
    headers: HeaderMap,
    payload: Result<Json<CountRequest>, JsonRejection>,
) -> Result<Json<DeliveryAck>, ApiError> {
    push_count(&state, &query, &headers, payload, CounterKind::Notifications).await
}

pub async fn post_message_count(
    State(state): State<Arc<AppState>>,
    Query(query): Query<KeyQuery>,
    headers: HeaderMap,
    payload: Result<Json<CountRequest>, JsonRejection>,
) -> Result<Json<DeliveryAck>, ApiError> {
    push_count(&state, &query, &headers, payload, CounterKind::Messages).await
}

pub async fn post_friend_request_count(
    State(state): State<Arc<AppState>>,
    Query(query): Query<KeyQuery>,
    headers: HeaderMap,
    payload: Result<Json<CountRequest>, JsonRejection>,
) -> Result<Json<DeliveryAck>, ApiError> {
    push_count(&state, &query, &headers, payload, CounterKind::FriendRequests).await
}
