//! Value Object 定義
//!
//! 識別子やタイムスタンプなど、不変で値によって比較されるドメインの型。

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ValueObjectError;

/// 識別子として許容する最大長（バイト数）
const MAX_IDENTIFIER_LENGTH: usize = 128;

fn validate_identifier(kind: &'static str, value: String) -> Result<String, ValueObjectError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValueObjectError::Empty(kind));
    }
    if trimmed.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ValueObjectError::TooLong {
            kind,
            max: MAX_IDENTIFIER_LENGTH,
        });
    }
    if trimmed.len() == value.len() {
        Ok(value)
    } else {
        Ok(trimmed.to_string())
    }
}

/// 物理的な WebSocket 接続 1 本を表す不透明なハンドル
///
/// 接続の受け入れ時にトランスポート層が払い出し、切断で無効になる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// 新しいハンドルを払い出す
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<&str> for ConnectionId {
    type Error = ValueObjectError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Uuid::parse_str(value.trim())
            .map(Self)
            .map_err(|_| ValueObjectError::Malformed("connection id"))
    }
}

impl TryFrom<String> for ConnectionId {
    type Error = ValueObjectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

/// JSON 上の識別子表現（クライアントは数値 ID を送ることがある）
#[derive(Deserialize)]
#[serde(untagged)]
#[doc(hidden)]
pub enum RawIdentifier {
    Text(String),
    Integer(i64),
}

impl From<RawIdentifier> for String {
    fn from(raw: RawIdentifier) -> Self {
        match raw {
            RawIdentifier::Text(text) => text,
            RawIdentifier::Integer(number) => number.to_string(),
        }
    }
}

macro_rules! string_identifier {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "RawIdentifier", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(value: String) -> Result<Self, ValueObjectError> {
                validate_identifier($kind, value).map(Self)
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValueObjectError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl TryFrom<RawIdentifier> for $name {
            type Error = ValueObjectError;

            fn try_from(value: RawIdentifier) -> Result<Self, Self::Error> {
                Self::new(value.into())
            }
        }

        impl TryFrom<&str> for $name {
            type Error = ValueObjectError;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                Self::new(value.to_string())
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_identifier!(
    /// 接続をまたいで安定したユーザー識別子
    UserId,
    "user id"
);

string_identifier!(
    /// ルーム（会議・通話・ライブ配信）のキー
    RoomId,
    "room id"
);

/// Unix タイムスタンプ（ミリ秒, UTC）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_rejects_empty_value() {
        // テスト項目: 空文字列・空白のみの UserId は作成できない
        // given (前提条件):
        let empty = String::new();
        let blank = "   ".to_string();

        // when (操作):
        let empty_result = UserId::new(empty);
        let blank_result = UserId::new(blank);

        // then (期待する結果):
        assert_eq!(empty_result, Err(ValueObjectError::Empty("user id")));
        assert_eq!(blank_result, Err(ValueObjectError::Empty("user id")));
    }

    #[test]
    fn test_room_id_is_trimmed() {
        // テスト項目: 前後の空白は取り除かれる
        // given (前提条件):
        let raw = "  abc ".to_string();

        // when (操作):
        let room_id = RoomId::new(raw).unwrap();

        // then (期待する結果):
        assert_eq!(room_id.as_str(), "abc");
    }

    #[test]
    fn test_identifier_rejects_too_long_value() {
        // テスト項目: 最大長を超える識別子はエラーになる
        // given (前提条件):
        let raw = "x".repeat(MAX_IDENTIFIER_LENGTH + 1);

        // when (操作):
        let result = RoomId::new(raw);

        // then (期待する結果):
        assert!(matches!(result, Err(ValueObjectError::TooLong { .. })));
    }

    #[test]
    fn test_connection_id_round_trips_through_string() {
        // テスト項目: ConnectionId は文字列表現から復元できる
        // given (前提条件):
        let id = ConnectionId::generate();

        // when (操作):
        let parsed = ConnectionId::try_from(id.to_string()).unwrap();

        // then (期待する結果):
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_connection_id_rejects_garbage() {
        // テスト項目: UUID でない文字列は ConnectionId として受け付けない
        // given (前提条件):
        let raw = "not-a-connection";

        // when (操作):
        let result = ConnectionId::try_from(raw);

        // then (期待する結果):
        assert_eq!(result, Err(ValueObjectError::Malformed("connection id")));
    }

    #[test]
    fn test_user_id_deserializes_with_validation() {
        // テスト項目: serde 経由のデシリアライズでも検証が行われる
        // given (前提条件):
        let valid = "\"42\"";
        let numeric = "7";
        let invalid = "\"\"";

        // when (操作):
        let valid_result = serde_json::from_str::<UserId>(valid);
        let numeric_result = serde_json::from_str::<UserId>(numeric);
        let invalid_result = serde_json::from_str::<UserId>(invalid);

        // then (期待する結果):
        assert_eq!(valid_result.unwrap().as_str(), "42");
        assert_eq!(numeric_result.unwrap().as_str(), "7");
        assert!(invalid_result.is_err());
    }
}
