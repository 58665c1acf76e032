//! ハブの実行時設定

use std::time::Duration;

use crate::domain::{RoomKind, RoomPolicy};

/// 会議ルームの同時参加人数の既定値
pub const DEFAULT_ROOM_CAPACITY: usize = 10;
/// 空になった会議ルームを削除するまでの猶予の既定値
pub const DEFAULT_ROOM_IDLE_CLEANUP: Duration = Duration::from_secs(30 * 60);
/// 会議ルームごとに保持する履歴件数の既定値
pub const DEFAULT_ROOM_HISTORY_LIMIT: usize = 500;
/// 応答のない呼び出しを打ち切るまでの時間の既定値
pub const DEFAULT_RING_TIMEOUT: Duration = Duration::from_secs(45);

/// 全ユースケースが共有する設定値
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// 信頼済み HTTP エンドポイントの共有鍵。`None` なら全リクエストを拒否する
    pub secret_key: Option<String>,
    pub conference: RoomPolicy,
    pub call_room: RoomPolicy,
    pub live: RoomPolicy,
    pub ring_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            conference: RoomPolicy {
                capacity: Some(DEFAULT_ROOM_CAPACITY),
                idle_cleanup: Some(DEFAULT_ROOM_IDLE_CLEANUP),
                history_limit: Some(DEFAULT_ROOM_HISTORY_LIMIT),
            },
            call_room: RoomPolicy::default(),
            live: RoomPolicy::default(),
            ring_timeout: DEFAULT_RING_TIMEOUT,
        }
    }
}

impl HubConfig {
    pub fn policy_for(&self, kind: RoomKind) -> RoomPolicy {
        match kind {
            RoomKind::Conference => self.conference,
            RoomKind::Call => self.call_room,
            RoomKind::Live => self.live,
        }
    }

    /// 信頼済みエンドポイントに提示された鍵を検証する
    pub fn accepts_key(&self, presented: Option<&str>) -> bool {
        match (&self.secret_key, presented) {
            (Some(expected), Some(presented)) => !expected.is_empty() && expected == presented,
            _ => false,
        }
    }
}
