//! UseCase: ルームの参照（HTTP API 用）

use crate::{
    domain::{Room, RoomError, RoomId},
    infrastructure::store::RoomStore,
};

/// ルーム参照のユースケース
///
/// ルームはロックの内側でしか参照できないため、呼び出し側が渡す関数で
/// 必要な形に写してから返す。
pub struct RoomQueryUseCase {
    rooms: RoomStore,
}

impl RoomQueryUseCase {
    pub fn new(rooms: RoomStore) -> Self {
        Self { rooms }
    }

    /// ルーム一覧（ID 順）
    pub async fn list<T>(&self, project: impl Fn(&Room) -> T) -> Vec<T> {
        let rooms = self.rooms.lock().await;
        let mut all: Vec<&Room> = rooms.rooms().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all.into_iter().map(project).collect()
    }

    /// ルームの詳細
    pub async fn detail<T>(
        &self,
        room_id: &RoomId,
        project: impl FnOnce(&Room) -> T,
    ) -> Result<T, RoomError> {
        let rooms = self.rooms.lock().await;
        rooms
            .get(room_id)
            .map(project)
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RoomKind, UserProfile};
    use crate::usecase::test_support::TestHub;

    #[tokio::test]
    async fn test_list_is_sorted_by_id() {
        // テスト項目: ルーム一覧は ID 順に並ぶ
        // given (前提条件):
        let hub = TestHub::new();
        let (connection, _rx) = hub.connect().await;
        for id in ["zeta", "alpha"] {
            hub.room_session
                .join(
                    connection,
                    RoomId::new(id.to_string()).unwrap(),
                    RoomKind::Conference,
                    UserProfile::default(),
                    true,
                )
                .await
                .unwrap();
        }

        // when (操作):
        let ids = hub
            .room_query
            .list(|room| room.id.as_str().to_string())
            .await;

        // then (期待する結果):
        assert_eq!(ids, vec!["alpha".to_string(), "zeta".to_string()]);
    }

    #[tokio::test]
    async fn test_detail_of_missing_room() {
        // テスト項目: 存在しないルームの詳細は NotFound になる
        // given (前提条件):
        let hub = TestHub::new();
        let room_id = RoomId::new("missing".to_string()).unwrap();

        // when (操作):
        let result = hub.room_query.detail(&room_id, |room| room.member_count()).await;

        // then (期待する結果):
        assert_eq!(result, Err(RoomError::NotFound(room_id)));
    }
}
