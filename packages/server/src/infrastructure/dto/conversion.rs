//! Conversion logic from domain entities to DTOs.

use kizuna_shared::time::millis_to_rfc3339;

use crate::domain::{Member, MemberRole, Room, RoomKind};
use crate::infrastructure::dto::http as dto;

fn kind_label(kind: RoomKind) -> &'static str {
    match kind {
        RoomKind::Conference => "conference",
        RoomKind::Call => "call",
        RoomKind::Live => "live",
    }
}

fn role_label(role: MemberRole) -> &'static str {
    match role {
        MemberRole::Creator => "creator",
        MemberRole::Participant => "participant",
    }
}

impl From<&Room> for dto::RoomSummaryDto {
    fn from(room: &Room) -> Self {
        Self {
            id: room.id.as_str().to_string(),
            kind: kind_label(room.kind).to_string(),
            participant_count: room.member_count(),
            created_at: millis_to_rfc3339(room.created_at.value()),
        }
    }
}

impl From<&Member> for dto::ParticipantDetailDto {
    fn from(member: &Member) -> Self {
        Self {
            connection_id: member.connection.to_string(),
            user_id: member.user_id.as_ref().map(|id| id.as_str().to_string()),
            display_name: member.profile.display_name().to_string(),
            micro_on: member.micro_on,
            role: role_label(member.role).to_string(),
            joined_at: millis_to_rfc3339(member.joined_at.value()),
        }
    }
}

impl From<&Room> for dto::RoomDetailDto {
    fn from(room: &Room) -> Self {
        Self {
            id: room.id.as_str().to_string(),
            kind: kind_label(room.kind).to_string(),
            participants: room.members().iter().map(Into::into).collect(),
            history_length: room.history().len(),
            owner: room.owner.as_ref().map(|id| id.as_str().to_string()),
            pending_deletion: room.is_pending_deletion(),
            created_at: millis_to_rfc3339(room.created_at.value()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConnectionId, RoomDirectory, RoomId, RoomPolicy, Timestamp, UserId, UserProfile};

    #[test]
    fn test_room_to_detail_dto() {
        // テスト項目: ルームが参加者付きの詳細 DTO に変換される
        // given (前提条件):
        let mut directory = RoomDirectory::new();
        let connection = ConnectionId::generate();
        directory
            .join(
                RoomId::new("abc".to_string()).unwrap(),
                RoomKind::Conference,
                RoomPolicy {
                    history_limit: Some(10),
                    ..RoomPolicy::default()
                },
                Member::new(
                    connection,
                    Some(UserId::new("42".to_string()).unwrap()),
                    UserProfile::default(),
                    false,
                    Timestamp::new(1_700_000_000_123),
                ),
                Timestamp::new(1_700_000_000_000),
            )
            .unwrap();
        let room = directory
            .get(&RoomId::new("abc".to_string()).unwrap())
            .unwrap();

        // when (操作):
        let detail: dto::RoomDetailDto = room.into();
        let summary: dto::RoomSummaryDto = room.into();

        // then (期待する結果):
        assert_eq!(detail.kind, "conference");
        assert_eq!(detail.history_length, 1);
        assert_eq!(detail.participants.len(), 1);
        let participant = &detail.participants[0];
        assert_eq!(participant.connection_id, connection.to_string());
        assert_eq!(participant.user_id.as_deref(), Some("42"));
        assert_eq!(participant.role, "creator");
        assert_eq!(participant.joined_at, "2023-11-14T22:13:20.123Z");
        assert_eq!(summary.participant_count, 1);
        assert_eq!(summary.created_at, "2023-11-14T22:13:20.000Z");
    }
}
