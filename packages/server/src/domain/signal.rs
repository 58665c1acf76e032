//! シグナリングの種類と宛先

use serde_json::Value;

use super::{
    event::ServerEvent,
    value_object::{ConnectionId, UserId},
};

/// 中継するシグナリングメッセージの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
    OfferLive,
    AnswerLive,
    IceCandidateLive,
}

impl SignalKind {
    /// 送信者を付けて相手に届けるイベントを作る
    pub fn into_event(
        self,
        payload: Value,
        from: ConnectionId,
        from_user_id: Option<UserId>,
    ) -> ServerEvent {
        match self {
            Self::Offer => ServerEvent::Offer {
                offer: payload,
                from,
                from_user_id,
            },
            Self::Answer => ServerEvent::Answer {
                answer: payload,
                from,
                from_user_id,
            },
            Self::IceCandidate => ServerEvent::IceCandidate {
                candidate: payload,
                from,
                from_user_id,
            },
            Self::OfferLive => ServerEvent::OfferLive {
                offer: payload,
                from,
                from_user_id,
            },
            Self::AnswerLive => ServerEvent::AnswerLive {
                answer: payload,
                from,
                from_user_id,
            },
            Self::IceCandidateLive => ServerEvent::IceCandidateLive {
                candidate: payload,
                from,
                from_user_id,
            },
        }
    }
}

/// シグナリングの宛先
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalTarget {
    /// 接続を直接指定
    Connection(ConnectionId),
    /// ユーザーのプライマリ接続
    User(UserId),
}
