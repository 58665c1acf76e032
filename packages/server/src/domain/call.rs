//! 通話ステートマシン
//!
//! ユーザーごとの通話状態（free / ringing / in-call）を管理する。
//! 遷移は常に通話の両者に対して同時に適用される。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    error::CallError,
    value_object::{ConnectionId, RoomId, UserId},
};

/// ユーザーの通話状態
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallState {
    #[default]
    Free,
    Ringing,
    InCall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallRole {
    Caller,
    Callee,
}

/// 発信時にクライアントが指定する付帯情報
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallDetails {
    /// "audio" / "video" など。中身は解釈しない
    pub call_type: Option<String>,
    pub room_id: Option<RoomId>,
    /// 発信者の表示情報
    pub caller_info: Option<Value>,
}

/// 通話中（呼び出し中を含む）のユーザー 1 人分の状態
#[derive(Debug, Clone, PartialEq)]
pub struct CallSlot {
    pub call_id: u64,
    pub peer: UserId,
    pub role: CallRole,
    pub state: CallState,
    /// この通話に使っている接続
    pub connection: ConnectionId,
    pub details: CallDetails,
}

/// 遷移の対象になった通話
#[derive(Debug, Clone, PartialEq)]
pub struct CallPair {
    pub call_id: u64,
    pub caller: UserId,
    pub callee: UserId,
    /// 遷移前の状態
    pub previous: CallState,
    pub details: CallDetails,
}

impl CallPair {
    /// `user` から見た相手
    pub fn peer_of(&self, user: &UserId) -> &UserId {
        if user == &self.caller {
            &self.callee
        } else {
            &self.caller
        }
    }
}

#[derive(Debug, Default)]
pub struct CallBook {
    slots: HashMap<UserId, CallSlot>,
    next_call_id: u64,
}

impl CallBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state_of(&self, user: &UserId) -> CallState {
        self.slots
            .get(user)
            .map(|slot| slot.state)
            .unwrap_or_default()
    }

    pub fn slot(&self, user: &UserId) -> Option<&CallSlot> {
        self.slots.get(user)
    }

    pub fn active_calls(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| slot.role == CallRole::Caller)
            .count()
    }

    /// 発信する。両者を ringing にして通話 ID を返す
    ///
    /// 着信側がオンラインかどうかは呼び出し側で判定済みであること。
    pub fn ring(
        &mut self,
        caller: UserId,
        caller_connection: ConnectionId,
        callee: UserId,
        callee_connection: ConnectionId,
        details: CallDetails,
    ) -> Result<u64, CallError> {
        if caller == callee {
            return Err(CallError::SelfCall);
        }
        if self.slots.contains_key(&caller) {
            return Err(CallError::AlreadyInCall);
        }
        if self.slots.contains_key(&callee) {
            return Err(CallError::UserBusy(callee));
        }

        self.next_call_id += 1;
        let call_id = self.next_call_id;
        self.slots.insert(
            caller.clone(),
            CallSlot {
                call_id,
                peer: callee.clone(),
                role: CallRole::Caller,
                state: CallState::Ringing,
                connection: caller_connection,
                details: details.clone(),
            },
        );
        self.slots.insert(
            callee,
            CallSlot {
                call_id,
                peer: caller,
                role: CallRole::Callee,
                state: CallState::Ringing,
                connection: callee_connection,
                details,
            },
        );
        Ok(call_id)
    }

    /// 着信側が応答する。両者を in-call にする
    pub fn accept(
        &mut self,
        callee: &UserId,
        callee_connection: ConnectionId,
        caller: &UserId,
    ) -> Result<CallPair, CallError> {
        let pair = self.pending(caller, callee)?;
        if let Some(slot) = self.slots.get_mut(caller) {
            slot.state = CallState::InCall;
        }
        if let Some(slot) = self.slots.get_mut(callee) {
            slot.state = CallState::InCall;
            slot.connection = callee_connection;
        }
        Ok(pair)
    }

    /// 着信側が拒否する
    pub fn reject(&mut self, callee: &UserId, caller: &UserId) -> Result<CallPair, CallError> {
        let pair = self.pending(caller, callee)?;
        self.free(&pair);
        Ok(pair)
    }

    /// 発信側が呼び出しを取り消す
    pub fn cancel(&mut self, caller: &UserId, callee: &UserId) -> Result<CallPair, CallError> {
        let pair = self
            .pending(caller, callee)
            .map_err(|_| CallError::NoPendingCall(callee.clone()))?;
        self.free(&pair);
        Ok(pair)
    }

    /// 通話を終了する（状態を問わない）
    pub fn end(&mut self, user: &UserId, peer: &UserId) -> Result<CallPair, CallError> {
        let slot = self
            .slots
            .get(user)
            .filter(|slot| &slot.peer == peer)
            .ok_or_else(|| CallError::NoPendingCall(peer.clone()))?;
        let pair = Self::pair_from(user, slot);
        self.free(&pair);
        Ok(pair)
    }

    /// 呼び出しのまま時間切れになった通話を解放する
    pub fn expire_ringing(&mut self, call_id: u64) -> Option<CallPair> {
        let (user, slot) = self.slots.iter().find(|(_, slot)| {
            slot.call_id == call_id
                && slot.role == CallRole::Caller
                && slot.state == CallState::Ringing
        })?;
        let pair = Self::pair_from(user, slot);
        self.free(&pair);
        Some(pair)
    }

    /// 接続の切断に伴い、その接続で行っていた通話を解放する
    pub fn release(&mut self, user: &UserId, connection: &ConnectionId) -> Option<CallPair> {
        let slot = self
            .slots
            .get(user)
            .filter(|slot| &slot.connection == connection)?;
        let pair = Self::pair_from(user, slot);
        self.free(&pair);
        Some(pair)
    }

    fn pending(&self, caller: &UserId, callee: &UserId) -> Result<CallPair, CallError> {
        let slot = self
            .slots
            .get(callee)
            .filter(|slot| {
                &slot.peer == caller
                    && slot.role == CallRole::Callee
                    && slot.state == CallState::Ringing
            })
            .ok_or_else(|| CallError::NoPendingCall(caller.clone()))?;
        Ok(Self::pair_from(callee, slot))
    }

    fn pair_from(user: &UserId, slot: &CallSlot) -> CallPair {
        let (caller, callee) = match slot.role {
            CallRole::Caller => (user.clone(), slot.peer.clone()),
            CallRole::Callee => (slot.peer.clone(), user.clone()),
        };
        CallPair {
            call_id: slot.call_id,
            caller,
            callee,
            previous: slot.state,
            details: slot.details.clone(),
        }
    }

    fn free(&mut self, pair: &CallPair) {
        for user in [&pair.caller, &pair.callee] {
            if self
                .slots
                .get(user)
                .is_some_and(|slot| slot.call_id == pair.call_id)
            {
                self.slots.remove(user);
            }
        }
    }
}
