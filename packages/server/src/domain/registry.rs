//! 接続レジストリ
//!
//! 物理的な接続（`ConnectionId`）と論理的なユーザー（`UserId`）の対応を管理する。
//!
//! - ユーザー → 接続の集合（デバイス）: チャットや通知の配信先
//! - ユーザー → プライマリ接続（最後に登録された接続）: 通話とシグナリングの宛先
//!
//! 1 つの接続が持てるユーザーは高々 1 つ。

use std::collections::{HashMap, HashSet};

use super::{
    error::RegistryError,
    value_object::{ConnectionId, UserId},
};

/// 登録結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// この接続が以前紐付いていた別のユーザー
    pub previous_identity: Option<UserId>,
    /// プライマリの座を譲った接続
    pub displaced_primary: Option<ConnectionId>,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    attached: HashSet<ConnectionId>,
    owners: HashMap<ConnectionId, UserId>,
    /// 登録順。末尾がプライマリ
    devices: HashMap<UserId, Vec<ConnectionId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 受け入れた接続を登録する
    pub fn attach(&mut self, connection: ConnectionId) {
        self.attached.insert(connection);
    }

    /// 接続を外す。紐付いていたユーザーを返す
    pub fn detach(&mut self, connection: &ConnectionId) -> Option<UserId> {
        let identity = self.unregister(connection);
        self.attached.remove(connection);
        identity
    }

    pub fn is_attached(&self, connection: &ConnectionId) -> bool {
        self.attached.contains(connection)
    }

    pub fn attached(&self) -> Vec<ConnectionId> {
        self.attached.iter().copied().collect()
    }

    pub fn attached_count(&self) -> usize {
        self.attached.len()
    }

    /// 接続にユーザーを紐付ける（後勝ち）
    pub fn register(
        &mut self,
        identity: UserId,
        connection: ConnectionId,
    ) -> Result<Registration, RegistryError> {
        if !self.attached.contains(&connection) {
            return Err(RegistryError::NotAttached(connection.to_string()));
        }

        let rebinding = self
            .owners
            .get(&connection)
            .is_some_and(|owner| owner != &identity);
        let previous_identity = if rebinding {
            self.unregister(&connection)
        } else {
            None
        };

        let devices = self.devices.entry(identity.clone()).or_default();
        devices.retain(|c| c != &connection);
        let displaced_primary = devices.last().copied();
        devices.push(connection);
        self.owners.insert(connection, identity);

        Ok(Registration {
            previous_identity,
            displaced_primary,
        })
    }

    /// 接続からユーザーの紐付けを外す
    ///
    /// プライマリだった場合、残りのうち最も新しい接続がプライマリになる。
    pub fn unregister(&mut self, connection: &ConnectionId) -> Option<UserId> {
        let identity = self.owners.remove(connection)?;
        if let Some(devices) = self.devices.get_mut(&identity) {
            devices.retain(|c| c != connection);
            if devices.is_empty() {
                self.devices.remove(&identity);
            }
        }
        Some(identity)
    }

    /// ユーザーのプライマリ接続
    pub fn resolve(&self, identity: &UserId) -> Option<ConnectionId> {
        self.devices
            .get(identity)
            .and_then(|devices| devices.last().copied())
    }

    /// ユーザーの全接続（登録順）
    pub fn resolve_devices(&self, identity: &UserId) -> Vec<ConnectionId> {
        self.devices.get(identity).cloned().unwrap_or_default()
    }

    pub fn resolve_owner(&self, connection: &ConnectionId) -> Option<UserId> {
        self.owners.get(connection).cloned()
    }

    pub fn is_online(&self, identity: &UserId) -> bool {
        self.devices.contains_key(identity)
    }

    pub fn online_users(&self) -> Vec<UserId> {
        self.devices.keys().cloned().collect()
    }
}
