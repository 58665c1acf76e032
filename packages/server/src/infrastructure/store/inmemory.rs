//! InMemory ストア実装

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::domain::{CallBook, ConnectionRegistry, RoomDirectory};

/// 集約を 1 つのロックで保護するストア
///
/// Clone しても同じ集約を指す。
#[derive(Debug, Default)]
pub struct InMemoryStore<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> InMemoryStore<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(value)),
        }
    }

    /// 集約をロックする
    ///
    /// ガードを保持している間に行った変更と送信は、他のタスクから見て不可分になる。
    pub async fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().await
    }
}

impl<T> Clone for InMemoryStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

pub type ConnectionStore = InMemoryStore<ConnectionRegistry>;
pub type RoomStore = InMemoryStore<RoomDirectory>;
pub type CallStore = InMemoryStore<CallBook>;
