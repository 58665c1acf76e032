//! 共有状態のストア
//!
//! ## 概要
//!
//! ドメインの集約（レジストリ・ルーム・通話）をプロセス内で共有するための実装。
//! 集約ごとに 1 つのロックを持ち、書き込みは常にロックの内側で直列化される。
//!
//! ## ロック順序
//!
//! 複数のストアを同時にロックする場合は必ず次の順で取得する:
//!
//! 1. `ConnectionStore`
//! 2. `RoomStore`
//! 3. `CallStore`
//!
//! `MessagePusher` の内部ロックはこれらの内側で取得される。

pub mod inmemory;

pub use inmemory::{CallStore, ConnectionStore, InMemoryStore, RoomStore};
