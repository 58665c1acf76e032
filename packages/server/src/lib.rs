//! Kizuna: presence, room and signaling hub.
//!
//! Tracks which users are connected over WebSocket, groups connections into
//! rooms, relays opaque WebRTC signaling payloads, drives a small per-user
//! call state machine and fans chat and notification events out to devices.

pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;
