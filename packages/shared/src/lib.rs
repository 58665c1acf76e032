//! Utilities shared by the Kizuna binaries and libraries.

pub mod logger;
pub mod time;
