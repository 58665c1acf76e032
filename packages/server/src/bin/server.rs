//! Kizuna hub server.
//!
//! Accepts WebSocket connections on `/ws` and trusted server-to-server calls on `/api/*`.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin kizuna-server
//! cargo run --bin kizuna-server -- --host 0.0.0.0 --port 3000 --secret-key s3cret
//! ```

use std::{sync::Arc, time::Duration};

use clap::Parser;
use kizuna_server::{
    config::{
        DEFAULT_RING_TIMEOUT, DEFAULT_ROOM_CAPACITY, DEFAULT_ROOM_HISTORY_LIMIT,
        DEFAULT_ROOM_IDLE_CLEANUP, HubConfig,
    },
    ui::{AppState, Server},
};
use kizuna_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "kizuna-server")]
#[command(about = "Presence, room and signaling hub", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Shared secret for the trusted HTTP endpoints
    #[arg(long, env = "KIZUNA_SECRET_KEY")]
    secret_key: Option<String>,

    /// Maximum members in a conference room
    #[arg(long, default_value_t = DEFAULT_ROOM_CAPACITY)]
    room_capacity: usize,

    /// Seconds an empty conference room is kept before deletion
    #[arg(long, default_value_t = DEFAULT_ROOM_IDLE_CLEANUP.as_secs())]
    room_idle_cleanup_secs: u64,

    /// Messages kept per conference room
    #[arg(long, default_value_t = DEFAULT_ROOM_HISTORY_LIMIT)]
    room_history_limit: usize,

    /// Seconds a call may ring before it is dropped
    #[arg(long, default_value_t = DEFAULT_RING_TIMEOUT.as_secs())]
    ring_timeout_secs: u64,
}

impl Args {
    fn hub_config(&self) -> HubConfig {
        let mut config = HubConfig {
            secret_key: self.secret_key.clone().filter(|key| !key.is_empty()),
            ring_timeout: Duration::from_secs(self.ring_timeout_secs),
            ..HubConfig::default()
        };
        config.conference.capacity = Some(self.room_capacity);
        config.conference.idle_cleanup = Some(Duration::from_secs(self.room_idle_cleanup_secs));
        config.conference.history_limit = Some(self.room_history_limit);
        config
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let args = Args::parse();
    let config = args.hub_config();
    if config.secret_key.is_none() {
        tracing::warn!("No secret key configured, trusted endpoints will reject every request");
    }

    // Initialize dependencies in order:
    // 1. AppState (stores, MessagePusher, UseCases)
    // 2. Server
    let state = Arc::new(AppState::from_config(config));
    let server = Server::new(state);
    if let Err(e) = server.run(args.host, args.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
