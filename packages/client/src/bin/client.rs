//! Rehearsal Space CLI client.
//!
//! Joins a rehearsal room over WebSocket and drives it from the terminal.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin rehearsal-client -- --room garage
//! cargo run --bin rehearsal-client -- --room garage --nickname Mina
//! ```

use clap::Parser;
use uuid::Uuid;

use rehearsal_client::{runner::run_client, session::SessionConfig};
use rehearsal_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "rehearsal-client")]
#[command(about = "CLI client for Rehearsal Space rooms", long_about = None)]
struct Args {
    /// WebSocket server URL
    #[arg(short = 'u', long, default_value = "ws://127.0.0.1:3000/ws")]
    url: String,

    /// Room to join
    #[arg(short = 'r', long)]
    room: String,

    /// User id, unique within the room (random when omitted)
    #[arg(long)]
    user_id: Option<String>,

    /// Display name shown to other members
    #[arg(short = 'n', long, default_value = "Anonymous")]
    nickname: String,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();

    let user_id = args
        .user_id
        .unwrap_or_else(|| format!("user-{}", Uuid::new_v4()));

    let config = SessionConfig {
        url: args.url,
        room_id: args.room,
        user_id,
        nickname: args.nickname,
    };

    if let Err(e) = run_client(config).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
