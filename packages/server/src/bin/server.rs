//! Rehearsal Space signaling server.
//!
//! Serves the WebSocket signaling endpoint and, optionally, the static web
//! client from the same port.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin rehearsal-server
//! cargo run --bin rehearsal-server -- --host 0.0.0.0 --port 3000 --static-dir public
//! ```

use std::path::PathBuf;

use clap::Parser;

use rehearsal_server::runner::run_server;
use rehearsal_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "rehearsal-server")]
#[command(about = "Signaling server for remote band rehearsals", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port serving both HTTP and WebSocket traffic
    #[arg(short = 'p', long, default_value_t = 3000)]
    port: u16,

    /// Directory of static web client assets to serve alongside /ws
    #[arg(long)]
    static_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let args = Args::parse();

    if let Err(e) = run_server(args.host, args.port, args.static_dir).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
