//! Room Relay - realtime channel server for listening rooms
//!
//! Keeps each room's ordered member list and fans the host's song out to
//! everyone in the room, with a terminal dashboard.
//!
//! Usage:
//!   cargo run --release
//!   cargo run --release -- --no-dashboard  # Plain logging mode
//!   RELAY_ADDR=127.0.0.1:4000 cargo run --release

mod dashboard;
mod metrics;
mod rooms;
mod server;

use std::sync::Arc;
use parking_lot::RwLock;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args: Vec<String> = std::env::args().collect();
    let use_dashboard = !args.contains(&"--no-dashboard".to_string());

    // Shared metrics state
    let metrics = Arc::new(RwLock::new(metrics::Metrics::new()));

    if use_dashboard {
        // Run with TUI dashboard
        dashboard::run(metrics).await
    } else {
        // Run with plain logging
        server::run_with_logging(metrics).await
    }
}
