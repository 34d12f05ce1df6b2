//! Careline Relay Server -- real-time consultation chat relay.
//!
//! An axum WebSocket server that pairs each patient with their doctor in a
//! private room and forwards chat messages between the two live sockets.
//! Messages are never stored; a peer that is offline simply does not
//! receive them.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:9400
//! cargo run --bin careline-relay
//!
//! # Run on custom address
//! cargo run --bin careline-relay -- --bind 127.0.0.1:8080
//!
//! # Or via environment variable
//! CARELINE_RELAY_ADDR=127.0.0.1:8080 cargo run --bin careline-relay
//! ```

use std::sync::Arc;
use std::time::Duration;

use careline_relay::config::{RelayCliArgs, RelayConfig};
use careline_relay::relay::{self, RelayState};
use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = RelayCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match RelayConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with the resolved log level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting careline relay server");

    let state = Arc::new(RelayState::with_config(
        config.max_text_len,
        Duration::from_secs(config.sweep_interval_secs),
    ));

    match relay::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "relay server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "relay server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start relay server");
            std::process::exit(1);
        }
    }
}
