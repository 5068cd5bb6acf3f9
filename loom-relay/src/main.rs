//! Relay server binary.
//!
//! Environment:
//! - `LOOM_BIND_ADDR`: listen address (default `127.0.0.1:9090`)
//! - `LOOM_MAX_PEERS`: peers per project room (default 100)
//! - `LOOM_TOKENS`: comma-separated accepted tokens; any non-empty token
//!   is accepted when unset
//! - `RUST_LOG`: log filter

use std::env;
use std::process::ExitCode;

use loom_collab::{AcceptAnyToken, RelayServer, ServerConfig, StaticTokens};

fn config_from_env() -> ServerConfig {
    let mut config = ServerConfig::default();
    if let Ok(addr) = env::var("LOOM_BIND_ADDR") {
        config.bind_addr = addr;
    }
    if let Ok(value) = env::var("LOOM_MAX_PEERS") {
        match value.parse() {
            Ok(max) => config.max_peers_per_room = max,
            Err(e) => log::warn!("Ignoring LOOM_MAX_PEERS={value}: {e}"),
        }
    }
    config
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let config = config_from_env();
    log::info!("Starting Loom relay on {}...", config.bind_addr);

    let server = match env::var("LOOM_TOKENS") {
        Ok(tokens) => {
            let tokens: Vec<&str> = tokens.split(',').map(str::trim).filter(|t| !t.is_empty()).collect();
            log::info!("Accepting {} configured tokens", tokens.len());
            RelayServer::new(config, StaticTokens::new(tokens))
        }
        Err(_) => RelayServer::new(config, AcceptAnyToken),
    };

    match server.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Relay server stopped: {e}");
            ExitCode::FAILURE
        }
    }
}
