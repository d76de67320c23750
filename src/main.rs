//! CLI for PopChat
//!
//! Subcommands:
//! - `server`: run the WebSocket chat server
//! - `client`: run the interactive terminal client

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use popchat::broker::Broker;
use popchat::client::run_client;
use popchat::config::{Settings, load_config, load_config_from};
use popchat::transport::websocket::start_websocket_server;
use popchat::utils::logging;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "popchat")]
enum Command {
    /// Start the WebSocket chat server
    Server {
        /// Configuration file to read instead of `config/default`
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Run the interactive chat client
    Client {
        /// WebSocket server URL to connect to
        #[arg(long, default_value = "ws://127.0.0.1:7775")]
        url: String,
        /// Username to connect with; asked for interactively when omitted
        #[arg(long)]
        username: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cmd = Command::parse();

    match cmd {
        Command::Server { config } => {
            let settings = match config {
                Some(path) => load_config_from(path),
                None => load_config(),
            };
            let settings = match settings {
                Ok(settings) => settings,
                Err(e) => {
                    logging::init("info");
                    error!("Failed to load configuration: {e}");
                    return;
                }
            };
            logging::init(&settings.logging.level);

            if let Err(e) = run_server(settings).await {
                error!("Server failed: {e}");
            }
        }
        Command::Client { url, username } => {
            logging::init("warn");
            if let Err(e) = run_client(&url, username).await {
                error!("Client failed: {e}");
            }
        }
    }
}

async fn run_server(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let broker = Arc::new(Broker::from_settings(&settings.broker));

    tokio::select! {
        result = start_websocket_server(&addr, broker, settings.clone()) => {
            result?;
            error!("WebSocket server exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    Ok(())
}
