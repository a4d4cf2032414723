//! Anonymous chat matching server - Entry Point
//!
//! Starts the TCP listener, the ChatServer actor, and the periodic
//! fallback match tick, then accepts connections.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use anonpair::{handle_connection, ChatServer, MemoryStore, ServerCommand};

/// Default server address
const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Channel buffer size for server commands
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Fallback match tick period
const MATCH_TICK_PERIOD: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=anonpair=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("anonpair=info")),
        )
        .init();

    // Get bind address from command line or use default
    let addr = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());

    // Start TCP listener
    let listener = TcpListener::bind(&addr).await?;
    info!("Anonymous chat server listening on {}", addr);

    // Create ChatServer actor channel and start. The in-process store
    // stands in for the external persistence collaborator; a deployment
    // injects its own PersistenceGateway here.
    let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
    let server = ChatServer::new(cmd_rx, Arc::new(MemoryStore::new()));
    tokio::spawn(server.run());

    info!("ChatServer actor started");

    // Periodic fallback: drain any match backlog the enqueue-time
    // attempts left behind (e.g. after a transient store failure).
    let tick_tx = cmd_tx.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(MATCH_TICK_PERIOD);
        loop {
            interval.tick().await;
            if tick_tx.send(ServerCommand::MatchTick).await.is_err() {
                break;
            }
        }
    });

    // Connection accept loop
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let cmd_tx = cmd_tx.clone();

                // Spawn handler task for each connection
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, cmd_tx).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
