//! Line Chat Server - Entry Point
//!
//! Starts the TCP listener and accepts connections until Ctrl-C.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use line_chat::{handle_connection, ChatServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=line_chat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("line_chat=info")),
        )
        .init();

    let config = ServerConfig::parse();
    let addr = config.bind_addr();
    let conn_config = config.connection();

    let listener = TcpListener::bind(&addr).await?;
    info!("Chat server listening on {}", addr);

    let server = Arc::new(ChatServer::new());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested, no longer accepting connections");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    info!("New connection from {}", addr);
                    let server = Arc::clone(&server);

                    // Spawn handler task for each connection
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, server, conn_config).await {
                            error!(peer = %addr, "Connection handler error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    info!(
        online = server.registry().len(),
        channels = server.channels().channel_count(),
        "Chat server stopped"
    );
    Ok(())
}
