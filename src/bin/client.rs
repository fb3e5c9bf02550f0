//! Interactive chat client
//!
//! Prints every line from the server and forwards each stdin line to it.
//! Ends after `/exit` once the server closes the connection, when the server
//! goes away, or when stdin is closed.

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use line_chat::ClientConfig;

const EXIT_COMMAND: &str = "/exit";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Quiet by default so log lines do not interleave with chat
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig::parse();
    let addr = config.server_addr();

    let stream = match TcpStream::connect(&addr).await {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("Could not connect to {}: {}", addr, e);
            return Err(e.into());
        }
    };
    debug!(%addr, "connected");

    let (reader, mut writer) = stream.into_split();
    let mut server_lines = BufReader::new(reader).lines();
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut exiting = false;

    loop {
        tokio::select! {
            line = server_lines.next_line() => match line {
                Ok(Some(line)) => println!("{}", line),
                Ok(None) => {
                    if !exiting {
                        eprintln!("Connection lost to server");
                    }
                    break;
                }
                Err(e) => {
                    error!(error = %e, "read from server failed");
                    break;
                }
            },
            line = input.next_line(), if !exiting => match line? {
                Some(line) => {
                    writer.write_all(format!("{}\n", line).as_bytes()).await?;
                    exiting = line == EXIT_COMMAND;
                }
                None => {
                    debug!("stdin closed");
                    break;
                }
            },
        }
    }

    let _ = writer.shutdown().await;
    Ok(())
}
