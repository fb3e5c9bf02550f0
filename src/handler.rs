//! TCP connection handler
//!
//! Handles individual client connections: greeting, username registration,
//! the line read loop feeding `ChatServer`, and a writer task draining the
//! connection's outbound queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::error::AppError;
use crate::message::ServerMessage;
use crate::server::{ChatServer, Flow};
use crate::session::{Outbound, Session};

/// How long the writer may keep flushing queued lines after disconnect
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle a new TCP connection
///
/// Runs until the client exits, the connection fails or goes idle. Whatever
/// the cause, a registered session is torn down through
/// `ChatServer::disconnect` and only this connection is affected.
pub async fn handle_connection(
    stream: TcpStream,
    server: Arc<ChatServer>,
    config: ConnectionConfig,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let local_addr = stream
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!(peer = %peer_addr, "new TCP connection");

    let (reader, writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    // Channel for server -> client messages
    let (msg_tx, msg_rx) = mpsc::channel::<ServerMessage>(config.queue_capacity);
    let mut write_task = tokio::spawn(write_loop(writer, msg_rx));

    let mut session = None;
    let (result, writer_done) = tokio::select! {
        res = serve(&mut reader, &server, &msg_tx, &mut session, &local_addr, &config) => (res, false),
        _ = &mut write_task => {
            debug!(peer = %peer_addr, "write task ended first");
            (Ok(()), true)
        }
    };

    if let Some(session) = session.take() {
        server.disconnect(&session);
    }

    // Let the writer flush whatever is still queued, then close
    drop(msg_tx);
    if !writer_done && timeout(WRITER_DRAIN_TIMEOUT, &mut write_task).await.is_err() {
        warn!(peer = %peer_addr, "writer did not drain in time");
        write_task.abort();
    }

    match result {
        Err(AppError::IdleTimeout) => {
            info!(peer = %peer_addr, "client timed out");
            Ok(())
        }
        Err(e) => Err(e),
        Ok(()) => {
            info!(peer = %peer_addr, "client disconnected");
            Ok(())
        }
    }
}

/// Greeting, registration, then the command loop
async fn serve<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
    server: &ChatServer,
    outbound: &Outbound,
    slot: &mut Option<Arc<Session>>,
    local_addr: &str,
    config: &ConnectionConfig,
) -> Result<(), AppError> {
    send(
        outbound,
        ServerMessage::Greeting {
            local_addr: local_addr.to_string(),
        },
    )
    .await?;

    let session = loop {
        let Some(name) = next_line(reader, config).await? else {
            return Ok(());
        };

        match server.register(name.trim(), outbound) {
            Ok(session) => break session,
            Err(e) => {
                debug!(candidate = %name, error = %e, "registration refused");
                send(outbound, e.into()).await?;
            }
        }
    };
    *slot = Some(Arc::clone(&session));

    let _ = session.deliver(ServerMessage::Welcome {
        username: session.username.clone(),
    });
    let _ = session.deliver(ServerMessage::Help);

    while let Some(line) = next_line(reader, config).await? {
        if line.is_empty() {
            continue;
        }
        if server.handle_line(&session, &line) == Flow::Disconnect {
            break;
        }
    }

    Ok(())
}

/// Drain the outbound queue onto the socket
async fn write_loop<W: AsyncWrite + Unpin>(mut writer: W, mut msg_rx: mpsc::Receiver<ServerMessage>) {
    while let Some(msg) = msg_rx.recv().await {
        let data = format!("{}\n", msg);
        if writer.write_all(data.as_bytes()).await.is_err() {
            debug!("socket write failed, ending write task");
            break;
        }
    }
    let _ = writer.shutdown().await;
}

/// Queue a line before a session exists, waiting for room if needed
async fn send(outbound: &Outbound, msg: ServerMessage) -> Result<(), AppError> {
    outbound.send(msg).await.map_err(|_| AppError::ChannelSend)
}

/// Read the next line, without its terminator
///
/// Returns `None` at end of stream.
async fn next_line<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
    config: &ConnectionConfig,
) -> Result<Option<String>, AppError> {
    let mut buf = Vec::new();
    let read = timeout(
        config.idle_timeout,
        read_bounded_line(reader, &mut buf, config.max_line_length),
    )
    .await
    .map_err(|_| AppError::IdleTimeout)??;

    if read == 0 {
        return Ok(None);
    }

    let line = String::from_utf8_lossy(&buf);
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

/// Read up to and including a newline, capped at `max` bytes
///
/// Returns the number of bytes read; 0 means end of stream.
async fn read_bounded_line<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
    buf: &mut Vec<u8>,
    max: usize,
) -> Result<usize, AppError> {
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(buf.len());
        }

        let (chunk, done) = match available.iter().position(|&b| b == b'\n') {
            Some(pos) => (&available[..=pos], true),
            None => (available, false),
        };
        let len = chunk.len();
        buf.extend_from_slice(chunk);
        reader.consume(len);

        if content_len(buf) > max {
            return Err(AppError::LineTooLong);
        }
        if done {
            return Ok(buf.len());
        }
    }
}

/// Length of a line without its `\n` or `\r\n` terminator
fn content_len(buf: &[u8]) -> usize {
    let line = buf.strip_suffix(b"\n").unwrap_or(buf);
    line.strip_suffix(b"\r").unwrap_or(line).len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ConnectionConfig {
        ConnectionConfig {
            idle_timeout: Duration::from_secs(5),
            queue_capacity: 8,
            max_line_length: 16,
        }
    }

    #[tokio::test]
    async fn test_next_line_strips_terminators() {
        let input: &[u8] = b"alice\r\n/join lobby\nlast";
        let mut reader = BufReader::new(input);

        assert_eq!(next_line(&mut reader, &config()).await.unwrap().as_deref(), Some("alice"));
        assert_eq!(
            next_line(&mut reader, &config()).await.unwrap().as_deref(),
            Some("/join lobby")
        );
        assert_eq!(next_line(&mut reader, &config()).await.unwrap().as_deref(), Some("last"));
        assert!(next_line(&mut reader, &config()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_next_line_rejects_long_lines() {
        let input: &[u8] = b"this line is far longer than sixteen bytes\n";
        let mut reader = BufReader::new(input);

        assert!(matches!(
            next_line(&mut reader, &config()).await,
            Err(AppError::LineTooLong)
        ));
    }

    #[tokio::test]
    async fn test_next_line_length_limit_excludes_terminator() {
        for input in [&b"0123456789abcdef\n"[..], &b"0123456789abcdef\r\n"[..]] {
            let mut reader = BufReader::new(input);
            assert_eq!(
                next_line(&mut reader, &config()).await.unwrap().as_deref(),
                Some("0123456789abcdef")
            );
        }

        for input in [&b"0123456789abcdefg\n"[..], &b"0123456789abcdefg\r\n"[..]] {
            let mut reader = BufReader::new(input);
            assert!(matches!(
                next_line(&mut reader, &config()).await,
                Err(AppError::LineTooLong)
            ));
        }
    }

    #[test]
    fn test_content_len() {
        assert_eq!(content_len(b"abc\r\n"), 3);
        assert_eq!(content_len(b"abc\n"), 3);
        assert_eq!(content_len(b"abc"), 3);
        assert_eq!(content_len(b""), 0);
    }

    #[tokio::test]
    async fn test_next_line_idle_timeout() {
        let (_client, server) = tokio::io::duplex(64);
        let mut reader = BufReader::new(server);
        let config = ConnectionConfig {
            idle_timeout: Duration::from_millis(50),
            ..config()
        };

        assert!(matches!(
            next_line(&mut reader, &config).await,
            Err(AppError::IdleTimeout)
        ));
    }
}
