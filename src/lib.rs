//! Line-Oriented Multi-User Chat Server Library
//!
//! A plain-text TCP chat server: clients claim a unique username, join one
//! named channel at a time, chat with channel members, whisper to anyone
//! online and list who is connected.
//!
//! # Features
//! - First-come username registration
//! - Channels created on first join
//! - Channel broadcast, whispers, connect/disconnect notices
//! - Sorted online-user listings
//! - Idle timeout and bounded per-connection output queues
//!
//! # Architecture
//! Shared state lives behind small synchronous, internally locked types:
//! - `Registry` maps usernames to sessions under one mutex
//! - `ChannelDirectory` keeps each channel in its own `DashMap` entry
//! - `Router` fans messages out from snapshots of those sets
//! - `ChatServer` ties them together and dispatches commands
//!
//! Each connection runs a reader task calling into `ChatServer` and a writer
//! task draining a bounded queue, so delivering to a slow client never
//! blocks the sender.
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use line_chat::{handle_connection, ChatServer, ConnectionConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:2000").await.unwrap();
//!     let server = Arc::new(ChatServer::new());
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         let server = Arc::clone(&server);
//!         tokio::spawn(handle_connection(stream, server, ConnectionConfig::default()));
//!     }
//! }
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use channel::{Channel, ChannelDirectory};
pub use config::{ClientConfig, ConnectionConfig, ServerConfig};
pub use error::{AppError, SendError};
pub use handler::handle_connection;
pub use message::{Command, ServerMessage};
pub use registry::Registry;
pub use router::{OnlineUsers, Router};
pub use server::{ChatServer, Flow};
pub use session::{Outbound, Session};
pub use types::SessionId;
