//! Startup parameters for the server and client binaries

use std::time::Duration;

use clap::Parser;

/// Default listen / connect port
pub const DEFAULT_PORT: u16 = 2000;

/// Line chat server
#[derive(Debug, Clone, Parser)]
#[command(name = "line_chat", version, about)]
pub struct ServerConfig {
    /// Port to listen on
    #[arg(value_name = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Seconds a connection may stay silent before it is closed
    #[arg(long, default_value_t = 3600)]
    pub idle_timeout_secs: u64,

    /// Lines buffered per connection before new ones are dropped
    #[arg(long, default_value_t = 64)]
    pub queue_capacity: usize,

    /// Longest accepted inbound line, in bytes
    #[arg(long, default_value_t = 4096)]
    pub max_line_length: usize,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Per-connection settings handed to each handler task
    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            idle_timeout: self.idle_timeout(),
            queue_capacity: self.queue_capacity.max(1),
            max_line_length: self.max_line_length,
        }
    }
}

/// Per-connection limits
#[derive(Debug, Clone, Copy)]
pub struct ConnectionConfig {
    pub idle_timeout: Duration,
    pub queue_capacity: usize,
    pub max_line_length: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60 * 60),
            queue_capacity: 64,
            max_line_length: 4096,
        }
    }
}

/// Interactive chat client
#[derive(Debug, Clone, Parser)]
#[command(name = "chat_client", version, about)]
pub struct ClientConfig {
    /// Server host
    #[arg(value_name = "HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Server port
    #[arg(value_name = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

impl ClientConfig {
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
