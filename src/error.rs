//! Error types for the chat server
//!
//! Defines per-session application errors and outbound delivery errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Covers both fatal errors (connection termination) and
/// user errors (reported to the client, connection stays open).
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal for the connection only)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No inbound line within the idle timeout (fatal for the connection only)
    #[error("Idle timeout")]
    IdleTimeout,

    /// Channel send error (fatal - connection writer gone)
    #[error("Channel send error")]
    ChannelSend,

    /// Inbound line exceeds the configured maximum length
    #[error("Line too long")]
    LineTooLong,

    /// Another active session already holds this username
    #[error("Username taken: {0}")]
    UsernameTaken(String),

    /// Username is empty or contains whitespace
    #[error("Invalid username")]
    InvalidUsername,

    /// Whisper target is not registered
    #[error("Recipient not found: {0}")]
    RecipientNotFound(String),

    /// Whisper addressed to the sender
    #[error("Cannot whisper to self")]
    WhisperToSelf,

    /// Session is not in any channel
    #[error("Not in channel")]
    NotInChannel,

    /// Session is already a member of the requested channel
    #[error("Already in channel: {0}")]
    AlreadyInChannel(String),

    /// `/join` without a channel name
    #[error("Missing channel name")]
    MissingChannel,

    /// `/whisper` without a recipient or message
    #[error("Missing whisper arguments")]
    MissingWhisperArgs,
}

/// Message send errors
///
/// Occurs when a line cannot be queued for a session's writer.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The session's outbound queue is full; the line was dropped
    #[error("Outbound queue full")]
    QueueFull,
}
