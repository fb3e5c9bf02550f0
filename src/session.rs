//! Session struct definition
//!
//! Represents a registered client: its username, current channel and the
//! bounded queue its connection's writer task drains.

use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::types::SessionId;

/// Sending half of a connection's outbound queue
pub type Outbound = mpsc::Sender<ServerMessage>;

/// Registered client state
///
/// Shared as `Arc<Session>` between the registry, channel member sets and
/// the owning connection task.
#[derive(Debug)]
pub struct Session {
    /// Unique identifier for this session
    pub id: SessionId,
    /// Username, fixed at registration
    pub username: String,
    /// Channel this session is a member of
    channel: Mutex<Option<String>>,
    /// Server → Client message queue
    outbound: Outbound,
}

impl Session {
    /// Create a new session bound to the given outbound queue
    pub fn new(username: String, outbound: Outbound) -> Self {
        Self {
            id: SessionId::new(),
            username,
            channel: Mutex::new(None),
            outbound,
        }
    }

    /// Queue a message for this session without waiting
    ///
    /// A full queue drops the message so one stalled client cannot hold up
    /// the task that is delivering to it.
    pub fn deliver(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.outbound.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                warn!(username = %self.username, "outbound queue full, dropping line");
                SendError::QueueFull
            }
            mpsc::error::TrySendError::Closed(_) => {
                debug!(username = %self.username, "outbound queue closed");
                SendError::ChannelClosed
            }
        })
    }

    /// Name of the channel this session is in, if any
    pub fn current_channel(&self) -> Option<String> {
        self.channel_slot().clone()
    }

    /// Check if this session is in a channel
    pub fn in_channel(&self) -> bool {
        self.channel_slot().is_some()
    }

    pub(crate) fn set_channel(&self, channel: Option<String>) {
        *self.channel_slot() = channel;
    }

    fn channel_slot(&self) -> MutexGuard<'_, Option<String>> {
        // The guarded value is a plain Option, so a poisoned lock is still usable
        self.channel.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_creation() {
        let (tx, _rx) = mpsc::channel(4);
        let session = Session::new("alice".to_string(), tx);

        assert_eq!(session.username, "alice");
        assert!(!session.in_channel());
        assert!(session.current_channel().is_none());
    }

    #[test]
    fn test_session_channel() {
        let (tx, _rx) = mpsc::channel(4);
        let session = Session::new("alice".to_string(), tx);

        session.set_channel(Some("lobby".to_string()));
        assert_eq!(session.current_channel().as_deref(), Some("lobby"));

        session.set_channel(None);
        assert!(!session.in_channel());
    }

    #[test]
    fn test_deliver_queues_message() {
        let (tx, mut rx) = mpsc::channel(4);
        let session = Session::new("alice".to_string(), tx);

        session.deliver(ServerMessage::Help).unwrap();
        assert_eq!(rx.try_recv().unwrap(), ServerMessage::Help);
    }

    #[test]
    fn test_deliver_full_queue_drops() {
        let (tx, mut rx) = mpsc::channel(1);
        let session = Session::new("alice".to_string(), tx);

        session.deliver(ServerMessage::Help).unwrap();
        assert!(matches!(
            session.deliver(ServerMessage::Disconnecting),
            Err(SendError::QueueFull)
        ));
        assert_eq!(rx.try_recv().unwrap(), ServerMessage::Help);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_deliver_closed_queue() {
        let (tx, rx) = mpsc::channel(1);
        let session = Session::new("alice".to_string(), tx);
        drop(rx);

        assert!(matches!(
            session.deliver(ServerMessage::Help),
            Err(SendError::ChannelClosed)
        ));
    }
}
