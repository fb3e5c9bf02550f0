//! Message routing over the registry and channel directory
//!
//! Every fan-out works from a snapshot taken before delivery starts, and
//! delivery only enqueues, so no lock is held while a recipient is slow.

use std::sync::Arc;

use tracing::debug;

use crate::channel::ChannelDirectory;
use crate::error::AppError;
use crate::message::ServerMessage;
use crate::registry::Registry;
use crate::session::Session;
use crate::types::SessionId;

/// Result of `Router::list_online`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnlineUsers {
    /// True when the listing is scoped to the caller's channel
    pub in_channel: bool,
    /// Usernames, sorted and unique
    pub names: Vec<String>,
}

impl From<OnlineUsers> for ServerMessage {
    fn from(users: OnlineUsers) -> Self {
        ServerMessage::UserList {
            in_channel: users.in_channel,
            names: users.names,
        }
    }
}

/// Broadcast, whisper, announcement and listing operations
#[derive(Debug, Clone)]
pub struct Router {
    registry: Arc<Registry>,
    channels: Arc<ChannelDirectory>,
}

impl Router {
    pub fn new(registry: Arc<Registry>, channels: Arc<ChannelDirectory>) -> Self {
        Self { registry, channels }
    }

    /// Deliver `msg` to every other member of the sender's channel
    ///
    /// Returns how many members it was queued for; zero if the sender is not
    /// in a channel.
    pub fn broadcast(&self, sender: &Session, msg: &ServerMessage) -> usize {
        let Some(channel) = sender.current_channel() else {
            return 0;
        };

        let delivered = self
            .channels
            .members_of(&channel)
            .iter()
            .filter(|m| m.id != sender.id)
            .filter(|m| m.deliver(msg.clone()).is_ok())
            .count();

        debug!(%channel, from = %sender.username, delivered, "broadcast");
        delivered
    }

    /// Send a private line from `sender` to `recipient`
    pub fn whisper(&self, sender: &str, recipient: &str, text: &str) -> Result<(), AppError> {
        let target = self
            .registry
            .find(recipient)
            .ok_or_else(|| AppError::RecipientNotFound(recipient.to_string()))?;

        // Delivery is best effort; a full or closed queue still counts as sent
        let _ = target.deliver(ServerMessage::Whisper {
            from: sender.to_string(),
            text: text.to_string(),
        });
        debug!(%sender, %recipient, "whisper delivered");
        Ok(())
    }

    /// Deliver `msg` to every registered session except `excluding`
    pub fn announce_global(&self, msg: &ServerMessage, excluding: Option<SessionId>) -> usize {
        self.registry
            .list_all()
            .iter()
            .filter(|s| Some(s.id) != excluding)
            .filter(|s| s.deliver(msg.clone()).is_ok())
            .count()
    }

    /// Users visible to `session`: its channel's members, or everyone online
    pub fn list_online(&self, session: &Session) -> OnlineUsers {
        let (in_channel, sessions) = match session.current_channel() {
            Some(channel) => (true, self.channels.members_of(&channel)),
            None => (false, self.registry.list_all()),
        };

        // Both snapshots come from username-keyed ordered maps
        let names = sessions.iter().map(|s| s.username.clone()).collect();
        OnlineUsers { in_channel, names }
    }
}
