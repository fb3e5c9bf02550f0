//! Channels and the channel directory
//!
//! A channel is a named member set created on first join. Empty channels stay
//! in the directory. Each channel lives in its own `DashMap` entry, so joins
//! and leaves on different channels do not contend on one lock.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::error::AppError;
use crate::message::ServerMessage;
use crate::session::Session;
use crate::types::SessionId;

/// Named group of sessions that receive each other's chat lines
#[derive(Debug)]
pub struct Channel {
    /// Channel name as given by the first joiner
    pub name: String,
    /// Members keyed by username
    members: BTreeMap<String, Arc<Session>>,
}

impl Channel {
    /// Create an empty channel
    pub fn new(name: String) -> Self {
        Self {
            name,
            members: BTreeMap::new(),
        }
    }

    /// Check if this exact session is a member
    pub fn contains(&self, session: &Session) -> bool {
        self.members
            .get(&session.username)
            .is_some_and(|m| m.id == session.id)
    }

    /// Add a member
    ///
    /// Returns false if the session was already a member.
    pub fn add(&mut self, session: &Arc<Session>) -> bool {
        if self.contains(session) {
            return false;
        }
        self.members
            .insert(session.username.clone(), Arc::clone(session));
        true
    }

    /// Remove a member
    ///
    /// Returns false if the session was not a member.
    pub fn remove(&mut self, session: &Session) -> bool {
        if !self.contains(session) {
            return false;
        }
        self.members.remove(&session.username);
        true
    }

    /// Queue `msg` for every member except `except`
    ///
    /// Returns the number of members the message was queued for.
    pub fn notify_except(&self, msg: &ServerMessage, except: SessionId) -> usize {
        self.members
            .values()
            .filter(|m| m.id != except)
            .filter(|m| m.deliver(msg.clone()).is_ok())
            .count()
    }

    /// Snapshot of the members, ordered by username
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.members.values().cloned().collect()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Channel name → channel map
#[derive(Debug, Default)]
pub struct ChannelDirectory {
    channels: DashMap<String, Channel>,
}

impl ChannelDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `session` to `name`, creating the channel if needed
    ///
    /// Existing members are told about the joiner before it is inserted; both
    /// happen under the channel's entry lock. The caller is responsible for
    /// leaving any previous channel first. Returns false if the session was
    /// already a member.
    pub fn join(&self, session: &Arc<Session>, name: &str) -> bool {
        let added = match self.channels.entry(name.to_string()) {
            Entry::Occupied(mut entry) => {
                let channel = entry.get_mut();
                if channel.contains(session) {
                    false
                } else {
                    let notice = ServerMessage::MemberJoined {
                        username: session.username.clone(),
                    };
                    let notified = channel.notify_except(&notice, session.id);
                    channel.add(session);
                    debug!(channel = %channel.name, username = %session.username, notified, "joined channel");
                    true
                }
            }
            Entry::Vacant(entry) => {
                let mut channel = Channel::new(name.to_string());
                channel.add(session);
                info!(channel = %channel.name, username = %session.username, "channel created");
                entry.insert(channel);
                true
            }
        };

        session.set_channel(Some(name.to_string()));
        added
    }

    /// Remove `session` from its current channel
    ///
    /// Remaining members are told the session left, then it is removed and its
    /// current channel cleared. Returns the channel name, or `NotInChannel` if
    /// the session has no current channel.
    pub fn leave(&self, session: &Session) -> Result<String, AppError> {
        let name = session.current_channel().ok_or(AppError::NotInChannel)?;

        if let Some(mut channel) = self.channels.get_mut(&name) {
            if channel.contains(session) {
                let notice = ServerMessage::MemberLeft {
                    username: session.username.clone(),
                };
                let notified = channel.notify_except(&notice, session.id);
                channel.remove(session);
                debug!(channel = %channel.name, username = %session.username, notified, "left channel");
            }
        }

        session.set_channel(None);
        Ok(name)
    }

    /// Snapshot of a channel's members; empty if the channel does not exist
    pub fn members_of(&self, name: &str) -> Vec<Arc<Session>> {
        self.channels
            .get(name)
            .map(|channel| channel.snapshot())
            .unwrap_or_default()
    }

    /// Check if a channel entry exists
    pub fn exists(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
