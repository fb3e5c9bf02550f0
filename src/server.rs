//! ChatServer: shared state and per-session command dispatch
//!
//! Owns the registry, channel directory and router. Connection handlers call
//! into it from their own tasks; every method is synchronous and safe to call
//! concurrently.

use std::sync::Arc;

use tracing::{debug, info};

use crate::channel::ChannelDirectory;
use crate::error::AppError;
use crate::message::{Command, ServerMessage};
use crate::registry::Registry;
use crate::router::Router;
use crate::session::{Outbound, Session};
use crate::types::validate_username;

/// What the connection should do after a line has been handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading lines
    Continue,
    /// Client asked to leave; tear the connection down
    Disconnect,
}

/// The shared chat state
#[derive(Debug)]
pub struct ChatServer {
    registry: Arc<Registry>,
    channels: Arc<ChannelDirectory>,
    router: Router,
}

impl Default for ChatServer {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatServer {
    /// Create an empty server
    pub fn new() -> Self {
        let registry = Arc::new(Registry::new());
        let channels = Arc::new(ChannelDirectory::new());
        let router = Router::new(Arc::clone(&registry), Arc::clone(&channels));
        Self {
            registry,
            channels,
            router,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn channels(&self) -> &ChannelDirectory {
        &self.channels
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Register a session for `username` and announce it to everyone else
    ///
    /// Fails with `InvalidUsername` or `UsernameTaken`; the caller reprompts.
    pub fn register(&self, username: &str, outbound: &Outbound) -> Result<Arc<Session>, AppError> {
        validate_username(username)?;
        let session = self.registry.try_register(username, outbound)?;

        info!(%username, id = %session.id, online = self.registry.len(), "user connected");

        let notice = ServerMessage::UserConnected {
            username: username.to_string(),
        };
        self.router.announce_global(&notice, Some(session.id));
        Ok(session)
    }

    /// Tear down a session: leave its channel, unregister, announce
    ///
    /// Calling it again for the same session does nothing.
    pub fn disconnect(&self, session: &Session) {
        if session.in_channel() {
            let _ = self.channels.leave(session);
        }

        if !self.registry.unregister(session) {
            return;
        }

        info!(username = %session.username, online = self.registry.len(), "user disconnected");

        let notice = ServerMessage::UserDisconnected {
            username: session.username.clone(),
        };
        self.router.announce_global(&notice, None);
    }

    /// Handle one inbound line from a registered session
    pub fn handle_line(&self, session: &Arc<Session>, line: &str) -> Flow {
        let result = Command::parse(line).and_then(|cmd| self.handle_command(session, cmd));

        match result {
            Ok(flow) => flow,
            Err(e) => {
                debug!(username = %session.username, error = %e, "command rejected");
                reply(session, e.into());
                Flow::Continue
            }
        }
    }

    /// Process a single command
    fn handle_command(&self, session: &Arc<Session>, cmd: Command) -> Result<Flow, AppError> {
        match cmd {
            Command::Join { channel } => self.handle_join(session, channel)?,
            Command::Leave => self.handle_leave(session)?,
            Command::Whisper { to, text } => self.handle_whisper(session, to, text)?,
            Command::Users => reply(session, self.router.list_online(session).into()),
            Command::Help => reply(session, ServerMessage::Help),
            Command::Say(text) => self.handle_say(session, text)?,
            Command::Exit => {
                reply(session, ServerMessage::Disconnecting);
                return Ok(Flow::Disconnect);
            }
        }
        Ok(Flow::Continue)
    }

    /// Handle channel join; an existing membership is left first
    fn handle_join(&self, session: &Arc<Session>, channel: String) -> Result<(), AppError> {
        if let Some(current) = session.current_channel() {
            if current == channel {
                return Err(AppError::AlreadyInChannel(channel));
            }
            let left = self.channels.leave(session)?;
            reply(session, ServerMessage::LeftChannel { channel: left });
        }

        self.channels.join(session, &channel);
        info!(username = %session.username, %channel, "joined channel");
        reply(session, ServerMessage::JoinedChannel { channel });
        Ok(())
    }

    /// Handle voluntary channel leaving
    fn handle_leave(&self, session: &Session) -> Result<(), AppError> {
        if !session.in_channel() {
            return Err(AppError::NotInChannel);
        }

        let channel = self.channels.leave(session)?;
        info!(username = %session.username, %channel, "left channel");
        reply(session, ServerMessage::LeftChannel { channel });
        Ok(())
    }

    /// Handle private message
    fn handle_whisper(&self, session: &Session, to: String, text: String) -> Result<(), AppError> {
        if to == session.username {
            return Err(AppError::WhisperToSelf);
        }

        self.router.whisper(&session.username, &to, &text)?;
        reply(session, ServerMessage::WhisperSent { to, text });
        Ok(())
    }

    /// Handle chat text for the current channel
    fn handle_say(&self, session: &Session, text: String) -> Result<(), AppError> {
        if !session.in_channel() {
            return Err(AppError::NotInChannel);
        }

        let msg = ServerMessage::Chat {
            from: session.username.clone(),
            text,
        };
        self.router.broadcast(session, &msg);
        Ok(())
    }
}

/// Queue a reply for the session that issued a command
fn reply(session: &Session, msg: ServerMessage) {
    let _ = session.deliver(msg);
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::thread;

    use tokio::sync::mpsc;

    use super::*;

    fn connect(
        server: &ChatServer,
        name: &str,
    ) -> (Arc<Session>, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(32);
        (server.register(name, &tx).unwrap(), rx)
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn error(message: &str) -> ServerMessage {
        ServerMessage::Error {
            message: message.to_string(),
        }
    }

    #[test]
    fn test_register_announces_to_others() {
        let server = ChatServer::new();
        let (_alice, mut alice_rx) = connect(&server, "alice");
        let (_bob, mut bob_rx) = connect(&server, "bob");

        assert_eq!(
            drain(&mut alice_rx),
            vec![ServerMessage::UserConnected {
                username: "bob".to_string()
            }]
        );
        assert!(drain(&mut bob_rx).is_empty());
    }

    #[test]
    fn test_register_rejects_bad_names() {
        let server = ChatServer::new();
        let (tx, _rx) = mpsc::channel(4);
        connect(&server, "alice");

        assert!(matches!(
            server.register("alice", &tx),
            Err(AppError::UsernameTaken(_))
        ));
        assert!(matches!(
            server.register("a b", &tx),
            Err(AppError::InvalidUsername)
        ));
        assert!(matches!(server.register("", &tx), Err(AppError::InvalidUsername)));
    }

    #[test]
    fn test_concurrent_same_name_one_wins() {
        const THREADS: usize = 8;
        let server = Arc::new(ChatServer::new());
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let server = Arc::clone(&server);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let (tx, _rx) = mpsc::channel(4);
                    barrier.wait();
                    server.register("alice", &tx)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let taken = results
            .iter()
            .filter(|r| matches!(r, Err(AppError::UsernameTaken(_))))
            .count();

        assert_eq!(ok, 1);
        assert_eq!(taken, THREADS - 1);
    }

    #[test]
    fn test_channel_chat_scenario() {
        let server = ChatServer::new();
        let (alice, mut alice_rx) = connect(&server, "alice");
        let (bob, mut bob_rx) = connect(&server, "bob");

        assert_eq!(server.handle_line(&alice, "/join lobby"), Flow::Continue);
        assert_eq!(server.handle_line(&bob, "/join lobby"), Flow::Continue);
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        server.handle_line(&alice, "hi");

        assert_eq!(
            drain(&mut bob_rx),
            vec![ServerMessage::Chat {
                from: "alice".to_string(),
                text: "hi".to_string()
            }]
        );
        assert!(drain(&mut alice_rx).is_empty());
    }

    #[test]
    fn test_join_replies_and_announces() {
        let server = ChatServer::new();
        let (alice, mut alice_rx) = connect(&server, "alice");
        let (bob, mut bob_rx) = connect(&server, "bob");
        drain(&mut alice_rx);

        server.handle_line(&alice, "/join lobby");
        assert_eq!(
            drain(&mut alice_rx),
            vec![ServerMessage::JoinedChannel {
                channel: "lobby".to_string()
            }]
        );

        server.handle_line(&bob, "/join lobby");
        assert_eq!(
            drain(&mut alice_rx),
            vec![ServerMessage::MemberJoined {
                username: "bob".to_string()
            }]
        );
        assert_eq!(
            drain(&mut bob_rx),
            vec![ServerMessage::JoinedChannel {
                channel: "lobby".to_string()
            }]
        );
    }

    #[test]
    fn test_join_switches_channels() {
        let server = ChatServer::new();
        let (alice, mut alice_rx) = connect(&server, "alice");
        let (bob, mut bob_rx) = connect(&server, "bob");
        server.handle_line(&bob, "/join lobby");
        server.handle_line(&alice, "/join lobby");
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        server.handle_line(&alice, "/join kitchen");

        assert_eq!(alice.current_channel().as_deref(), Some("kitchen"));
        assert_eq!(server.channels().members_of("lobby").len(), 1);
        assert_eq!(server.channels().members_of("kitchen").len(), 1);
        assert_eq!(
            drain(&mut alice_rx),
            vec![
                ServerMessage::LeftChannel {
                    channel: "lobby".to_string()
                },
                ServerMessage::JoinedChannel {
                    channel: "kitchen".to_string()
                },
            ]
        );
        assert_eq!(
            drain(&mut bob_rx),
            vec![ServerMessage::MemberLeft {
                username: "alice".to_string()
            }]
        );
    }

    #[test]
    fn test_join_same_channel_twice() {
        let server = ChatServer::new();
        let (alice, mut alice_rx) = connect(&server, "alice");
        server.handle_line(&alice, "/join lobby");
        drain(&mut alice_rx);

        server.handle_line(&alice, "/join lobby");

        assert_eq!(
            drain(&mut alice_rx),
            vec![error("You are already in channel: lobby")]
        );
        assert_eq!(server.channels().members_of("lobby").len(), 1);
    }

    #[test]
    fn test_join_without_name() {
        let server = ChatServer::new();
        let (alice, mut alice_rx) = connect(&server, "alice");

        server.handle_line(&alice, "/join");

        assert_eq!(drain(&mut alice_rx), vec![error("Please include channel name")]);
        assert!(!alice.in_channel());
    }

    #[test]
    fn test_leave_when_not_in_channel() {
        let server = ChatServer::new();
        let (alice, mut alice_rx) = connect(&server, "alice");

        assert_eq!(server.handle_line(&alice, "/leave"), Flow::Continue);

        assert_eq!(drain(&mut alice_rx), vec![error("You are not in a channel.")]);
        assert!(!alice.in_channel());
        assert!(server.registry().find("alice").is_some());
    }

    #[test]
    fn test_leave_clears_membership() {
        let server = ChatServer::new();
        let (alice, mut alice_rx) = connect(&server, "alice");
        server.handle_line(&alice, "/join lobby");
        drain(&mut alice_rx);

        server.handle_line(&alice, "/leave");

        assert!(!alice.in_channel());
        assert!(server.channels().members_of("lobby").is_empty());
        assert_eq!(
            drain(&mut alice_rx),
            vec![ServerMessage::LeftChannel {
                channel: "lobby".to_string()
            }]
        );
    }

    #[test]
    fn test_whisper_to_missing_user() {
        let server = ChatServer::new();
        let (alice, mut alice_rx) = connect(&server, "alice");
        let (_bob, mut bob_rx) = connect(&server, "bob");
        drain(&mut alice_rx);

        server.handle_line(&alice, "/whisper carol are you there");

        assert_eq!(
            drain(&mut alice_rx),
            vec![error("There is no user named: carol")]
        );
        assert!(drain(&mut bob_rx).is_empty());
    }

    #[test]
    fn test_whisper_delivered_and_echoed() {
        let server = ChatServer::new();
        let (alice, mut alice_rx) = connect(&server, "alice");
        let (_bob, mut bob_rx) = connect(&server, "bob");
        drain(&mut alice_rx);

        server.handle_line(&alice, "/whisper bob see you at noon");

        assert_eq!(
            drain(&mut bob_rx),
            vec![ServerMessage::Whisper {
                from: "alice".to_string(),
                text: "see you at noon".to_string()
            }]
        );
        assert_eq!(
            drain(&mut alice_rx),
            vec![ServerMessage::WhisperSent {
                to: "bob".to_string(),
                text: "see you at noon".to_string()
            }]
        );
    }

    #[test]
    fn test_whisper_to_self_rejected() {
        let server = ChatServer::new();
        let (alice, mut alice_rx) = connect(&server, "alice");

        server.handle_line(&alice, "/whisper alice hello me");

        assert_eq!(
            drain(&mut alice_rx),
            vec![error("Unfortunately you cannot whisper to yourself.")]
        );
    }

    #[test]
    fn test_users_listing() {
        let server = ChatServer::new();
        let (carol, mut carol_rx) = connect(&server, "carol");
        let (_alice, _a) = connect(&server, "alice");
        drain(&mut carol_rx);

        server.handle_line(&carol, "/users");

        assert_eq!(
            drain(&mut carol_rx),
            vec![ServerMessage::UserList {
                in_channel: false,
                names: vec!["alice".to_string(), "carol".to_string()]
            }]
        );
    }

    #[test]
    fn test_chat_outside_channel() {
        let server = ChatServer::new();
        let (alice, mut alice_rx) = connect(&server, "alice");
        let (_bob, mut bob_rx) = connect(&server, "bob");
        drain(&mut alice_rx);

        server.handle_line(&alice, "anyone here?");

        assert_eq!(drain(&mut alice_rx), vec![error("You are not in a channel.")]);
        assert!(drain(&mut bob_rx).is_empty());
    }

    #[test]
    fn test_exit() {
        let server = ChatServer::new();
        let (alice, mut alice_rx) = connect(&server, "alice");

        assert_eq!(server.handle_line(&alice, "/exit"), Flow::Disconnect);
        assert_eq!(drain(&mut alice_rx), vec![ServerMessage::Disconnecting]);
    }

    #[test]
    fn test_disconnect_cleans_up_once() {
        let server = ChatServer::new();
        let (alice, mut alice_rx) = connect(&server, "alice");
        let (bob, mut bob_rx) = connect(&server, "bob");
        server.handle_line(&alice, "/join lobby");
        server.handle_line(&bob, "/join lobby");
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        server.disconnect(&alice);
        server.disconnect(&alice);

        assert!(server.registry().find("alice").is_none());
        assert!(!alice.in_channel());
        let members = server.channels().members_of("lobby");
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].username, "bob");

        let received = drain(&mut bob_rx);
        assert_eq!(
            received,
            vec![
                ServerMessage::MemberLeft {
                    username: "alice".to_string()
                },
                ServerMessage::UserDisconnected {
                    username: "alice".to_string()
                },
            ]
        );
        assert!(drain(&mut alice_rx).is_empty());
    }

    #[test]
    fn test_name_reusable_after_disconnect() {
        let server = ChatServer::new();
        let (alice, _rx) = connect(&server, "alice");
        server.disconnect(&alice);

        let (again, _rx2) = connect(&server, "alice");
        assert_ne!(again.id, alice.id);
    }
}
