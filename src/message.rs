//! Line protocol definitions
//!
//! Inbound: one command per line, first token is the command when it is one of
//! the known slash commands, otherwise the whole line is channel chat.
//! Outbound: `ServerMessage` renders to one or more text lines; system lines
//! carry the `>> ` marker.

use std::fmt;

use crate::error::AppError;

/// Marker prefixed to every system line
pub const SYSTEM_PREFIX: &str = ">> ";

const HELP_LINES: &[&str] = &[
    "Following is a list of available commands:",
    "To join a channel, type: /join (e.g. /join MikesRoom)",
    "To leave a channel, type: /leave",
    "To whisper to another user, type: /whisper, followed by the",
    "user and the message (e.g. /whisper joel see you at noon!)",
    "To display a list of online users, type /users. If you are",
    "in a channel, users in the channel will be displayed.",
    "Otherwise, all online users on the server will be displayed.",
    "To exit from the server, type /exit",
    "To display this list again, type /help",
];

/// Client → Server command
///
/// Parsed from one inbound line of a registered session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Join (or switch to) a channel
    Join { channel: String },
    /// Leave the current channel
    Leave,
    /// Private message to any online user
    Whisper { to: String, text: String },
    /// List online users
    Users,
    /// Show the command list
    Help,
    /// Disconnect from the server
    Exit,
    /// Any other line: chat text for the current channel
    Say(String),
}

impl Command {
    /// Parse one inbound line
    ///
    /// Returns a usage error when a known command is missing its arguments.
    pub fn parse(line: &str) -> Result<Self, AppError> {
        let mut args = line.splitn(3, ' ');
        let command = args.next().unwrap_or_default();

        match command {
            "/join" => match args.next().filter(|c| !c.is_empty()) {
                Some(channel) => Ok(Command::Join {
                    channel: channel.to_string(),
                }),
                None => Err(AppError::MissingChannel),
            },
            "/whisper" => {
                let to = args.next().filter(|t| !t.is_empty());
                let text = args.next().filter(|t| !t.is_empty());
                match (to, text) {
                    (Some(to), Some(text)) => Ok(Command::Whisper {
                        to: to.to_string(),
                        text: text.to_string(),
                    }),
                    _ => Err(AppError::MissingWhisperArgs),
                }
            }
            "/leave" => Ok(Command::Leave),
            "/users" => Ok(Command::Users),
            "/help" => Ok(Command::Help),
            "/exit" => Ok(Command::Exit),
            _ => Ok(Command::Say(line.to_string())),
        }
    }
}

/// Server → Client message
///
/// Queued on a session's outbound channel and rendered by its writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// First lines sent on a new connection
    Greeting { local_addr: String },
    /// Requested username is held by another session
    UsernameTaken,
    /// Requested username is malformed
    InvalidUsername,
    /// Registration succeeded
    Welcome { username: String },
    /// Command list
    Help,
    /// This session joined a channel
    JoinedChannel { channel: String },
    /// This session left a channel
    LeftChannel { channel: String },
    /// Another member joined this session's channel
    MemberJoined { username: String },
    /// Another member left this session's channel
    MemberLeft { username: String },
    /// Channel chat line
    Chat { from: String, text: String },
    /// Private message received
    Whisper { from: String, text: String },
    /// Echo of a whisper this session sent
    WhisperSent { to: String, text: String },
    /// Online user listing
    UserList { in_channel: bool, names: Vec<String> },
    /// Server-wide connect notice
    UserConnected { username: String },
    /// Server-wide disconnect notice
    UserDisconnected { username: String },
    /// Reply to `/exit`
    Disconnecting,
    /// User-facing error
    Error { message: String },
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = SYSTEM_PREFIX;
        match self {
            ServerMessage::Greeting { local_addr } => {
                write!(f, "{p}Connected to: {local_addr}.\n{p}Please enter your username:")
            }
            ServerMessage::UsernameTaken => {
                write!(f, "{p}Username already taken. Please enter a new one:")
            }
            ServerMessage::InvalidUsername => write!(
                f,
                "{p}Usernames must be non-empty and contain no spaces. Please enter a new one:"
            ),
            ServerMessage::Welcome { username } => write!(f, "{p}Welcome, {username}."),
            ServerMessage::Help => {
                let lines: Vec<String> = HELP_LINES.iter().map(|l| format!("{p}{l}")).collect();
                write!(f, "{}", lines.join("\n"))
            }
            ServerMessage::JoinedChannel { channel } => write!(f, "{p}Joined channel: {channel}"),
            ServerMessage::LeftChannel { channel } => write!(f, "{p}Left channel: {channel}"),
            ServerMessage::MemberJoined { username } => {
                write!(f, "{p}{username} joined the channel")
            }
            ServerMessage::MemberLeft { username } => write!(f, "{p}{username} left the channel"),
            ServerMessage::Chat { from, text } => write!(f, "{from}: {text}"),
            ServerMessage::Whisper { from, text } => write!(f, "{from}:> {text}"),
            ServerMessage::WhisperSent { to, text } => write!(f, "{p}To {to}: {text}"),
            ServerMessage::UserList { in_channel, names } => {
                let scope = if *in_channel { "in channel" } else { "on server" };
                write!(f, "{p}Users online {scope}:")?;
                for name in names {
                    write!(f, "\n{p}{name}")?;
                }
                Ok(())
            }
            ServerMessage::UserConnected { username } => {
                write!(f, "{p}User connected: {username}")
            }
            ServerMessage::UserDisconnected { username } => {
                write!(f, "{p}User disconnected: {username}")
            }
            ServerMessage::Disconnecting => write!(f, "{p}Disconnecting from server."),
            ServerMessage::Error { message } => write!(f, "{p}{message}"),
        }
    }
}

/// Convert AppError to ServerMessage for client notification
impl From<AppError> for ServerMessage {
    fn from(err: AppError) -> Self {
        match err {
            AppError::UsernameTaken(_) => ServerMessage::UsernameTaken,
            AppError::InvalidUsername => ServerMessage::InvalidUsername,
            other => {
                let message = match other {
                    AppError::RecipientNotFound(name) => format!("There is no user named: {name}"),
                    AppError::WhisperToSelf => {
                        "Unfortunately you cannot whisper to yourself.".to_string()
                    }
                    AppError::NotInChannel => "You are not in a channel.".to_string(),
                    AppError::AlreadyInChannel(channel) => {
                        format!("You are already in channel: {channel}")
                    }
                    AppError::MissingChannel => "Please include channel name".to_string(),
                    AppError::MissingWhisperArgs => {
                        "Please include recipient and message".to_string()
                    }
                    // Fatal errors close the connection; clients rarely see these
                    _ => "Internal error".to_string(),
                };
                ServerMessage::Error { message }
            }
        }
    }
}
