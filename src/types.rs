//! Basic type definitions for the chat server
//!
//! Provides:
//! - `SessionId`: UUID-based identity of one registered session
//! - `validate_username`: rules a candidate username must satisfy

use uuid::Uuid;

use crate::error::AppError;

/// Unique session identifier (newtype pattern)
///
/// Usernames can be reused once their holder disconnects, so membership
/// removal compares sessions by this id rather than by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Check that a candidate username is usable
///
/// Names are compared case-sensitively and must be non-empty with no
/// whitespace, since `/whisper` splits its arguments on spaces.
pub fn validate_username(candidate: &str) -> Result<(), AppError> {
    if candidate.is_empty() || candidate.chars().any(char::is_whitespace) {
        return Err(AppError::InvalidUsername);
    }
    Ok(())
}
