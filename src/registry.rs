//! Registry of connected sessions
//!
//! The authoritative username → session map. Every operation takes the one
//! lock for its whole duration, so registration is a single check-and-insert
//! and listings are consistent snapshots.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::error::AppError;
use crate::session::{Outbound, Session};

/// All registered sessions keyed by case-sensitive username
#[derive(Debug, Default)]
pub struct Registry {
    sessions: Mutex<BTreeMap<String, Arc<Session>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `username` for a new session bound to `outbound`
    ///
    /// Fails with `UsernameTaken` if any active session holds the name.
    pub fn try_register(
        &self,
        username: &str,
        outbound: &Outbound,
    ) -> Result<Arc<Session>, AppError> {
        let mut sessions = self.lock();
        match sessions.entry(username.to_string()) {
            Entry::Occupied(_) => Err(AppError::UsernameTaken(username.to_string())),
            Entry::Vacant(slot) => {
                let session = Arc::new(Session::new(username.to_string(), outbound.clone()));
                slot.insert(Arc::clone(&session));
                debug!(%username, id = %session.id, total = sessions.len(), "session registered");
                Ok(session)
            }
        }
    }

    /// Remove `session` from the registry
    ///
    /// Returns false if it was not present. A newer session that reclaimed
    /// the same username is left untouched.
    pub fn unregister(&self, session: &Session) -> bool {
        let mut sessions = self.lock();
        let is_current = sessions
            .get(&session.username)
            .is_some_and(|current| current.id == session.id);
        if !is_current {
            return false;
        }

        sessions.remove(&session.username);
        debug!(username = %session.username, total = sessions.len(), "session unregistered");
        true
    }

    /// Snapshot of all sessions, ordered by username
    pub fn list_all(&self) -> Vec<Arc<Session>> {
        self.lock().values().cloned().collect()
    }

    /// Exact-match lookup
    pub fn find(&self, username: &str) -> Option<Arc<Session>> {
        self.lock().get(username).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}
