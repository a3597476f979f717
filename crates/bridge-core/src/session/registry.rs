//! Session registry
//!
//! In-memory map from session token to live session, using `DashMap` for
//! thread-safe access. The registry is the single source of truth for
//! whether a session is live.

use super::SessionToken;
use crate::error::BridgeError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Registry of live sessions keyed by token
pub struct SessionRegistry<S> {
    sessions: DashMap<SessionToken, Arc<S>>,
}

impl<S> SessionRegistry<S> {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Insert a session under its token
    ///
    /// The occupancy check and the insert are one atomic step, so two
    /// concurrent `put` calls for the same token cannot both succeed.
    pub fn put(&self, token: SessionToken, session: Arc<S>) -> Result<(), BridgeError> {
        match self.sessions.entry(token) {
            Entry::Occupied(occupied) => {
                Err(BridgeError::DuplicateSession(occupied.key().clone()))
            }
            Entry::Vacant(vacant) => {
                vacant.insert(session);
                Ok(())
            }
        }
    }

    /// Look up a live session by token
    pub fn get(&self, token: &SessionToken) -> Option<Arc<S>> {
        self.sessions.get(token).map(|entry| Arc::clone(&entry))
    }

    /// Remove a session; removing an absent token is a no-op
    pub fn remove(&self, token: &SessionToken) -> Option<Arc<S>> {
        self.sessions.remove(token).map(|(_, session)| session)
    }

    /// Check whether a token resolves to a live session
    pub fn contains(&self, token: &SessionToken) -> bool {
        self.sessions.contains_key(token)
    }

    /// Number of live sessions, consulted by admission control
    pub fn size(&self) -> usize {
        self.sessions.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl<S> Default for SessionRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> std::fmt::Debug for SessionRegistry<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.len())
            .finish()
    }
}
