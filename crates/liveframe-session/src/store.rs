//! Server-side session snapshot storage.
//!
//! Sockets save their state here on close and periodically while open.
//! The store is the only resource written by many socket workers at once,
//! so implementations must be [`Send`] + [`Sync`] and internally
//! synchronized.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use liveframe_types::SessionId;
use serde_json::Value;

use crate::error::SessionError;

/// Default number of sessions kept by [`MemorySessionStore`].
pub const DEFAULT_STORE_CAPACITY: usize = 10_000;

/// A state snapshot saved for a session.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    /// Path of the view the snapshot belongs to.
    pub view: String,
    /// Serialized view state.
    pub state: Value,
    /// When the snapshot was saved.
    pub saved_at: DateTime<Utc>,
}

impl StoredSession {
    /// Create a snapshot stamped with the current time.
    pub fn new(view: impl Into<String>, state: Value) -> Self {
        Self {
            view: view.into(),
            state,
            saved_at: Utc::now(),
        }
    }
}

/// Storage for session snapshots keyed by [`SessionId`].
pub trait SessionStore: Send + Sync {
    /// Fetch the newest snapshot for a session, if one was saved.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the backend cannot be read.
    fn load(&self, id: SessionId) -> Result<Option<StoredSession>, SessionError>;

    /// Save (or overwrite) the snapshot for a session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the backend cannot be written.
    fn save(&self, id: SessionId, session: StoredSession) -> Result<(), SessionError>;

    /// Forget a session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the backend cannot be written.
    fn remove(&self, id: SessionId) -> Result<(), SessionError>;
}

/// In-process [`SessionStore`] backed by a locked hash map.
///
/// Bounded: when full, saving a new session evicts the one saved least
/// recently.
#[derive(Debug)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, StoredSession>>,
    capacity: usize,
}

impl MemorySessionStore {
    /// Create a store holding at most [`DEFAULT_STORE_CAPACITY`] sessions.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_STORE_CAPACITY)
    }

    /// Create a store holding at most `capacity` sessions (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Number of stored sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().map_or(0, |s| s.len())
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, id: SessionId) -> Result<Option<StoredSession>, SessionError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|e| SessionError::Poisoned(e.to_string()))?;
        Ok(sessions.get(&id).cloned())
    }

    fn save(&self, id: SessionId, session: StoredSession) -> Result<(), SessionError> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| SessionError::Poisoned(e.to_string()))?;

        if !sessions.contains_key(&id) && sessions.len() >= self.capacity {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, s)| s.saved_at)
                .map(|(k, _)| *k);
            if let Some(oldest) = oldest {
                sessions.remove(&oldest);
                tracing::debug!(session_id = %oldest, "evicted oldest session snapshot");
            }
        }

        sessions.insert(id, session);
        Ok(())
    }

    fn remove(&self, id: SessionId) -> Result<(), SessionError> {
        self.sessions
            .write()
            .map_err(|e| SessionError::Poisoned(e.to_string()))?
            .remove(&id);
        Ok(())
    }
}
