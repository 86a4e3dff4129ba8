//! Session facade used by the HTTP layer and the socket workers.
//!
//! [`SessionManager`] pairs a [`TokenSigner`] with a [`SessionStore`]:
//! resuming verifies the client's token and then prefers the newest
//! snapshot in the store, issuing signs a fresh token, and persisting
//! writes the store and returns a refreshed token.

use std::sync::Arc;

use liveframe_types::SessionId;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{SessionError, SessionLoadError};
use crate::store::{MemorySessionStore, SessionStore, StoredSession};
use crate::token::{TokenPayload, TokenSigner};

/// Where a resumed snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeSource {
    /// No usable credential; a new session was started.
    Fresh,
    /// The snapshot embedded in the token.
    Token,
    /// A newer snapshot saved in the store.
    Store,
}

/// Result of resuming a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Resumed {
    /// Session id to use for this page or connection.
    pub session_id: SessionId,
    /// Prior state, if any was recovered.
    pub snapshot: Option<Value>,
    /// Where the snapshot came from.
    pub source: ResumeSource,
}

impl Resumed {
    /// A brand new session with no prior state.
    pub fn fresh() -> Self {
        Self {
            session_id: SessionId::new(),
            snapshot: None,
            source: ResumeSource::Fresh,
        }
    }
}

/// Signs, verifies, and stores session state.
#[derive(Clone)]
pub struct SessionManager {
    signer: TokenSigner,
    store: Arc<dyn SessionStore>,
}

impl core::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionManager")
            .field("signer", &self.signer)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Create a manager over an explicit store.
    pub fn new(signer: TokenSigner, store: Arc<dyn SessionStore>) -> Self {
        Self { signer, store }
    }

    /// Create a manager over a fresh [`MemorySessionStore`].
    pub fn in_memory(signer: TokenSigner) -> Self {
        Self::new(signer, Arc::new(MemorySessionStore::new()))
    }

    /// The token signer.
    pub const fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    /// The backing store.
    pub fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    /// Resume a session, falling back to a fresh one on any failure.
    pub fn resume(&self, view: &str, credential: Option<&str>) -> Resumed {
        let Some(credential) = credential.filter(|c| !c.trim().is_empty()) else {
            return Resumed::fresh();
        };
        match self.try_resume(view, credential) {
            Ok(resumed) => {
                debug!(
                    session_id = %resumed.session_id,
                    view,
                    source = ?resumed.source,
                    "session resumed"
                );
                resumed
            }
            Err(e) => {
                warn!(view, error = %e, "session credential rejected, starting fresh");
                Resumed::fresh()
            }
        }
    }

    /// Resume a session, reporting why a credential was rejected.
    pub fn try_resume(&self, view: &str, credential: &str) -> Result<Resumed, SessionLoadError> {
        let payload = self.signer.verify(credential)?;
        if payload.view != view {
            return Err(SessionLoadError::ViewMismatch {
                expected: view.to_owned(),
                found: payload.view,
            });
        }

        match self.store.load(payload.session_id) {
            Ok(Some(stored)) if stored.view == view => Ok(Resumed {
                session_id: payload.session_id,
                snapshot: Some(stored.state),
                source: ResumeSource::Store,
            }),
            Ok(_) => Ok(Resumed {
                session_id: payload.session_id,
                snapshot: Some(payload.state),
                source: ResumeSource::Token,
            }),
            Err(e) => {
                warn!(
                    session_id = %payload.session_id,
                    error = %e,
                    "session store read failed, using token snapshot"
                );
                Ok(Resumed {
                    session_id: payload.session_id,
                    snapshot: Some(payload.state),
                    source: ResumeSource::Token,
                })
            }
        }
    }

    /// Sign a token for the given session and state.
    pub fn issue(
        &self,
        session_id: SessionId,
        view: &str,
        state: Value,
    ) -> Result<String, SessionError> {
        self.signer.sign(&TokenPayload::new(session_id, view, state))
    }

    /// Save the state to the store and return a refreshed token.
    pub fn persist(
        &self,
        session_id: SessionId,
        view: &str,
        state: Value,
    ) -> Result<String, SessionError> {
        let token = self.issue(session_id, view, state.clone())?;
        self.store
            .save(session_id, StoredSession::new(view, state))?;
        Ok(token)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn manager() -> SessionManager {
        SessionManager::in_memory(TokenSigner::new(b"secret", 3600).unwrap())
    }

    #[test]
    fn missing_credential_is_fresh() {
        let m = manager();
        assert_eq!(m.resume("/clock", None).source, ResumeSource::Fresh);
        assert_eq!(m.resume("/clock", Some("  ")).source, ResumeSource::Fresh);
    }

    #[test]
    fn invalid_credential_is_fresh() {
        let m = manager();
        let resumed = m.resume("/clock", Some("deadbeef.cafe"));
        assert_eq!(resumed.source, ResumeSource::Fresh);
        assert!(resumed.snapshot.is_none());
    }

    #[test]
    fn token_snapshot_is_recovered() {
        let m = manager();
        let id = SessionId::new();
        let token = m.issue(id, "/clock", json!({"n": 3})).unwrap();
        let resumed = m.resume("/clock", Some(&token));
        assert_eq!(resumed.session_id, id);
        assert_eq!(resumed.snapshot, Some(json!({"n": 3})));
        assert_eq!(resumed.source, ResumeSource::Token);
    }

    #[test]
    fn store_snapshot_wins_over_token() {
        let m = manager();
        let id = SessionId::new();
        let token = m.issue(id, "/clock", json!({"n": 3})).unwrap();
        m.persist(id, "/clock", json!({"n": 9})).unwrap();

        let resumed = m.resume("/clock", Some(&token));
        assert_eq!(resumed.snapshot, Some(json!({"n": 9})));
        assert_eq!(resumed.source, ResumeSource::Store);
    }

    #[test]
    fn token_for_other_view_is_rejected() {
        let m = manager();
        let token = m.issue(SessionId::new(), "/counter", json!(1)).unwrap();
        assert!(matches!(
            m.try_resume("/clock", &token),
            Err(SessionLoadError::ViewMismatch { .. })
        ));
        assert_eq!(m.resume("/clock", Some(&token)).source, ResumeSource::Fresh);
    }

    #[test]
    fn persisted_token_round_trips() {
        let m = manager();
        let id = SessionId::new();
        let token = m.persist(id, "/clock", json!({"n": 5})).unwrap();
        let payload = m.signer().verify(&token).unwrap();
        assert_eq!(payload.session_id, id);
        assert_eq!(payload.state, json!({"n": 5}));
    }
}
