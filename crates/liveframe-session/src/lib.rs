//! Session continuity for the Liveframe engine.
//!
//! A page is first rendered over plain HTTP, then the bridge script
//! upgrades to a live connection. State crosses that gap (and any later
//! reconnect) in two places:
//!
//! - a **session token**, signed with HMAC-SHA256 and held by the
//!   client, embedding the session id and a state snapshot;
//! - a **session store**, keyed by session id, holding the newest
//!   snapshot saved by a live socket.
//!
//! Loading is fail-soft: a missing, corrupt, forged, or expired token
//! resumes as a fresh session rather than an error.
//!
//! # Modules
//!
//! - [`error`] -- [`SessionLoadError`] and [`SessionError`].
//! - [`token`] -- [`TokenSigner`] and the signed [`TokenPayload`].
//! - [`store`] -- [`SessionStore`] trait and [`MemorySessionStore`].
//! - [`manager`] -- [`SessionManager`], the facade the engine uses.

pub mod error;
pub mod manager;
pub mod store;
pub mod token;

pub use error::{SessionError, SessionLoadError};
pub use manager::{ResumeSource, Resumed, SessionManager};
pub use store::{MemorySessionStore, SessionStore, StoredSession};
pub use token::{TokenPayload, TokenSigner};
