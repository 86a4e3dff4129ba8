//! Error types for session loading and saving.
//!
//! Load failures ([`SessionLoadError`]) are never fatal: the manager logs
//! them and falls back to a fresh session. Save failures
//! ([`SessionError`]) are reported to the caller, which logs them and
//! keeps the connection alive.

/// Reasons a presented session credential was not accepted.
#[derive(Debug, thiserror::Error)]
pub enum SessionLoadError {
    /// The token is not `payload.signature` hex.
    #[error("malformed session token: {0}")]
    Malformed(String),

    /// The signature does not match the payload.
    #[error("session token signature mismatch")]
    BadSignature,

    /// The token is older than the configured maximum age.
    #[error("session token expired ({age_secs}s old, max {max_age_secs}s)")]
    Expired {
        /// Age of the token in seconds.
        age_secs: i64,
        /// Configured maximum age in seconds.
        max_age_secs: u64,
    },

    /// The token was issued for a different view.
    #[error("session token issued for view {found}, expected {expected}")]
    ViewMismatch {
        /// View the token is being presented to.
        expected: String,
        /// View named inside the token.
        found: String,
    },

    /// The signer or the store failed while checking the credential.
    #[error("session backend error: {0}")]
    Backend(#[from] SessionError),
}

/// Errors raised while signing tokens or writing the store.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A snapshot or payload could not be serialized.
    #[error("session serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The signing key was rejected.
    #[error("invalid signing key: {0}")]
    Key(String),

    /// A lock guarding the store was poisoned by a panicking writer.
    #[error("session store lock poisoned: {0}")]
    Poisoned(String),
}
