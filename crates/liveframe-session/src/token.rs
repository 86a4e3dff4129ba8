//! Tamper-evident session tokens.
//!
//! A token is `hex(payload_json) + "." + hex(hmac_sha256(key, payload_json))`.
//! The payload is readable by anyone holding the token; the signature
//! only guarantees it was produced by this server. Tokens therefore
//! carry view state, never secrets.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use liveframe_types::SessionId;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;

use crate::error::{SessionError, SessionLoadError};

type HmacSha256 = Hmac<Sha256>;

/// Length of generated ephemeral keys in bytes.
const EPHEMERAL_KEY_LEN: usize = 32;

/// The signed content of a session token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPayload {
    /// Session the token belongs to.
    pub session_id: SessionId,
    /// Path of the view the snapshot was taken from.
    pub view: String,
    /// Serialized view state.
    pub state: Value,
    /// Unix timestamp (seconds) when the token was signed.
    pub issued_at: i64,
}

impl TokenPayload {
    /// Build a payload stamped with the current time.
    pub fn new(session_id: SessionId, view: impl Into<String>, state: Value) -> Self {
        Self {
            session_id,
            view: view.into(),
            state,
            issued_at: Utc::now().timestamp(),
        }
    }
}

/// Signs and verifies session tokens with a shared secret.
#[derive(Clone)]
pub struct TokenSigner {
    key: Vec<u8>,
    max_age_secs: u64,
}

impl core::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("key", &"<redacted>")
            .field("max_age_secs", &self.max_age_secs)
            .finish()
    }
}

impl TokenSigner {
    /// Create a signer from a secret. `max_age_secs == 0` disables expiry.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Key`] if the secret is empty.
    pub fn new(secret: &[u8], max_age_secs: u64) -> Result<Self, SessionError> {
        if secret.is_empty() {
            return Err(SessionError::Key(String::from("secret must not be empty")));
        }
        Ok(Self {
            key: secret.to_vec(),
            max_age_secs,
        })
    }

    /// Create a signer with a random key. Tokens it signs become invalid
    /// once the process exits.
    pub fn ephemeral(max_age_secs: u64) -> Self {
        let mut key = vec![0_u8; EPHEMERAL_KEY_LEN];
        rand::rng().fill_bytes(&mut key);
        Self { key, max_age_secs }
    }

    /// Configured maximum token age in seconds (0 = unlimited).
    pub const fn max_age_secs(&self) -> u64 {
        self.max_age_secs
    }

    /// Sign a payload into a token string.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Serialization`] if the payload cannot be
    /// encoded.
    pub fn sign(&self, payload: &TokenPayload) -> Result<String, SessionError> {
        let body = serde_json::to_vec(payload)?;
        let mut mac = self.mac()?;
        mac.update(&body);
        let signature = mac.finalize().into_bytes();
        Ok(format!("{}.{}", hex::encode(&body), hex::encode(signature)))
    }

    /// Verify a token against the current time.
    pub fn verify(&self, token: &str) -> Result<TokenPayload, SessionLoadError> {
        self.verify_at(token, Utc::now())
    }

    /// Verify a token as if the current time were `now`.
    pub fn verify_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenPayload, SessionLoadError> {
        let (body_hex, sig_hex) = token
            .trim()
            .split_once('.')
            .ok_or_else(|| SessionLoadError::Malformed(String::from("missing separator")))?;
        let body = hex::decode(body_hex)
            .map_err(|e| SessionLoadError::Malformed(format!("payload: {e}")))?;
        let signature = hex::decode(sig_hex)
            .map_err(|e| SessionLoadError::Malformed(format!("signature: {e}")))?;

        let mut mac = self.mac()?;
        mac.update(&body);
        // Constant-time comparison.
        mac.verify_slice(&signature)
            .map_err(|e| {
                tracing::trace!(error = %e, "session token signature rejected");
                SessionLoadError::BadSignature
            })?;

        let payload: TokenPayload = serde_json::from_slice(&body)
            .map_err(|e| SessionLoadError::Malformed(format!("payload json: {e}")))?;

        if self.max_age_secs > 0 {
            let age_secs = now.timestamp().saturating_sub(payload.issued_at);
            let age = u64::try_from(age_secs.max(0)).unwrap_or(0);
            if age > self.max_age_secs {
                return Err(SessionLoadError::Expired {
                    age_secs,
                    max_age_secs: self.max_age_secs,
                });
            }
        }

        Ok(payload)
    }

    fn mac(&self) -> Result<HmacSha256, SessionError> {
        <HmacSha256 as Mac>::new_from_slice(&self.key)
            .map_err(|e| SessionError::Key(e.to_string()))
    }
}
