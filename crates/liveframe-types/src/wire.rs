//! Frames exchanged with the bridge script over the live connection.
//!
//! All frames are JSON text, internally tagged on `"t"`. Server frames
//! carry no sequence number: per-socket serialization guarantees the
//! client sees patches in the order they were computed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::event::Event;
use crate::patch::{Patch, PatchOp};

/// A frame sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "t", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ClientMessage {
    /// A user-triggered event.
    Event {
        /// Event name.
        name: String,
        /// Event parameters (form values, data attributes).
        #[serde(default)]
        params: Value,
    },
    /// Keep-alive sent while the page is idle.
    Heartbeat,
}

impl ClientMessage {
    /// Decode a client text frame.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`serde_json::Error`] for malformed frames.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Convert an event frame into an [`Event`]. Heartbeats yield `None`.
    pub fn into_event(self) -> Option<Event> {
        match self {
            Self::Event { name, params } => Some(Event { name, params }),
            Self::Heartbeat => None,
        }
    }
}

/// A frame sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "t", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ServerMessage {
    /// DOM operations to apply to the live root.
    Patch {
        /// Operations in application order.
        ops: Vec<PatchOp>,
    },
    /// A refreshed session token for reconnecting.
    Session {
        /// Signed session token.
        token: String,
    },
    /// An application-defined message pushed by a handler.
    Push {
        /// Message name.
        name: String,
        /// Message payload.
        payload: Value,
    },
    /// A generic error notice. Never carries internal details.
    Error {
        /// Human readable message.
        message: String,
    },
}

impl ServerMessage {
    /// Encode as a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`serde_json::Error`] if a payload cannot be
    /// serialized.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<Patch> for ServerMessage {
    fn from(patch: Patch) -> Self {
        Self::Patch { ops: patch.ops }
    }
}
