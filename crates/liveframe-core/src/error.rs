//! Error taxonomy for the live view engine.
//!
//! Errors are scoped to the socket that raised them; nothing here is
//! shared between connections. Severity by type:
//!
//! | Error | Effect |
//! |-------|--------|
//! | [`UnknownEventError`] | logged, event ignored, socket stays open |
//! | [`HandlerError`] | logged, state unchanged, generic error frame sent |
//! | [`RenderError`] | socket closed with a generic error frame |
//! | [`TransportWriteError`] | counted; repeated failures close the socket |
//! | [`MountError`] | connection attempt rejected |
//!
//! Session load failures never surface here: the session manager
//! degrades them to a fresh session.

use liveframe_session::SessionError;

use crate::router::Origin;

/// Message sent to clients in place of internal error details.
pub const GENERIC_ERROR_MESSAGE: &str = "internal error";

/// An event name with no handler accepting it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no handler for {origin} event {name:?}")]
pub struct UnknownEventError {
    /// Event name as received.
    pub name: String,
    /// Where the event came from.
    pub origin: Origin,
}

/// A handler reported failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    /// The event parameters were missing or malformed.
    #[error("invalid event parameters: {0}")]
    InvalidParams(String),

    /// Application logic failed.
    #[error("{0}")]
    Failed(String),
}

/// Why dispatching an event did not produce a new state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// No handler accepts the event.
    #[error(transparent)]
    Unknown(#[from] UnknownEventError),

    /// The handler ran and failed.
    #[error("handler for {name:?} failed: {source}")]
    Handler {
        /// Event name.
        name: String,
        /// The handler's error.
        source: HandlerError,
    },
}

/// The view could not turn state into markup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// A template failed to load or render.
    #[error("template error: {0}")]
    Template(String),

    /// Any other rendering failure.
    #[error("render failed: {0}")]
    Failed(String),
}

/// The view's mount function failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MountError {
    /// Request parameters were rejected.
    #[error("invalid mount parameters: {0}")]
    InvalidParams(String),

    /// Application logic failed.
    #[error("mount failed: {0}")]
    Failed(String),
}

/// A message could not be written to the transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportWriteError {
    /// The peer is gone.
    #[error("transport closed")]
    Closed,

    /// The write failed.
    #[error("transport write failed: {0}")]
    Io(String),
}

/// Errors building views or serving them.
#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    /// The view definition lacks a required part.
    #[error("view {path} is missing its {part} function")]
    Incomplete {
        /// View path.
        path: String,
        /// Missing part (`mount` or `render`).
        part: &'static str,
    },

    /// A handler was registered under a reserved event name.
    #[error("event name {0:?} is reserved")]
    ReservedEvent(String),

    /// Two handlers were registered under the same event name.
    #[error("duplicate handler for event {0:?}")]
    DuplicateEvent(String),

    /// A view path was not absolute.
    #[error("invalid view path {0:?}: must start with '/'")]
    InvalidPath(String),

    /// Two views were registered under the same path.
    #[error("duplicate view path {0:?}")]
    DuplicatePath(String),

    /// Mounting failed.
    #[error(transparent)]
    Mount(#[from] MountError),

    /// Rendering failed.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Signing or saving the session failed.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// State could not be serialized into a snapshot.
    #[error("state snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),
}
