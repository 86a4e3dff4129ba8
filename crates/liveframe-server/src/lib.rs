//! HTTP and `WebSocket` surface for Liveframe live views.
//!
//! For every registered view the router serves:
//!
//! - `GET <path>` -- the first render as a full HTML page, with the
//!   session token in a cookie and in the live root's data attributes
//! - `GET /live/ws<path>` -- the `WebSocket` upgrade that mounts the view
//!   on a live socket
//!
//! plus the shared endpoints `GET /live.js`, `GET /live.js.map`, and
//! `GET /health`.
//!
//! # Architecture
//!
//! Handlers are thin: they resolve the view in the [`ViewRegistry`],
//! pick the session credential out of the request, and hand over to
//! `liveframe-core`. Each upgraded socket is driven by a core
//! [`Supervisor`] over a [`ws::WsTransport`].
//!
//! [`ViewRegistry`]: liveframe_core::ViewRegistry
//! [`Supervisor`]: liveframe_core::Supervisor

pub mod assets;
pub mod cookie;
pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod shell;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use error::HttpError;
pub use router::build_router;
pub use server::{ServerError, serve_until, start_server};
pub use state::AppState;
