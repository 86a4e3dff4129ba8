//! Server-driven live views.
//!
//! A live view is rendered once over plain HTTP, then kept up to date
//! over a persistent connection: the browser sends events, the server
//! runs handlers against per-connection state, re-renders, and sends
//! back only the DOM operations needed to match the new render.
//!
//! # Architecture
//!
//! Each connection is an actor. A [`worker`] task owns the state and
//! processes its inbox one event at a time; the [`supervisor`] drives the
//! transport, forwarding client frames into the inbox and queued frames
//! out to the client. The two share nothing but a [`SocketContext`],
//! whose close signal stops both and cancels pending self-events.
//!
//! ```text
//! transport --frames--> Supervisor --events--> inbox --> SocketWorker
//!     ^                                                      |
//!     +------------- outbound queue <-- patches <-- render + diff
//! ```
//!
//! # Modules
//!
//! - [`view`] -- [`View`] definitions and the mount context.
//! - [`router`] -- name-to-handler dispatch.
//! - [`socket`] -- the per-connection handle.
//! - [`markup`], [`diff`], [`render`] -- the render-diff pipeline.
//! - [`registry`] -- path-keyed views behind [`LiveRoute`].
//! - [`supervisor`] -- transport loop, idle timeout, teardown.
//! - [`config`] -- YAML configuration with environment overrides.

pub mod config;
pub mod diff;
pub mod error;
pub mod lifecycle;
pub mod markup;
pub mod registry;
pub mod render;
pub mod router;
pub mod socket;
pub mod supervisor;
pub mod view;
pub mod worker;

pub use config::{ConfigError, LiveConfig, LogFormat, SocketConfig};
pub use error::{
    DispatchError, HandlerError, MountError, RenderError, TransportWriteError, UnknownEventError,
    ViewError,
};
pub use lifecycle::ViewPhase;
pub use registry::{LiveRoute, PendingSocket, StaticRender, ViewRegistry};
pub use render::{RenderPipeline, TemplateRenderer};
pub use router::{EventRouter, Origin};
pub use socket::{CloseReason, ScheduledEvent, SocketContext, SocketStats};
pub use supervisor::{ConnectionGuard, ConnectionTracker, Frame, Supervisor, Transport};
pub use view::{LiveState, MountContext, View};
pub use worker::SocketSummary;
