//! Path-keyed registry of live views.
//!
//! Views over different state types are stored behind the object-safe
//! [`LiveRoute`] trait. The HTTP layer uses it for the two entry points of
//! a view: the static first render and the live connection.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use liveframe_session::SessionManager;
use liveframe_types::{ServerMessage, SessionId};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::SocketConfig;
use crate::error::ViewError;
use crate::lifecycle::{PhaseTrigger, ViewPhase};
use crate::socket::{CloseReason, SocketContext};
use crate::view::{LiveState, MountContext, View};
use crate::worker::{SocketSummary, SocketWorker};

/// Result of rendering a view over plain HTTP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticRender {
    /// Rendered markup for the live root.
    pub markup: String,
    /// Session the page belongs to.
    pub session_id: SessionId,
    /// Signed token carrying the mounted state.
    pub token: String,
    /// Phase the view reached: `MountedDisconnected` once mounted.
    pub phase: ViewPhase,
}

/// A mounted socket waiting for its transport.
///
/// Dropping it before [`PendingSocket::into_parts`] closes the socket with
/// [`CloseReason::Abandoned`].
pub struct PendingSocket {
    ctx: SocketContext,
    outbound: Option<mpsc::Receiver<ServerMessage>>,
    worker: Option<BoxFuture<'static, SocketSummary>>,
}

impl core::fmt::Debug for PendingSocket {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PendingSocket")
            .field("socket_id", &self.ctx.id())
            .finish_non_exhaustive()
    }
}

impl PendingSocket {
    /// The mounted socket.
    pub const fn context(&self) -> &SocketContext {
        &self.ctx
    }

    /// Take the socket handle, the outbound queue, and the worker future.
    pub fn into_parts(
        mut self,
    ) -> (
        SocketContext,
        mpsc::Receiver<ServerMessage>,
        BoxFuture<'static, SocketSummary>,
    ) {
        let ctx = self.ctx.clone();
        match (self.outbound.take(), self.worker.take()) {
            (Some(outbound), Some(worker)) => (ctx, outbound, worker),
            _ => {
                let (_, outbound) = mpsc::channel(1);
                let summary = SocketSummary::of(&ctx);
                (ctx, outbound, Box::pin(async move { summary }))
            }
        }
    }
}

impl Drop for PendingSocket {
    fn drop(&mut self) {
        if self.worker.is_some() && self.ctx.close(CloseReason::Abandoned) {
            debug!(socket_id = %self.ctx.id(), "pending socket dropped before upgrade");
        }
    }
}

/// The two entry points of a live view, independent of its state type.
pub trait LiveRoute: Send + Sync {
    /// Path the view is served at.
    fn path(&self) -> &str;

    /// Mount without a socket and render the first page.
    fn render_static<'a>(
        &'a self,
        sessions: &'a SessionManager,
        credential: Option<&'a str>,
        params: BTreeMap<String, String>,
    ) -> BoxFuture<'a, Result<StaticRender, ViewError>>;

    /// Mount on a new socket. The returned socket is ready to be driven
    /// by a transport.
    fn connect(
        self: Arc<Self>,
        sessions: Arc<SessionManager>,
        credential: Option<String>,
        params: BTreeMap<String, String>,
        config: SocketConfig,
    ) -> BoxFuture<'static, Result<PendingSocket, ViewError>>;
}

fn decode_prior<S: LiveState>(path: &str, snapshot: Option<Value>) -> Option<S> {
    let snapshot = snapshot?;
    match serde_json::from_value(snapshot) {
        Ok(state) => Some(state),
        Err(e) => {
            warn!(view = path, error = %e, "stored state does not fit view, mounting fresh");
            None
        }
    }
}

impl<S: LiveState> LiveRoute for View<S> {
    fn path(&self) -> &str {
        Self::path(self)
    }

    fn render_static<'a>(
        &'a self,
        sessions: &'a SessionManager,
        credential: Option<&'a str>,
        params: BTreeMap<String, String>,
    ) -> BoxFuture<'a, Result<StaticRender, ViewError>> {
        Box::pin(async move {
            let path = Self::path(self);
            let resumed = sessions.resume(path, credential);
            let prior = decode_prior::<S>(path, resumed.snapshot);
            let ctx = MountContext::http(path.to_owned(), params, resumed.session_id);
            let unmounted = ViewPhase::Unmounted;
            let state = self.mount(ctx, prior).await?;
            let phase = unmounted.next(PhaseTrigger::StaticMount).unwrap_or(unmounted);
            debug!(view = path, session_id = %resumed.session_id, ?phase, "static mount");
            let markup = self.render(&state)?;
            let token = sessions.issue(resumed.session_id, path, serde_json::to_value(&state)?)?;
            Ok(StaticRender {
                markup,
                session_id: resumed.session_id,
                token,
                phase,
            })
        })
    }

    fn connect(
        self: Arc<Self>,
        sessions: Arc<SessionManager>,
        credential: Option<String>,
        params: BTreeMap<String, String>,
        config: SocketConfig,
    ) -> BoxFuture<'static, Result<PendingSocket, ViewError>> {
        Box::pin(async move {
            let path = Self::path(&self).to_owned();
            let resumed = sessions.resume(&path, credential.as_deref());
            let prior = decode_prior::<S>(&path, resumed.snapshot);
            let (ctx, channels) = SocketContext::new(resumed.session_id, path.as_str(), &config);
            if prior.is_some() {
                ctx.advance_phase(PhaseTrigger::Resume);
            }

            let mount_ctx = MountContext::live(path, params, ctx.clone());
            let state = match self.mount(mount_ctx, prior).await {
                Ok(state) => state,
                Err(e) => {
                    ctx.close(CloseReason::MountFailed);
                    return Err(ViewError::Mount(e));
                }
            };
            ctx.advance_phase(PhaseTrigger::ConnectedMount);

            let worker = SocketWorker::new(
                self,
                ctx.clone(),
                state,
                channels.inbox,
                sessions,
                config.persist_interval(),
            );
            Ok(PendingSocket {
                ctx,
                outbound: Some(channels.outbound),
                worker: Some(Box::pin(worker.run())),
            })
        })
    }
}

/// Live views keyed by path.
#[derive(Default)]
pub struct ViewRegistry {
    views: BTreeMap<String, Arc<dyn LiveRoute>>,
}

impl core::fmt::Debug for ViewRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.views.keys()).finish()
    }
}

impl ViewRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a view under its path.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::DuplicatePath`] if the path is taken.
    pub fn register<V: LiveRoute + 'static>(&mut self, view: V) -> Result<(), ViewError> {
        let path = view.path().to_owned();
        if self.views.contains_key(&path) {
            return Err(ViewError::DuplicatePath(path));
        }
        self.views.insert(path, Arc::new(view));
        Ok(())
    }

    /// The view served at `path`.
    pub fn get(&self, path: &str) -> Option<Arc<dyn LiveRoute>> {
        self.views.get(path).cloned()
    }

    /// Registered paths in order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.views.keys().map(String::as_str)
    }

    /// Number of views.
    pub fn len(&self) -> usize {
        self.views.len()
    }

    /// Whether no views are registered.
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}
