//! View definitions.
//!
//! A [`View`] bundles a mount function, a pure render function, and an
//! [`EventRouter`]. Build one with [`View::builder`]:
//!
//! ```ignore
//! let view = View::builder("/counter")
//!     .mount(|_ctx, prior: Option<Counter>| async move { Ok(prior.unwrap_or_default()) })
//!     .render(|state: &Counter| Ok(format!("<p>{}</p>", state.n)))
//!     .handle_event("inc", |_ctx, mut state: Counter, _event| async move {
//!         state.n = state.n.saturating_add(1);
//!         Ok(state)
//!     })
//!     .build()?;
//! ```

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use liveframe_types::{Event, SessionId};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{HandlerError, MountError, RenderError, ViewError};
use crate::router::EventRouter;
use crate::socket::SocketContext;

/// Bounds every view state type satisfies.
///
/// State is cloned into handlers, serialized into session snapshots, and
/// shared across the worker task.
pub trait LiveState: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> LiveState for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Future returned by a mount function.
pub type MountFuture<S> = BoxFuture<'static, Result<S, MountError>>;

type MountFn<S> = Arc<dyn Fn(MountContext, Option<S>) -> MountFuture<S> + Send + Sync>;
type RenderFn<S> = Arc<dyn Fn(&S) -> Result<String, RenderError> + Send + Sync>;

/// What a mount function knows about the request.
#[derive(Debug, Clone)]
pub struct MountContext {
    path: String,
    params: BTreeMap<String, String>,
    session_id: SessionId,
    socket: Option<SocketContext>,
}

impl MountContext {
    /// Context for the plain HTTP render.
    pub const fn http(
        path: String,
        params: BTreeMap<String, String>,
        session_id: SessionId,
    ) -> Self {
        Self {
            path,
            params,
            session_id,
            socket: None,
        }
    }

    /// Context for mounting on a live socket.
    pub fn live(path: String, params: BTreeMap<String, String>, socket: SocketContext) -> Self {
        Self {
            path,
            params,
            session_id: socket.session_id(),
            socket: Some(socket),
        }
    }

    /// Request path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query parameters.
    pub const fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// A single query parameter.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Session id.
    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Whether the view is mounting on a live socket.
    pub const fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    /// The live socket, when connected.
    pub const fn socket(&self) -> Option<&SocketContext> {
        self.socket.as_ref()
    }
}

/// A routable live view over state `S`.
pub struct View<S> {
    path: String,
    mount: MountFn<S>,
    render: RenderFn<S>,
    router: EventRouter<S>,
}

impl<S> core::fmt::Debug for View<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("View")
            .field("path", &self.path)
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

impl<S: LiveState> View<S> {
    /// Start defining a view served at `path`.
    pub fn builder(path: impl Into<String>) -> ViewBuilder<S> {
        ViewBuilder {
            path: path.into(),
            mount: None,
            render: None,
            router: EventRouter::new(),
            error: None,
        }
    }

    /// Path the view is served at.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The view's event handlers.
    pub const fn router(&self) -> &EventRouter<S> {
        &self.router
    }

    /// Run the mount function.
    ///
    /// # Errors
    ///
    /// Returns whatever [`MountError`] the mount function reports.
    pub async fn mount(&self, ctx: MountContext, prior: Option<S>) -> Result<S, MountError> {
        (self.mount)(ctx, prior).await
    }

    /// Render `state` to markup. Must not mutate anything.
    ///
    /// # Errors
    ///
    /// Returns whatever [`RenderError`] the render function reports.
    pub fn render(&self, state: &S) -> Result<String, RenderError> {
        (self.render)(state)
    }
}

/// Builder for [`View`].
pub struct ViewBuilder<S> {
    path: String,
    mount: Option<MountFn<S>>,
    render: Option<RenderFn<S>>,
    router: EventRouter<S>,
    error: Option<ViewError>,
}

impl<S> core::fmt::Debug for ViewBuilder<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ViewBuilder")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl<S: LiveState> ViewBuilder<S> {
    /// Set the mount function. `prior` is the state recovered from the
    /// session, if any.
    #[must_use]
    pub fn mount<F, Fut>(mut self, mount: F) -> Self
    where
        F: Fn(MountContext, Option<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<S, MountError>> + Send + 'static,
    {
        self.mount = Some(Arc::new(
            move |ctx: MountContext, prior: Option<S>| -> MountFuture<S> {
                Box::pin(mount(ctx, prior))
            },
        ));
        self
    }

    /// Set the render function.
    #[must_use]
    pub fn render<F>(mut self, render: F) -> Self
    where
        F: Fn(&S) -> Result<String, RenderError> + Send + Sync + 'static,
    {
        self.render = Some(Arc::new(render));
        self
    }

    /// Handle an event from the client (or from the server itself).
    #[must_use]
    pub fn handle_event<F, Fut>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(SocketContext, S, Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<S, HandlerError>> + Send + 'static,
    {
        if let Err(e) = self.router.on_event(name, handler) {
            self.error.get_or_insert(e);
        }
        self
    }

    /// Handle an event only the server may send to this socket.
    #[must_use]
    pub fn handle_self<F, Fut>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(SocketContext, S, Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<S, HandlerError>> + Send + 'static,
    {
        if let Err(e) = self.router.on_self(name, handler) {
            self.error.get_or_insert(e);
        }
        self
    }

    /// Finish the view.
    ///
    /// # Errors
    ///
    /// Returns the first registration error, [`ViewError::InvalidPath`],
    /// or [`ViewError::Incomplete`] if mount or render is missing.
    pub fn build(self) -> Result<View<S>, ViewError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        if !self.path.starts_with('/') {
            return Err(ViewError::InvalidPath(self.path));
        }
        let Some(mount) = self.mount else {
            return Err(ViewError::Incomplete {
                path: self.path,
                part: "mount",
            });
        };
        let Some(render) = self.render else {
            return Err(ViewError::Incomplete {
                path: self.path,
                part: "render",
            });
        };
        Ok(View {
            path: self.path,
            mount,
            render,
            router: self.router,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::router::{MOUNT_EVENT, Origin};

    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    struct Counter {
        n: i64,
    }

    fn counter_view() -> ViewBuilder<Counter> {
        View::builder("/counter")
            .mount(|_ctx, prior: Option<Counter>| async move { Ok(prior.unwrap_or_default()) })
            .render(|state: &Counter| Ok(format!("<p>{}</p>", state.n)))
    }

    #[test]
    fn builds_complete_view() {
        let view = counter_view()
            .handle_event("inc", |_ctx, mut state: Counter, _event| async move {
                state.n = state.n.saturating_add(1);
                Ok(state)
            })
            .build()
            .unwrap();
        assert_eq!(view.path(), "/counter");
        assert!(view.router().accepts("inc", Origin::Client));
    }

    #[test]
    fn missing_render_is_incomplete() {
        let err = View::<Counter>::builder("/x")
            .mount(|_ctx, _prior| async { Ok(Counter::default()) })
            .build()
            .unwrap_err();
        assert!(matches!(err, ViewError::Incomplete { part: "render", .. }));
    }

    #[test]
    fn relative_path_is_rejected() {
        let err = View::<Counter>::builder("counter")
            .mount(|_ctx, _prior| async { Ok(Counter::default()) })
            .render(|_| Ok(String::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, ViewError::InvalidPath(_)));
    }

    #[test]
    fn reserved_handler_fails_build() {
        let err = counter_view()
            .handle_event(MOUNT_EVENT, |_ctx, state: Counter, _event| async move { Ok(state) })
            .build()
            .unwrap_err();
        assert!(matches!(err, ViewError::ReservedEvent(_)));
    }

    #[test]
    fn render_is_pure() {
        let view = counter_view().build().unwrap();
        let state = Counter { n: 7 };
        let first = view.render(&state).unwrap();
        let second = view.render(&state).unwrap();
        assert_eq!(first, second);
        assert_eq!(state, Counter { n: 7 });
    }

    #[tokio::test]
    async fn mount_receives_prior_state() {
        let view = counter_view().build().unwrap();
        let ctx = MountContext::http(String::from("/counter"), BTreeMap::new(), SessionId::new());
        assert!(!ctx.is_connected());
        let state = view.mount(ctx.clone(), Some(Counter { n: 3 })).await.unwrap();
        assert_eq!(state.n, 3);
        let state = view.mount(ctx, None).await.unwrap();
        assert_eq!(state.n, 0);
    }

    #[test]
    fn mount_context_reports_connection() {
        let (socket, _channels) = SocketContext::detached("/counter");
        let mut params = BTreeMap::new();
        params.insert(String::from("tz"), String::from("UTC"));
        let ctx = MountContext::live(String::from("/counter"), params, socket.clone());
        assert!(ctx.is_connected());
        assert_eq!(ctx.session_id(), socket.session_id());
        assert_eq!(ctx.param("tz"), Some("UTC"));
    }
}
