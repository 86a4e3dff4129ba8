//! Event routing.
//!
//! An [`EventRouter`] maps event names to async handlers. Each handler
//! receives the socket context, an owned copy of the current state, and
//! the event, and returns the next state. Handlers registered with
//! [`EventRouter::on_self`] only accept events the server scheduled for
//! itself; a client sending that name is treated like any unknown event.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use liveframe_types::Event;

use crate::error::{DispatchError, HandlerError, UnknownEventError, ViewError};
use crate::socket::SocketContext;

/// Event name reserved for the mount step.
pub const MOUNT_EVENT: &str = "mount";

/// Event names handlers may not register.
pub const RESERVED_EVENTS: &[&str] = &[MOUNT_EVENT];

/// Whether `name` is reserved by the engine.
pub fn is_reserved(name: &str) -> bool {
    RESERVED_EVENTS.contains(&name)
}

/// Where an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Sent by the browser over the live connection.
    Client,
    /// Scheduled by the server for its own socket.
    Server,
}

impl core::fmt::Display for Origin {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Client => f.write_str("client"),
            Self::Server => f.write_str("server"),
        }
    }
}

/// Future returned by a handler.
pub type HandlerFuture<S> = BoxFuture<'static, Result<S, HandlerError>>;

type HandlerFn<S> = Arc<dyn Fn(SocketContext, S, Event) -> HandlerFuture<S> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Accepts {
    Any,
    ServerOnly,
}

struct Route<S> {
    handler: HandlerFn<S>,
    accepts: Accepts,
}

/// Name-to-handler table for one view.
pub struct EventRouter<S> {
    routes: HashMap<String, Route<S>>,
}

impl<S> Default for EventRouter<S> {
    fn default() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }
}

impl<S> core::fmt::Debug for EventRouter<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut names: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("EventRouter").field("events", &names).finish()
    }
}

impl<S: Send + 'static> EventRouter<S> {
    /// An empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for events from the client or the server.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::ReservedEvent`] or
    /// [`ViewError::DuplicateEvent`].
    pub fn on_event<F, Fut>(&mut self, name: &str, handler: F) -> Result<(), ViewError>
    where
        F: Fn(SocketContext, S, Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<S, HandlerError>> + Send + 'static,
    {
        self.insert(name, Accepts::Any, handler)
    }

    /// Register a handler for events the server sends to itself.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::ReservedEvent`] or
    /// [`ViewError::DuplicateEvent`].
    pub fn on_self<F, Fut>(&mut self, name: &str, handler: F) -> Result<(), ViewError>
    where
        F: Fn(SocketContext, S, Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<S, HandlerError>> + Send + 'static,
    {
        self.insert(name, Accepts::ServerOnly, handler)
    }

    fn insert<F, Fut>(&mut self, name: &str, accepts: Accepts, handler: F) -> Result<(), ViewError>
    where
        F: Fn(SocketContext, S, Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<S, HandlerError>> + Send + 'static,
    {
        if is_reserved(name) {
            return Err(ViewError::ReservedEvent(name.to_owned()));
        }
        if self.routes.contains_key(name) {
            return Err(ViewError::DuplicateEvent(name.to_owned()));
        }
        let handler: HandlerFn<S> = Arc::new(
            move |ctx: SocketContext, state: S, event: Event| -> HandlerFuture<S> {
                Box::pin(handler(ctx, state, event))
            },
        );
        self.routes.insert(name.to_owned(), Route { handler, accepts });
        Ok(())
    }

    /// Whether an event of this name and origin would reach a handler.
    pub fn accepts(&self, name: &str, origin: Origin) -> bool {
        self.route(name, origin).is_some()
    }

    fn route(&self, name: &str, origin: Origin) -> Option<&Route<S>> {
        self.routes.get(name).filter(|route| match route.accepts {
            Accepts::Any => true,
            Accepts::ServerOnly => origin == Origin::Server,
        })
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Run the handler for `event` against `state`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Unknown`] if no handler accepts the event
    /// and [`DispatchError::Handler`] if the handler fails.
    pub async fn dispatch(
        &self,
        ctx: &SocketContext,
        state: S,
        event: Event,
        origin: Origin,
    ) -> Result<S, DispatchError> {
        let Some(route) = self.route(&event.name, origin) else {
            return Err(DispatchError::Unknown(UnknownEventError {
                name: event.name,
                origin,
            }));
        };
        let name = event.name.clone();
        (route.handler)(ctx.clone(), state, event)
            .await
            .map_err(|source| DispatchError::Handler { name, source })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::socket::SocketContext;

    async fn add(_ctx: SocketContext, n: i64, event: Event) -> Result<i64, HandlerError> {
        let by = event
            .param_i64("by")
            .ok_or_else(|| HandlerError::InvalidParams(String::from("missing by")))?;
        Ok(n.saturating_add(by))
    }

    async fn tick(_ctx: SocketContext, n: i64, _event: Event) -> Result<i64, HandlerError> {
        Ok(n.saturating_add(1))
    }

    fn router() -> EventRouter<i64> {
        let mut router = EventRouter::new();
        router.on_event("add", add).unwrap();
        router.on_self("tick", tick).unwrap();
        router
    }

    #[test]
    fn mount_is_reserved() {
        let mut router = EventRouter::<i64>::new();
        let err = router.on_event(MOUNT_EVENT, tick).unwrap_err();
        assert!(matches!(err, ViewError::ReservedEvent(name) if name == "mount"));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut router = router();
        let err = router.on_self("add", tick).unwrap_err();
        assert!(matches!(err, ViewError::DuplicateEvent(name) if name == "add"));
        assert_eq!(router.len(), 2);
    }

    #[test]
    fn self_handlers_ignore_client_origin() {
        let router = router();
        assert!(router.accepts("tick", Origin::Server));
        assert!(!router.accepts("tick", Origin::Client));
        assert!(router.accepts("add", Origin::Client));
        assert!(router.accepts("add", Origin::Server));
        assert!(!router.accepts("bogus-event", Origin::Client));
    }

    #[tokio::test]
    async fn dispatch_runs_matching_handler() {
        let (ctx, _channels) = SocketContext::detached("/counter");
        let router = router();
        let event = Event::with_params("add", serde_json::json!({"by": 5}));
        let next = router.dispatch(&ctx, 1, event, Origin::Client).await.unwrap();
        assert_eq!(next, 6);
    }

    #[tokio::test]
    async fn dispatch_unknown_event() {
        let (ctx, _channels) = SocketContext::detached("/counter");
        let err = router()
            .dispatch(&ctx, 1, Event::new("bogus-event"), Origin::Client)
            .await
            .unwrap_err();
        match err {
            DispatchError::Unknown(e) => {
                assert_eq!(e.name, "bogus-event");
                assert_eq!(e.origin, Origin::Client);
            }
            other => panic!("Expected Unknown, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn client_cannot_trigger_self_handler() {
        let (ctx, _channels) = SocketContext::detached("/counter");
        let err = router()
            .dispatch(&ctx, 1, Event::new("tick"), Origin::Client)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Unknown(_)));
    }

    #[tokio::test]
    async fn handler_error_is_reported() {
        let (ctx, _channels) = SocketContext::detached("/counter");
        let err = router()
            .dispatch(&ctx, 1, Event::new("add"), Origin::Client)
            .await
            .unwrap_err();
        match err {
            DispatchError::Handler { name, source } => {
                assert_eq!(name, "add");
                assert!(matches!(source, HandlerError::InvalidParams(_)));
            }
            other => panic!("Expected Handler, got {other:?}"),
        }
    }
}
