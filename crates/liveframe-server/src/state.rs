//! Shared application state for the HTTP layer.

use std::sync::Arc;

use liveframe_core::{ConnectionTracker, LiveConfig, RenderError, Supervisor, ViewRegistry};
use liveframe_session::SessionManager;
use tokio::sync::watch;

use crate::shell::Shell;

/// Everything the handlers need, shared behind an `Arc`.
#[derive(Debug)]
pub struct AppState {
    registry: ViewRegistry,
    sessions: Arc<SessionManager>,
    config: LiveConfig,
    connections: ConnectionTracker,
    supervisor: Supervisor,
    shell: Shell,
    shutdown: watch::Sender<bool>,
}

impl AppState {
    /// State over an in-memory session store signed per `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the page shell fails to compile.
    pub fn new(registry: ViewRegistry, config: LiveConfig) -> Result<Self, RenderError> {
        let sessions = Arc::new(SessionManager::in_memory(config.session.signer()));
        Self::with_sessions(registry, config, sessions)
    }

    /// State over an explicit session manager.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the page shell fails to compile.
    pub fn with_sessions(
        registry: ViewRegistry,
        config: LiveConfig,
        sessions: Arc<SessionManager>,
    ) -> Result<Self, RenderError> {
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            registry,
            sessions,
            supervisor: Supervisor::new(config.socket.clone()),
            config,
            connections: ConnectionTracker::new(),
            shell: Shell::new()?,
            shutdown,
        })
    }

    /// Registered views.
    pub const fn registry(&self) -> &ViewRegistry {
        &self.registry
    }

    /// Session manager.
    pub const fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Loaded configuration.
    pub const fn config(&self) -> &LiveConfig {
        &self.config
    }

    /// Live connection counter.
    pub const fn connections(&self) -> &ConnectionTracker {
        &self.connections
    }

    /// Socket supervisor.
    pub const fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Page shell renderer.
    pub const fn shell(&self) -> &Shell {
        &self.shell
    }

    /// Signal every live socket to close.
    pub fn begin_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// A receiver that flips to `true` on shutdown.
    pub fn watch_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}
