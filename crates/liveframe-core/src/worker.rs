//! The per-socket actor.
//!
//! One [`SocketWorker`] task owns a socket's state. Events arrive on its
//! inbox and are handled strictly one at a time, so handlers never see
//! interleaved state. After each successful handler the view re-renders
//! and the diff against the previous render is queued for the client.

use std::sync::Arc;
use std::time::Duration;

use liveframe_session::SessionManager;
use liveframe_types::{ServerMessage, SessionId, SocketId};
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::{DispatchError, GENERIC_ERROR_MESSAGE};
use crate::render::RenderPipeline;
use crate::socket::{CloseReason, Envelope, SocketContext, SocketStats, closed_signal};
use crate::view::{LiveState, View};

/// How a socket's life ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketSummary {
    /// Socket id.
    pub socket_id: SocketId,
    /// Session id.
    pub session_id: SessionId,
    /// Why it closed.
    pub reason: CloseReason,
    /// Final counters.
    pub stats: SocketStats,
}

impl SocketSummary {
    /// Summary from a socket's current counters.
    pub fn of(ctx: &SocketContext) -> Self {
        Self {
            socket_id: ctx.id(),
            session_id: ctx.session_id(),
            reason: ctx.close_reason().unwrap_or(CloseReason::Requested),
            stats: ctx.stats(),
        }
    }
}

pub(crate) struct SocketWorker<S> {
    view: Arc<View<S>>,
    ctx: SocketContext,
    state: S,
    inbox: mpsc::Receiver<Envelope>,
    sessions: Arc<SessionManager>,
    persist_every: Option<Duration>,
    pipeline: RenderPipeline,
}

impl<S: LiveState> SocketWorker<S> {
    pub(crate) fn new(
        view: Arc<View<S>>,
        ctx: SocketContext,
        state: S,
        inbox: mpsc::Receiver<Envelope>,
        sessions: Arc<SessionManager>,
        persist_every: Option<Duration>,
    ) -> Self {
        Self {
            view,
            ctx,
            state,
            inbox,
            sessions,
            persist_every,
            pipeline: RenderPipeline::new(),
        }
    }

    /// Render once, then process events until the socket closes.
    pub(crate) async fn run(mut self) -> SocketSummary {
        info!(
            socket_id = %self.ctx.id(),
            session_id = %self.ctx.session_id(),
            view = self.view.path(),
            "socket connected"
        );
        let mut closed = self.ctx.watch_closed();
        let mut persist = self.persist_every.map(|period| {
            let start = Instant::now().checked_add(period).unwrap_or_else(Instant::now);
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        self.render_and_send();

        loop {
            tokio::select! {
                biased;
                () = closed_signal(&mut closed) => break,
                envelope = self.inbox.recv() => match envelope {
                    Some(envelope) => self.handle(envelope).await,
                    None => {
                        self.ctx.close(CloseReason::Requested);
                        break;
                    }
                },
                () = next_tick(persist.as_mut()) => self.persist(true),
            }
        }

        self.persist(false);
        let summary = SocketSummary::of(&self.ctx);
        info!(
            socket_id = %summary.socket_id,
            reason = %summary.reason,
            events = summary.stats.events_processed,
            failed_deliveries = summary.stats.failed_deliveries,
            "socket closed"
        );
        summary
    }

    async fn handle(&mut self, envelope: Envelope) {
        let phase = self.ctx.phase();
        if self.ctx.is_closed() || !phase.is_live() {
            debug!(
                socket_id = %self.ctx.id(),
                ?phase,
                event = %envelope.event.name,
                "socket not live, event dropped"
            );
            return;
        }
        let Envelope { event, origin } = envelope;
        let result = self
            .view
            .router()
            .dispatch(&self.ctx, self.state.clone(), event, origin)
            .await;

        match result {
            Ok(next) => {
                self.state = next;
                self.ctx.record_event();
                if self.ctx.is_closed() {
                    debug!(socket_id = %self.ctx.id(), "socket closed during handler, patch dropped");
                    return;
                }
                self.render_and_send();
            }
            Err(DispatchError::Unknown(e)) => {
                warn!(socket_id = %self.ctx.id(), error = %e, "ignoring event");
            }
            Err(e @ DispatchError::Handler { .. }) => {
                warn!(socket_id = %self.ctx.id(), error = %e, "handler failed, state unchanged");
                self.ctx.send(ServerMessage::Error {
                    message: GENERIC_ERROR_MESSAGE.to_owned(),
                });
            }
        }
    }

    fn render_and_send(&mut self) {
        match self.view.render(&self.state) {
            Ok(markup) => {
                let patch = self.pipeline.advance(markup);
                if !patch.is_empty() {
                    self.ctx.send(patch.into());
                }
            }
            Err(e) => {
                error!(socket_id = %self.ctx.id(), error = %e, "render failed, closing socket");
                self.ctx.send(ServerMessage::Error {
                    message: GENERIC_ERROR_MESSAGE.to_owned(),
                });
                self.ctx.close(CloseReason::RenderFailure);
            }
        }
    }

    fn persist(&self, refresh_client: bool) {
        let snapshot = match serde_json::to_value(&self.state) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(socket_id = %self.ctx.id(), error = %e, "state not serializable, skipping persist");
                return;
            }
        };
        match self
            .sessions
            .persist(self.ctx.session_id(), self.view.path(), snapshot)
        {
            Ok(token) if refresh_client && !self.ctx.is_closed() => {
                self.ctx.send(ServerMessage::Session { token });
            }
            Ok(_) => {}
            Err(e) => warn!(socket_id = %self.ctx.id(), error = %e, "session persist failed"),
        }
    }
}

async fn next_tick(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use liveframe_session::TokenSigner;
    use liveframe_types::Event;

    use super::*;
    use crate::lifecycle::{PhaseTrigger, ViewPhase};
    use crate::router::Origin;

    fn counting_view(calls: &Arc<AtomicUsize>) -> Arc<View<i64>> {
        let calls = Arc::clone(calls);
        let view = View::builder("/count")
            .mount(|_ctx, prior: Option<i64>| async move { Ok(prior.unwrap_or(0)) })
            .render(|n: &i64| Ok(format!("<p>{n}</p>")))
            .handle_event("inc", move |_ctx, n: i64, _event| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(n + 1)
                }
            })
            .build()
            .unwrap();
        Arc::new(view)
    }

    /// Let every runnable task settle. Paused time only advances once
    /// the runtime is idle.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn events_only_run_on_a_live_socket() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (ctx, channels) = SocketContext::detached("/count");
        let mut outbound = channels.outbound;
        let sessions = Arc::new(SessionManager::in_memory(TokenSigner::ephemeral(60)));
        let worker = SocketWorker::new(
            counting_view(&calls),
            ctx.clone(),
            0,
            channels.inbox,
            sessions,
            None,
        );
        let task = tokio::spawn(worker.run());

        assert_eq!(ctx.phase(), ViewPhase::Unmounted);
        assert!(ctx.deliver(Event::new("inc"), Origin::Client).await);
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert!(ctx.advance_phase(PhaseTrigger::ConnectedMount));
        assert!(ctx.deliver(Event::new("inc"), Origin::Client).await);
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        ctx.close(CloseReason::Requested);
        let summary = task.await.unwrap();
        assert_eq!(summary.stats.events_processed, 1);
        assert!(matches!(outbound.try_recv(), Ok(ServerMessage::Patch { .. })));
    }
}
