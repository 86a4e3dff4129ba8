//! Per-connection socket handle.
//!
//! A [`SocketContext`] is the cheap, cloneable handle handlers use to talk
//! to their connection: queue outbound frames, schedule events for
//! themselves, and close. It also carries the close signal every task
//! tied to the socket watches, so closing cancels pending self-events
//! and stops the worker without any shared lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use liveframe_types::{Event, ServerMessage, SessionId, SocketId};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::config::SocketConfig;
use crate::lifecycle::{PhaseTrigger, ViewPhase};
use crate::router::Origin;

/// An event waiting in a socket's inbox.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// The event.
    pub event: Event,
    /// Who sent it.
    pub origin: Origin,
}

/// Why a socket closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client went away or sent a close frame.
    ClientDisconnected,
    /// No client traffic within the idle timeout.
    IdleTimeout,
    /// The outbound queue was full.
    Backpressure,
    /// Writes to the transport kept failing.
    TransportFailure,
    /// The view failed to render.
    RenderFailure,
    /// Mount failed on connect.
    MountFailed,
    /// The upgrade was never completed.
    Abandoned,
    /// A handler closed the socket.
    Requested,
    /// The server is shutting down.
    Shutdown,
}

impl core::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Self::ClientDisconnected => "client_disconnected",
            Self::IdleTimeout => "idle_timeout",
            Self::Backpressure => "backpressure",
            Self::TransportFailure => "transport_failure",
            Self::RenderFailure => "render_failure",
            Self::MountFailed => "mount_failed",
            Self::Abandoned => "abandoned",
            Self::Requested => "requested",
            Self::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// Counters for one socket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SocketStats {
    /// Events that reached a handler and completed.
    pub events_processed: u64,
    /// Frames written to the transport.
    pub messages_sent: u64,
    /// Frames that could not be queued or written.
    pub failed_deliveries: u64,
    /// Self-events scheduled.
    pub self_events_scheduled: u64,
    /// Self-events dropped because the socket closed first.
    pub self_events_dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    events: AtomicU64,
    sent: AtomicU64,
    failed: AtomicU64,
    scheduled: AtomicU64,
    dropped: AtomicU64,
}

/// Receiving halves of a socket's queues.
#[derive(Debug)]
pub struct SocketChannels {
    /// Events for the worker.
    pub inbox: mpsc::Receiver<Envelope>,
    /// Frames for the transport.
    pub outbound: mpsc::Receiver<ServerMessage>,
}

#[derive(Debug)]
struct Shared {
    id: SocketId,
    session_id: SessionId,
    view: String,
    inbox: mpsc::Sender<Envelope>,
    outbound: mpsc::Sender<ServerMessage>,
    closed: watch::Sender<Option<CloseReason>>,
    phase: Mutex<ViewPhase>,
    counters: Counters,
}

/// Handle to one live connection.
#[derive(Debug, Clone)]
pub struct SocketContext {
    shared: Arc<Shared>,
}

impl SocketContext {
    /// Create a socket and the receiving ends of its queues.
    pub fn new(
        session_id: SessionId,
        view: impl Into<String>,
        config: &SocketConfig,
    ) -> (Self, SocketChannels) {
        let (inbox_tx, inbox_rx) = mpsc::channel(config.inbox_capacity.max(1));
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));
        let (closed, _) = watch::channel(None);
        let ctx = Self {
            shared: Arc::new(Shared {
                id: SocketId::new(),
                session_id,
                view: view.into(),
                inbox: inbox_tx,
                outbound: outbound_tx,
                closed,
                phase: Mutex::new(ViewPhase::Unmounted),
                counters: Counters::default(),
            }),
        };
        let channels = SocketChannels {
            inbox: inbox_rx,
            outbound: outbound_rx,
        };
        (ctx, channels)
    }

    /// A socket with a new session and default limits.
    pub fn detached(view: impl Into<String>) -> (Self, SocketChannels) {
        Self::new(SessionId::new(), view, &SocketConfig::default())
    }

    /// Socket id.
    pub fn id(&self) -> SocketId {
        self.shared.id
    }

    /// Session this socket belongs to.
    pub fn session_id(&self) -> SessionId {
        self.shared.session_id
    }

    /// Path of the view served on this socket.
    pub fn view(&self) -> &str {
        &self.shared.view
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> ViewPhase {
        *self
            .shared
            .phase
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a lifecycle transition. Returns `false` if it is not
    /// allowed from the current phase.
    pub(crate) fn advance_phase(&self, trigger: PhaseTrigger) -> bool {
        let mut phase = self
            .shared
            .phase
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match phase.next(trigger) {
            Some(next) => {
                trace!(socket_id = %self.shared.id, from = ?*phase, to = ?next, "phase change");
                *phase = next;
                true
            }
            None => false,
        }
    }

    /// Queue a frame for the client without waiting.
    ///
    /// Returns `false` if the frame was not queued. Sending on a closed
    /// socket is a counted no-op; a full queue closes the socket with
    /// [`CloseReason::Backpressure`].
    pub fn send(&self, message: ServerMessage) -> bool {
        if self.is_closed() {
            self.record_failed_delivery();
            trace!(socket_id = %self.shared.id, "dropping frame for closed socket");
            return false;
        }
        match self.shared.outbound.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.record_failed_delivery();
                warn!(socket_id = %self.shared.id, "outbound queue full, closing socket");
                self.close(CloseReason::Backpressure);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.record_failed_delivery();
                self.close(CloseReason::TransportFailure);
                false
            }
        }
    }

    /// Queue an application message for the client.
    pub fn push(&self, name: impl Into<String>, payload: Value) -> bool {
        self.send(ServerMessage::Push {
            name: name.into(),
            payload,
        })
    }

    /// Deliver `event` to this socket's own handlers as soon as the
    /// current handler returns.
    pub fn send_self(&self, event: Event) -> ScheduledEvent {
        self.schedule_self(event, Duration::ZERO)
    }

    /// Deliver `event` to this socket's own handlers after `delay`.
    ///
    /// The event is dropped if the socket closes first. Must be called
    /// from within a Tokio runtime.
    pub fn schedule_self(&self, event: Event, delay: Duration) -> ScheduledEvent {
        self.shared.counters.scheduled.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::clone(&self.shared);
        let mut closed = self.shared.closed.subscribe();

        let handle = tokio::spawn(async move {
            let name = event.name.clone();
            let deliver = async {
                tokio::time::sleep(delay).await;
                shared
                    .inbox
                    .send(Envelope {
                        event,
                        origin: Origin::Server,
                    })
                    .await
                    .is_ok()
            };
            let delivered = tokio::select! {
                biased;
                () = closed_signal(&mut closed) => false,
                ok = deliver => ok,
            };
            if !delivered {
                shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
                trace!(socket_id = %shared.id, event = %name, "self event dropped, socket closed");
            }
        });
        ScheduledEvent { handle }
    }

    /// Close the socket. The first reason wins; returns `true` if this
    /// call closed it.
    pub fn close(&self, reason: CloseReason) -> bool {
        let closed_now = self.shared.closed.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
        if closed_now {
            self.advance_phase(PhaseTrigger::Close);
            debug!(socket_id = %self.shared.id, %reason, "socket closing");
        }
        closed_now
    }

    /// Whether the socket has closed.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.borrow().is_some()
    }

    /// Why the socket closed, if it has.
    pub fn close_reason(&self) -> Option<CloseReason> {
        *self.shared.closed.borrow()
    }

    /// Wait until the socket closes.
    pub async fn closed(&self) -> CloseReason {
        let mut rx = self.shared.closed.subscribe();
        let reason = rx.wait_for(Option::is_some).await.ok().and_then(|r| *r);
        reason.unwrap_or(CloseReason::Requested)
    }

    /// Snapshot of this socket's counters.
    pub fn stats(&self) -> SocketStats {
        let c = &self.shared.counters;
        SocketStats {
            events_processed: c.events.load(Ordering::Relaxed),
            messages_sent: c.sent.load(Ordering::Relaxed),
            failed_deliveries: c.failed.load(Ordering::Relaxed),
            self_events_scheduled: c.scheduled.load(Ordering::Relaxed),
            self_events_dropped: c.dropped.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn watch_closed(&self) -> watch::Receiver<Option<CloseReason>> {
        self.shared.closed.subscribe()
    }

    /// Queue an event for the worker, waiting for inbox space. Returns
    /// `false` if the socket closed first.
    pub(crate) async fn deliver(&self, event: Event, origin: Origin) -> bool {
        let mut closed = self.watch_closed();
        tokio::select! {
            biased;
            () = closed_signal(&mut closed) => false,
            sent = self.shared.inbox.send(Envelope { event, origin }) => sent.is_ok(),
        }
    }

    pub(crate) fn record_event(&self) {
        self.shared.counters.events.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sent(&self) {
        self.shared.counters.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed_delivery(&self) {
        self.shared.counters.failed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Resolves once the close signal is set or its sender is gone.
pub(crate) async fn closed_signal(rx: &mut watch::Receiver<Option<CloseReason>>) {
    let _ = rx.wait_for(Option::is_some).await;
}

/// Handle to a pending self-event.
///
/// Dropping the handle does not cancel the event.
#[derive(Debug)]
pub struct ScheduledEvent {
    handle: JoinHandle<()>,
}

impl ScheduledEvent {
    /// Cancel the event if it has not been delivered.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Whether the event was delivered, dropped, or cancelled.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use liveframe_types::Patch;

    use super::*;

    fn small(capacity: usize) -> (SocketContext, SocketChannels) {
        let config = SocketConfig {
            outbound_capacity: capacity,
            inbox_capacity: capacity,
            ..SocketConfig::default()
        };
        SocketContext::new(SessionId::new(), "/t", &config)
    }

    #[test]
    fn send_queues_frames_in_order() {
        let (ctx, mut channels) = small(4);
        assert!(ctx.send(Patch::replace_all("<p>1</p>").into()));
        assert!(ctx.push("ping", Value::Null));
        assert!(matches!(channels.outbound.try_recv().unwrap(), ServerMessage::Patch { .. }));
        assert!(matches!(channels.outbound.try_recv().unwrap(), ServerMessage::Push { .. }));
    }

    #[test]
    fn send_after_close_is_counted_noop() {
        let (ctx, mut channels) = small(4);
        assert!(ctx.close(CloseReason::Requested));
        assert!(!ctx.send(Patch::replace_all("x").into()));
        assert!(channels.outbound.try_recv().is_err());
        assert_eq!(ctx.stats().failed_deliveries, 1);
    }

    #[test]
    fn full_queue_closes_for_backpressure() {
        let (ctx, _channels) = small(1);
        assert!(ctx.send(Patch::replace_all("a").into()));
        assert!(!ctx.send(Patch::replace_all("b").into()));
        assert_eq!(ctx.close_reason(), Some(CloseReason::Backpressure));
    }

    #[test]
    fn first_close_reason_wins() {
        let (ctx, _channels) = small(1);
        assert!(ctx.close(CloseReason::IdleTimeout));
        assert!(!ctx.close(CloseReason::Requested));
        assert_eq!(ctx.close_reason(), Some(CloseReason::IdleTimeout));
        assert_eq!(ctx.phase(), ViewPhase::Closed);
    }

    #[tokio::test]
    async fn send_self_reaches_inbox_as_server_event() {
        let (ctx, mut channels) = small(4);
        ctx.send_self(Event::new("tick"));
        let envelope = channels.inbox.recv().await.unwrap();
        assert_eq!(envelope.event.name, "tick");
        assert_eq!(envelope.origin, Origin::Server);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_event_waits_for_delay() {
        let (ctx, mut channels) = small(4);
        ctx.schedule_self(Event::new("tick"), Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert!(channels.inbox.try_recv().is_err());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(channels.inbox.try_recv().unwrap().event.name, "tick");
    }

    #[tokio::test(start_paused = true)]
    async fn close_cancels_pending_self_events() {
        let (ctx, mut channels) = small(4);
        let scheduled = ctx.schedule_self(Event::new("tick"), Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(500)).await;
        ctx.close(CloseReason::ClientDisconnected);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(channels.inbox.try_recv().is_err());
        assert!(scheduled.is_finished());
        let stats = ctx.stats();
        assert_eq!(stats.self_events_scheduled, 1);
        assert_eq!(stats.self_events_dropped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_event_is_never_delivered() {
        let (ctx, mut channels) = small(4);
        let scheduled = ctx.schedule_self(Event::new("tick"), Duration::from_secs(1));
        scheduled.cancel();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(channels.inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_resolves_with_reason() {
        let (ctx, _channels) = small(1);
        let waiter = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.closed().await })
        };
        tokio::task::yield_now().await;
        ctx.close(CloseReason::Shutdown);
        assert_eq!(waiter.await.unwrap(), CloseReason::Shutdown);
    }
}
