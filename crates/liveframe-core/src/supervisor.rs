//! Connection supervisor.
//!
//! The supervisor drives one socket's transport: it forwards client
//! events to the worker, writes queued frames to the client, enforces the
//! idle timeout, and escalates repeated write failures into a close. It
//! owns no view state; everything it knows about the socket goes through
//! the [`SocketContext`].

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use liveframe_types::{ClientMessage, ServerMessage};
use tokio::time::Instant;
use tracing::{debug, error, trace, warn};

use crate::config::SocketConfig;
use crate::error::TransportWriteError;
use crate::registry::PendingSocket;
use crate::router::Origin;
use crate::socket::{CloseReason, SocketContext, closed_signal};
use crate::worker::SocketSummary;

/// An inbound transport frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A text frame.
    Text(String),
    /// A ping the transport expects answered.
    Ping(Vec<u8>),
    /// Any other traffic (pongs, binary frames). Counts as activity.
    Other,
    /// The peer is closing.
    Close,
}

/// A bidirectional message transport, typically a WebSocket.
pub trait Transport: Send {
    /// Next inbound frame. `None` when the transport is gone.
    fn recv(&mut self) -> impl Future<Output = Option<Frame>> + Send;

    /// Write a text frame.
    fn send_text(&mut self, text: String)
    -> impl Future<Output = Result<(), TransportWriteError>> + Send;

    /// Answer a ping.
    fn send_pong(
        &mut self,
        data: Vec<u8>,
    ) -> impl Future<Output = Result<(), TransportWriteError>> + Send;

    /// Close the transport. Best effort.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Counts live connections.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active: Arc<AtomicUsize>,
}

impl ConnectionTracker {
    /// A tracker with no connections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Live connections right now.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Reserve a slot if fewer than `limit` are in use (0 = unlimited).
    pub fn try_acquire(&self, limit: usize) -> Option<ConnectionGuard> {
        let acquired = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                if limit != 0 && n >= limit {
                    None
                } else {
                    n.checked_add(1)
                }
            })
            .is_ok();
        acquired.then(|| ConnectionGuard {
            active: Arc::clone(&self.active),
        })
    }
}

/// A reserved connection slot, released on drop.
#[derive(Debug)]
pub struct ConnectionGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let _ = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}

/// Drives sockets over transports.
#[derive(Debug, Clone)]
pub struct Supervisor {
    config: SocketConfig,
}

impl Supervisor {
    /// A supervisor applying `config` to every socket.
    pub const fn new(config: SocketConfig) -> Self {
        Self { config }
    }

    /// The per-socket limits in force.
    pub const fn config(&self) -> &SocketConfig {
        &self.config
    }

    /// Run a mounted socket over `transport` until it closes, then tear
    /// it down. Returns the socket's summary.
    pub async fn run<T: Transport>(&self, mut transport: T, pending: PendingSocket) -> SocketSummary {
        let (ctx, mut outbound, worker) = pending.into_parts();
        let worker = tokio::spawn(worker);
        let mut closed = ctx.watch_closed();
        let idle = self.config.idle_timeout();
        let mut deadline = idle.and_then(deadline_after);
        let mut write_failures: u32 = 0;

        loop {
            tokio::select! {
                biased;
                () = closed_signal(&mut closed) => break,
                message = outbound.recv() => {
                    let Some(message) = message else {
                        ctx.close(CloseReason::Requested);
                        break;
                    };
                    if self.write(&mut transport, &ctx, &message).await {
                        write_failures = 0;
                    } else {
                        write_failures = write_failures.saturating_add(1);
                        if write_failures >= self.config.max_write_failures.max(1) {
                            warn!(socket_id = %ctx.id(), write_failures, "transport keeps failing, closing");
                            ctx.close(CloseReason::TransportFailure);
                        }
                    }
                },
                frame = transport.recv() => {
                    deadline = idle.and_then(deadline_after);
                    match frame {
                        None | Some(Frame::Close) => {
                            ctx.close(CloseReason::ClientDisconnected);
                        }
                        Some(Frame::Text(text)) => self.inbound(&ctx, &text).await,
                        Some(Frame::Ping(data)) => {
                            if let Err(e) = transport.send_pong(data).await {
                                debug!(socket_id = %ctx.id(), error = %e, "pong failed");
                            }
                        }
                        Some(Frame::Other) => {}
                    }
                },
                () = idle_expired(deadline) => {
                    debug!(socket_id = %ctx.id(), "idle timeout");
                    ctx.close(CloseReason::IdleTimeout);
                },
            }
        }

        self.teardown(transport, &ctx, outbound).await;
        match worker.await {
            Ok(summary) => summary,
            Err(e) => {
                error!(socket_id = %ctx.id(), error = %e, "socket worker crashed");
                SocketSummary::of(&ctx)
            }
        }
    }

    async fn inbound(&self, ctx: &SocketContext, text: &str) {
        match ClientMessage::parse(text) {
            Ok(message) => match message.into_event() {
                Some(event) => {
                    trace!(socket_id = %ctx.id(), event = %event.name, "client event");
                    if !ctx.deliver(event, Origin::Client).await {
                        trace!(socket_id = %ctx.id(), "event arrived after close");
                    }
                }
                None => trace!(socket_id = %ctx.id(), "heartbeat"),
            },
            Err(e) => {
                warn!(socket_id = %ctx.id(), error = %e, "malformed client frame ignored");
            }
        }
    }

    async fn write<T: Transport>(
        &self,
        transport: &mut T,
        ctx: &SocketContext,
        message: &ServerMessage,
    ) -> bool {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!(socket_id = %ctx.id(), error = %e, "frame not serializable");
                ctx.record_failed_delivery();
                return true;
            }
        };
        match transport.send_text(text).await {
            Ok(()) => {
                ctx.record_sent();
                true
            }
            Err(e) => {
                ctx.record_failed_delivery();
                debug!(socket_id = %ctx.id(), error = %e, "transport write failed");
                false
            }
        }
    }

    async fn teardown<T: Transport>(
        &self,
        mut transport: T,
        ctx: &SocketContext,
        mut outbound: tokio::sync::mpsc::Receiver<ServerMessage>,
    ) {
        let reason = ctx.close_reason().unwrap_or(CloseReason::Requested);
        let peer_gone = matches!(
            reason,
            CloseReason::ClientDisconnected | CloseReason::TransportFailure
        );
        if !peer_gone {
            while let Ok(message) = outbound.try_recv() {
                if !self.write(&mut transport, ctx, &message).await {
                    break;
                }
            }
        }
        outbound.close();
        transport.close().await;
        debug!(socket_id = %ctx.id(), %reason, "transport closed");
    }
}

fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

async fn idle_expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_enforces_limit() {
        let tracker = ConnectionTracker::new();
        let first = tracker.try_acquire(2);
        let second = tracker.try_acquire(2);
        assert!(first.is_some() && second.is_some());
        assert!(tracker.try_acquire(2).is_none());
        assert_eq!(tracker.active(), 2);
        drop(first);
        assert_eq!(tracker.active(), 1);
        assert!(tracker.try_acquire(2).is_some());
    }

    #[test]
    fn zero_limit_is_unlimited() {
        let tracker = ConnectionTracker::new();
        let guards: Vec<_> = (0..100).filter_map(|_| tracker.try_acquire(0)).collect();
        assert_eq!(guards.len(), 100);
        assert_eq!(tracker.active(), 100);
    }
}
