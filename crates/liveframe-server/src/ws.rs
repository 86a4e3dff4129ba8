//! `WebSocket` upgrade and transport.
//!
//! The view is mounted before the upgrade completes, so a failing mount
//! is answered with a plain HTTP error instead of a socket that closes
//! immediately.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::{HeaderMap, Uri};
use axum::response::Response;
use liveframe_core::error::TransportWriteError;
use liveframe_core::{CloseReason, Frame, SocketContext, Transport};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::cookie::cookie_value;
use crate::error::HttpError;
use crate::router::view_path;
use crate::state::AppState;

/// Query parameter carrying the session token on upgrade.
pub const TOKEN_PARAM: &str = "token";

/// [`Transport`] over an axum [`WebSocket`].
#[derive(Debug)]
pub struct WsTransport {
    socket: WebSocket,
}

impl WsTransport {
    /// Wrap an upgraded socket.
    pub const fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

impl Transport for WsTransport {
    async fn recv(&mut self) -> Option<Frame> {
        match self.socket.recv().await? {
            Ok(Message::Text(text)) => Some(Frame::Text(text.as_str().to_owned())),
            Ok(Message::Ping(data)) => Some(Frame::Ping(data.to_vec())),
            Ok(Message::Close(_)) => Some(Frame::Close),
            Ok(Message::Pong(_) | Message::Binary(_)) => Some(Frame::Other),
            Err(e) => {
                debug!("WebSocket error: {e}");
                None
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), TransportWriteError> {
        self.socket
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportWriteError::Io(e.to_string()))
    }

    async fn send_pong(&mut self, data: Vec<u8>) -> Result<(), TransportWriteError> {
        self.socket
            .send(Message::Pong(data.into()))
            .await
            .map_err(|e| TransportWriteError::Io(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.socket.send(Message::Close(None)).await {
            debug!("WebSocket close frame not sent: {e}");
        }
    }
}

/// Mount the view on a new socket and upgrade the connection.
///
/// The session credential is taken from the `token` query parameter,
/// falling back to the session cookie.
///
/// # Route
///
/// `GET /live/ws<view path>`
pub async fn live_socket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    uri: Uri,
    Query(mut params): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response, HttpError> {
    let path = view_path(uri.path()).ok_or_else(|| HttpError::NotFound(uri.path().to_owned()))?;
    let view = state
        .registry()
        .get(path)
        .ok_or_else(|| HttpError::NotFound(path.to_owned()))?;

    let guard = state
        .connections()
        .try_acquire(state.config().server.max_connections)
        .ok_or(HttpError::Unavailable)?;

    let credential = params
        .remove(TOKEN_PARAM)
        .or_else(|| cookie_value(&headers, &state.config().session.cookie_name));

    let pending = view
        .connect(
            Arc::clone(state.sessions()),
            credential,
            params,
            state.config().socket.clone(),
        )
        .await?;

    let supervisor = state.supervisor().clone();
    let shutdown = state.watch_shutdown();

    Ok(ws.on_upgrade(move |socket| async move {
        let _guard = guard;
        close_on_shutdown(pending.context().clone(), shutdown);
        let summary = supervisor.run(WsTransport::new(socket), pending).await;
        info!(
            socket_id = %summary.socket_id,
            reason = %summary.reason,
            sent = summary.stats.messages_sent,
            "live socket finished"
        );
    }))
}

fn close_on_shutdown(ctx: SocketContext, mut shutdown: watch::Receiver<bool>) {
    tokio::spawn(async move {
        tokio::select! {
            _ = ctx.closed() => {}
            signalled = async { shutdown.wait_for(|down| *down).await.is_ok() } => {
                if signalled {
                    ctx.close(CloseReason::Shutdown);
                }
            }
        }
    });
}
