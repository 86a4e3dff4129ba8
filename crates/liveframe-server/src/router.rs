//! Axum router construction.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::error::HttpError;
use crate::state::AppState;
use crate::{handlers, ws};

/// Prefix of every socket upgrade path.
pub const SOCKET_PREFIX: &str = "/live/ws";

/// Paths served by the router itself.
pub const BUILTIN_PATHS: &[&str] = &["/live.js", "/live.js.map", "/health"];

/// Upgrade path for the view at `view_path`.
pub fn socket_path(view_path: &str) -> String {
    if view_path == "/" {
        SOCKET_PREFIX.to_owned()
    } else {
        format!("{SOCKET_PREFIX}{view_path}")
    }
}

/// View path for an upgrade path, if it is one.
pub fn view_path(socket_path: &str) -> Option<&str> {
    match socket_path.strip_prefix(SOCKET_PREFIX)? {
        "" | "/" => Some("/"),
        rest if rest.starts_with('/') => Some(rest),
        _ => None,
    }
}

/// Build the complete router.
///
/// The router includes:
/// - `GET <view path>` and `GET /live/ws<view path>` per registered view
/// - `GET /live.js`, `GET /live.js.map` -- bridge script and source map
/// - `GET /health` -- liveness and connection count
///
/// Unknown paths get a JSON 404.
pub fn build_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/live.js", get(handlers::live_js))
        .route("/live.js.map", get(handlers::live_js_map))
        .route("/health", get(handlers::health));

    for path in state.registry().paths() {
        if BUILTIN_PATHS.contains(&path) || view_path(path).is_some() {
            warn!(view = path, "view path collides with a built-in route, skipping");
            continue;
        }
        router = router
            .route(path, get(handlers::render_view))
            .route(&socket_path(path), get(ws::live_socket));
    }

    router
        .fallback(|uri: axum::http::Uri| async move { HttpError::NotFound(uri.path().to_owned()) })
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_paths() {
        assert_eq!(socket_path("/"), "/live/ws");
        assert_eq!(socket_path("/clock"), "/live/ws/clock");
        assert_eq!(view_path("/live/ws"), Some("/"));
        assert_eq!(view_path("/live/ws/clock"), Some("/clock"));
        assert_eq!(view_path("/live/wsclock"), None);
        assert_eq!(view_path("/clock"), None);
    }
}
