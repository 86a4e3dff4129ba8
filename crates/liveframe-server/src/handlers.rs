//! HTTP handlers: first render, assets, and health.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, HeaderValue, Uri};
use axum::response::{Html, IntoResponse, Response};
use tracing::debug;

use crate::assets::{LIVE_JS, LIVE_JS_MAP};
use crate::cookie::{cookie_value, session_cookie};
use crate::error::HttpError;
use crate::state::AppState;

/// Mount a view without a socket and serve its first render.
///
/// # Route
///
/// `GET <view path>`
pub async fn render_view(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    Query(params): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response, HttpError> {
    let path = uri.path();
    let view = state
        .registry()
        .get(path)
        .ok_or_else(|| HttpError::NotFound(path.to_owned()))?;

    let credential = cookie_value(&headers, &state.config().session.cookie_name);
    let page = view
        .render_static(state.sessions(), credential.as_deref(), params)
        .await?;
    let html = state.shell().render(path, &page)?;
    debug!(view = path, session_id = %page.session_id, "page rendered");

    let mut response = Html(html).into_response();
    let cookie = session_cookie(&state.config().session, &page.token);
    let cookie =
        HeaderValue::from_str(&cookie).map_err(|e| HttpError::Internal(e.to_string()))?;
    response.headers_mut().insert(SET_COOKIE, cookie);
    Ok(response)
}

/// The bridge script.
///
/// # Route
///
/// `GET /live.js`
pub async fn live_js(headers: HeaderMap) -> Response {
    LIVE_JS.respond(&headers)
}

/// The bridge script's source map.
///
/// # Route
///
/// `GET /live.js.map`
pub async fn live_js_map(headers: HeaderMap) -> Response {
    LIVE_JS_MAP.respond(&headers)
}

/// Liveness and load.
///
/// # Route
///
/// `GET /health`
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = if state.is_shutting_down() {
        "shutting_down"
    } else {
        "ok"
    };
    Json(serde_json::json!({
        "status": status,
        "active_connections": state.connections().active(),
        "views": state.registry().paths().collect::<Vec<_>>(),
    }))
}
