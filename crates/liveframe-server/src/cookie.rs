//! Session cookie helpers.

use axum::http::HeaderMap;
use axum::http::header::COOKIE;
use liveframe_core::config::SessionConfig;

/// The value of cookie `name` from the request headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_owned())
        .filter(|value| !value.is_empty())
}

/// A `Set-Cookie` value carrying the session token.
pub fn session_cookie(config: &SessionConfig, token: &str) -> String {
    let mut cookie = format!(
        "{}={token}; Path=/; HttpOnly; SameSite=Strict",
        config.cookie_name
    );
    if config.max_age_secs > 0 {
        cookie.push_str(&format!("; Max-Age={}", config.max_age_secs));
    }
    if config.secure_cookie {
        cookie.push_str("; Secure");
    }
    cookie
}
