//! Static assets served to the browser: the bridge script and its
//! source map.
//!
//! Assets are embedded at compile time and tagged with the SHA-256 of
//! their contents, so clients revalidate with `If-None-Match`.

use std::sync::LazyLock;

use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, ETAG, IF_NONE_MATCH};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};

/// An embedded file.
#[derive(Debug)]
pub struct Asset {
    /// File contents.
    pub body: &'static str,
    /// MIME type.
    pub content_type: &'static str,
    /// Quoted `ETag` value.
    pub etag: String,
}

impl Asset {
    fn new(body: &'static str, content_type: &'static str) -> Self {
        let digest = Sha256::digest(body.as_bytes());
        Self {
            body,
            content_type,
            etag: format!("\"{}\"", hex::encode(digest)),
        }
    }

    /// Whether the request already holds this version.
    pub fn is_fresh(&self, headers: &HeaderMap) -> bool {
        headers
            .get_all(IF_NONE_MATCH)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .map(|tag| tag.trim().trim_start_matches("W/"))
            .any(|tag| tag == "*" || tag == self.etag)
    }

    /// Serve the asset, or `304 Not Modified` if the client's copy is
    /// current.
    pub fn respond(&self, headers: &HeaderMap) -> Response {
        let etag = HeaderValue::from_str(&self.etag).ok();
        let mut response = if self.is_fresh(headers) {
            StatusCode::NOT_MODIFIED.into_response()
        } else {
            (
                [
                    (CONTENT_TYPE, HeaderValue::from_static(self.content_type)),
                    (CACHE_CONTROL, HeaderValue::from_static("no-cache")),
                ],
                self.body,
            )
                .into_response()
        };
        if let Some(etag) = etag {
            response.headers_mut().insert(ETAG, etag);
        }
        response
    }
}

/// The bridge script.
pub static LIVE_JS: LazyLock<Asset> = LazyLock::new(|| {
    Asset::new(
        include_str!("../assets/live.js"),
        "application/javascript; charset=utf-8",
    )
});

/// Source map for the bridge script.
pub static LIVE_JS_MAP: LazyLock<Asset> = LazyLock::new(|| {
    Asset::new(
        include_str!("../assets/live.js.map"),
        "application/json",
    )
});

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn etag_is_quoted_sha256() {
        let asset = Asset::new("hello", "text/plain");
        assert_eq!(
            asset.etag,
            "\"2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824\""
        );
    }

    #[test]
    fn matching_if_none_match_is_fresh() {
        let asset = Asset::new("hello", "text/plain");
        let mut headers = HeaderMap::new();
        assert!(!asset.is_fresh(&headers));
        headers.insert(
            IF_NONE_MATCH,
            HeaderValue::from_str(&format!("\"nope\", W/{}", asset.etag)).unwrap(),
        );
        assert!(asset.is_fresh(&headers));
        assert_eq!(asset.respond(&headers).status(), StatusCode::NOT_MODIFIED);
    }

    #[test]
    fn stale_copy_gets_body() {
        let asset = Asset::new("hello", "text/plain");
        let mut headers = HeaderMap::new();
        headers.insert(IF_NONE_MATCH, HeaderValue::from_static("\"old\""));
        let response = asset.respond(&headers);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(ETAG).unwrap().to_str().unwrap(), asset.etag);
    }
}
