//! Error types for the HTTP layer.
//!
//! [`HttpError`] converts into a JSON response. Bodies carry a generic
//! message only; details go to the log.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use liveframe_core::{RenderError, ViewError};
use tracing::{error, warn};

/// Errors that can occur while serving a request.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// No view is registered at the path.
    #[error("not found: {0}")]
    NotFound(String),

    /// The connection limit is reached.
    #[error("connection limit reached")]
    Unavailable,

    /// The view's mount function rejected the request.
    #[error("mount rejected: {0}")]
    Mount(String),

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ViewError> for HttpError {
    fn from(e: ViewError) -> Self {
        match e {
            ViewError::Mount(e) => Self::Mount(e.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<RenderError> for HttpError {
    fn from(e: RenderError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::NotFound(path) => (StatusCode::NOT_FOUND, format!("no view at {path}")),
            Self::Unavailable => {
                warn!("rejecting connection, limit reached");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    String::from("service unavailable"),
                )
            }
            Self::Mount(detail) => {
                warn!(error = %detail, "mount rejected request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    String::from("internal error"),
                )
            }
            Self::Internal(detail) => {
                error!(error = %detail, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    String::from("internal error"),
                )
            }
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
