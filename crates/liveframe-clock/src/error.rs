//! Error types for the clock binary.

use liveframe_core::{ConfigError, RenderError, ViewError};
use liveframe_server::ServerError;

/// Top-level error for the clock binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// A template failed to compile.
    #[error("template error: {source}")]
    Template {
        /// The underlying render error.
        #[from]
        source: RenderError,
    },

    /// A view could not be built or registered.
    #[error("view error: {source}")]
    View {
        /// The underlying view error.
        #[from]
        source: ViewError,
    },

    /// The HTTP server failed.
    #[error("server error: {source}")]
    Server {
        /// The underlying server error.
        #[from]
        source: ServerError,
    },
}
