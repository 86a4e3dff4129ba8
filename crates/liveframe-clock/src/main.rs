//! Self-updating clock served as a Liveframe live view.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `liveframe.yaml` (defaults if absent)
//! 2. Initialize structured logging (tracing)
//! 3. Compile the clock template and register the `/clock` view
//! 4. Serve HTTP and live sockets until `Ctrl-C`

mod clock;
mod error;

use std::path::Path;
use std::sync::Arc;

use liveframe_core::config::LoggingConfig;
use liveframe_core::{LiveConfig, LogFormat, ViewRegistry};
use liveframe_server::{AppState, start_server};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::AppError;

/// Configuration file read at startup.
const CONFIG_PATH: &str = "liveframe.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, view setup, or the server fails.
#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Load configuration.
    let config = load_config(Path::new(CONFIG_PATH))?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!(
        host = %config.server.host,
        port = config.server.port,
        max_connections = config.server.max_connections,
        idle_timeout_secs = config.socket.idle_timeout_secs,
        "liveframe-clock starting"
    );

    run(config).await
}

async fn run(config: LiveConfig) -> Result<(), AppError> {
    // 3. Register views.
    let mut registry = ViewRegistry::new();
    registry.register(clock::clock_view(clock::renderer()?)?)?;
    info!(view = clock::CLOCK_PATH, "clock view registered");

    // 4. Serve.
    let server = config.server.clone();
    let state = Arc::new(AppState::new(registry, config)?);
    start_server(&server, state).await?;
    info!("liveframe-clock stopped");
    Ok(())
}

fn load_config(path: &Path) -> Result<LiveConfig, AppError> {
    Ok(LiveConfig::load_or_default(path)?)
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    match logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}
