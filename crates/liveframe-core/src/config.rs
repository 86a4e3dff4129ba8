//! Configuration loading and typed config structures.
//!
//! The configuration lives in `liveframe.yaml` next to the binary. Every
//! field has a default, so a missing file or a partial file is fine.
//! Environment variables override selected values:
//!
//! - `LIVEFRAME_HOST` overrides `server.host`
//! - `LIVEFRAME_PORT` overrides `server.port`
//! - `LIVEFRAME_SECRET` overrides `session.secret`
//! - `LIVEFRAME_LOG` overrides `logging.level`

use std::path::Path;
use std::time::Duration;

use liveframe_session::TokenSigner;
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value was out of range.
    #[error("invalid config value: {0}")]
    Invalid(String),
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LiveConfig {
    /// Network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Per-connection limits.
    #[serde(default)]
    pub socket: SocketConfig,

    /// Session token settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl LiveConfig {
    /// Load configuration from a YAML file, then apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, then apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise use defaults (still applying
    /// environment overrides).
    ///
    /// # Errors
    ///
    /// Same as [`LiveConfig::from_file`].
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::from_file(path);
        }
        tracing::info!(path = %path.display(), "config file not found, using defaults");
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = std::env::var("LIVEFRAME_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("LIVEFRAME_PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("LIVEFRAME_PORT: {e}")))?;
        }
        if let Ok(secret) = std::env::var("LIVEFRAME_SECRET") {
            self.session.secret = Some(secret);
        }
        if let Ok(level) = std::env::var("LIVEFRAME_LOG") {
            self.logging.level = level;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.socket.inbox_capacity == 0 || self.socket.outbound_capacity == 0 {
            return Err(ConfigError::Invalid(String::from(
                "socket channel capacities must be at least 1",
            )));
        }
        if self.session.cookie_name.is_empty() {
            return Err(ConfigError::Invalid(String::from(
                "session.cookie_name must not be empty",
            )));
        }
        Ok(())
    }
}

/// Network settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// Address to bind (e.g. `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum simultaneous live connections (0 = unlimited).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
        }
    }
}

/// Per-connection limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SocketConfig {
    /// Queued events per socket before the transport reader waits.
    #[serde(default = "default_channel_capacity")]
    pub inbox_capacity: usize,

    /// Queued outbound frames before the socket is closed for
    /// backpressure.
    #[serde(default = "default_channel_capacity")]
    pub outbound_capacity: usize,

    /// Seconds without client traffic before closing (0 = never).
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Seconds between state snapshots while connected (0 = only on
    /// close).
    #[serde(default = "default_persist_interval_secs")]
    pub persist_interval_secs: u64,

    /// Consecutive transport write failures tolerated before closing.
    #[serde(default = "default_max_write_failures")]
    pub max_write_failures: u32,
}

impl SocketConfig {
    /// Idle timeout, if enabled.
    pub const fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.idle_timeout_secs))
        }
    }

    /// Periodic persistence interval, if enabled.
    pub const fn persist_interval(&self) -> Option<Duration> {
        if self.persist_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.persist_interval_secs))
        }
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: default_channel_capacity(),
            outbound_capacity: default_channel_capacity(),
            idle_timeout_secs: default_idle_timeout_secs(),
            persist_interval_secs: default_persist_interval_secs(),
            max_write_failures: default_max_write_failures(),
        }
    }
}

/// Session token settings.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct SessionConfig {
    /// Signing secret. Unset means a random per-process key.
    #[serde(default)]
    pub secret: Option<String>,

    /// Name of the session cookie.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Maximum token age in seconds (0 = unlimited).
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,

    /// Mark the cookie `Secure` (HTTPS only).
    #[serde(default = "default_secure_cookie")]
    pub secure_cookie: bool,
}

impl SessionConfig {
    /// Build the token signer for this configuration.
    pub fn signer(&self) -> TokenSigner {
        match self.secret.as_deref().filter(|s| !s.is_empty()) {
            Some(secret) => TokenSigner::new(secret.as_bytes(), self.max_age_secs)
                .unwrap_or_else(|_| TokenSigner::ephemeral(self.max_age_secs)),
            None => {
                tracing::warn!(
                    "no session secret configured; using a random key, \
                     sessions will not survive a restart"
                );
                TokenSigner::ephemeral(self.max_age_secs)
            }
        }
    }
}

impl core::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("cookie_name", &self.cookie_name)
            .field("max_age_secs", &self.max_age_secs)
            .field("secure_cookie", &self.secure_cookie)
            .finish()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: None,
            cookie_name: default_cookie_name(),
            max_age_secs: default_max_age_secs(),
            secure_cookie: default_secure_cookie(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_port() -> u16 {
    8080
}

const fn default_max_connections() -> usize {
    10_000
}

const fn default_channel_capacity() -> usize {
    64
}

const fn default_idle_timeout_secs() -> u64 {
    60
}

const fn default_persist_interval_secs() -> u64 {
    30
}

const fn default_max_write_failures() -> u32 {
    3
}

fn default_cookie_name() -> String {
    "liveframe_session".to_owned()
}

const fn default_max_age_secs() -> u64 {
    86_400
}

const fn default_secure_cookie() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_owned()
}
