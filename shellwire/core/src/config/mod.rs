//! TOML Configuration File Support
//!
//! Centralized configuration loading for shellwire clients, with a TOML
//! configuration file at `~/.config/shellwire/client.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (applied with [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # XDG Base Directory Compliance
//!
//! - `$XDG_CONFIG_HOME/shellwire/client.toml` (typically `~/.config/shellwire/client.toml`)
//!
//! # Example Configuration
//!
//! ```toml
//! [endpoint]
//! url = "wss://sandbox.example.com/v1/sandboxes/dev/exec"
//! token_file = "/run/secrets/shellwire-token"
//!
//! [connection]
//! connect_timeout_ms = 10000
//! heartbeat_enabled = true
//! heartbeat_interval_secs = 30
//! close_timeout_ms = 5000
//!
//! [session]
//! output_capacity = 256
//! env_sync_timeout_ms = 3000
//! ```
//!
//! The token itself is never read from the file, only from `SHELLWIRE_TOKEN`,
//! a token file, or the command line.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::{Endpoint, SessionConfig};
use crate::transport::{BearerToken, TokenError};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// The credential could not be loaded
    #[error(transparent)]
    Token(#[from] TokenError),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    #[default]
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Endpoint section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointToml {
    /// Session endpoint URL
    pub url: Option<String>,

    /// File holding the bearer token
    pub token_file: Option<PathBuf>,
}

/// Connection section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionToml {
    /// Handshake timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,

    /// Whether to send keepalive pings
    pub heartbeat_enabled: Option<bool>,

    /// Keepalive interval in seconds
    pub heartbeat_interval_secs: Option<u64>,

    /// Close grace period in milliseconds
    pub close_timeout_ms: Option<u64>,

    /// Inbound event queue capacity
    pub event_capacity: Option<usize>,

    /// Largest message accepted, in bytes
    pub max_message_size: Option<usize>,
}

/// Session section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionToml {
    /// Output stream capacity in chunks
    pub output_capacity: Option<usize>,

    /// Environment injection timeout in milliseconds
    pub env_sync_timeout_ms: Option<u64>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientToml {
    /// Endpoint configuration section
    pub endpoint: EndpointToml,

    /// Connection configuration section
    pub connection: ConnectionToml,

    /// Session configuration section
    pub session: SessionToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Centralized configuration for a shellwire client
///
/// Use [`load_config`] to load configuration with proper priority handling,
/// then [`ClientConfig::endpoint`] to resolve where to connect.
#[derive(Clone, Debug, Default)]
pub struct ClientConfig {
    /// Session endpoint URL
    pub url: Option<String>,

    /// Bearer token given directly
    pub token: Option<BearerToken>,

    /// File holding the bearer token, used when `token` is unset
    pub token_file: Option<PathBuf>,

    /// Session and connection settings
    pub session: SessionConfig,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl ClientConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Resolve the endpoint and credential
    ///
    /// # Errors
    ///
    /// Returns an error if no URL is configured, no token is available, or
    /// the token file cannot be read.
    pub fn endpoint(&self) -> Result<Endpoint, ConfigError> {
        let url = self.url.clone().ok_or_else(|| {
            ConfigError::ValidationError(
                "no endpoint URL (set --url, SHELLWIRE_URL or [endpoint] url)".to_string(),
            )
        })?;

        let token = match (&self.token, &self.token_file) {
            (Some(token), _) => token.clone(),
            (None, Some(path)) => BearerToken::from_file(path)?,
            (None, None) => {
                return Err(ConfigError::ValidationError(
                    "no token (set --token, SHELLWIRE_TOKEN or a token file)".to_string(),
                ))
            }
        };

        Ok(Endpoint::new(url, token))
    }

    /// Check values that would make sessions misbehave
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.url {
            if !(url.starts_with("ws://") || url.starts_with("wss://")) {
                return Err(ConfigError::ValidationError(format!(
                    "endpoint URL must use ws:// or wss://, got {url}"
                )));
            }
        }
        let connection = &self.session.connection;
        if connection.heartbeat.enabled && connection.heartbeat.interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "heartbeat interval must be greater than zero".to_string(),
            ));
        }
        if connection.connect_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "connect timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/shellwire/client.toml` or
/// `~/.config/shellwire/client.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("shellwire").join("client.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Arguments
///
/// * `path` - Optional path to the configuration file. If `None`, only defaults
///   and environment variables are used.
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or if `SHELLWIRE_TOKEN` holds an invalid token.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ClientConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration, reading environment variables through `env`
fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<ClientConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ClientConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ClientToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env)?;

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ClientConfig, toml: &ClientToml) {
    // Endpoint settings
    if toml.endpoint.url.is_some() {
        config.url = toml.endpoint.url.clone();
    }
    if toml.endpoint.token_file.is_some() {
        config.token_file = toml.endpoint.token_file.clone();
    }

    // Connection settings
    let connection = &mut config.session.connection;
    if let Some(ms) = toml.connection.connect_timeout_ms {
        connection.connect_timeout = Duration::from_millis(ms);
    }
    if let Some(enabled) = toml.connection.heartbeat_enabled {
        connection.heartbeat.enabled = enabled;
    }
    if let Some(secs) = toml.connection.heartbeat_interval_secs {
        connection.heartbeat.interval = Duration::from_secs(secs);
    }
    if let Some(ms) = toml.connection.close_timeout_ms {
        connection.close_timeout = Duration::from_millis(ms);
    }
    if let Some(capacity) = toml.connection.event_capacity {
        connection.event_capacity = capacity;
    }
    if let Some(size) = toml.connection.max_message_size {
        connection.max_message_size = size;
    }

    // Session settings
    if let Some(capacity) = toml.session.output_capacity {
        config.session.output_capacity = capacity;
    }
    if let Some(ms) = toml.session.env_sync_timeout_ms {
        config.session.env_sync_timeout = Duration::from_millis(ms);
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut ClientConfig, env: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let millis = |key: &str| env(key).and_then(|v| v.parse::<u64>().ok());

    if let Some(url) = env("SHELLWIRE_URL") {
        config.url = Some(url);
        config.source = ConfigSource::Env;
    }
    if let Some(token) = env("SHELLWIRE_TOKEN") {
        config.token = Some(BearerToken::new(token)?);
        config.source = ConfigSource::Env;
    }
    if let Some(path) = env("SHELLWIRE_TOKEN_FILE") {
        config.token_file = Some(PathBuf::from(path));
        config.source = ConfigSource::Env;
    }

    let connection = &mut config.session.connection;
    if let Some(ms) = millis("SHELLWIRE_CONNECT_TIMEOUT") {
        connection.connect_timeout = Duration::from_millis(ms);
        config.source = ConfigSource::Env;
    }
    if let Some(enabled) = env("SHELLWIRE_HEARTBEAT") {
        connection.heartbeat.enabled = enabled != "0" && enabled.to_lowercase() != "false";
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = millis("SHELLWIRE_HEARTBEAT_INTERVAL") {
        connection.heartbeat.interval = Duration::from_millis(ms);
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = millis("SHELLWIRE_CLOSE_TIMEOUT") {
        connection.close_timeout = Duration::from_millis(ms);
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = millis("SHELLWIRE_ENV_SYNC_TIMEOUT") {
        config.session.env_sync_timeout = Duration::from_millis(ms);
        config.source = ConfigSource::Env;
    }

    Ok(())
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Endpoint URL override
    pub url: Option<String>,

    /// Token override
    pub token: Option<BearerToken>,

    /// Token file override
    pub token_file: Option<PathBuf>,

    /// Heartbeat enabled override
    pub heartbeat_enabled: Option<bool>,

    /// Connect timeout override (milliseconds)
    pub connect_timeout_ms: Option<u64>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set endpoint URL override
    #[must_use]
    pub fn with_url(mut self, url: String) -> Self {
        self.url = Some(url);
        self
    }

    /// Set token override
    #[must_use]
    pub fn with_token(mut self, token: BearerToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Set token file override
    #[must_use]
    pub fn with_token_file(mut self, path: PathBuf) -> Self {
        self.token_file = Some(path);
        self
    }

    /// Set heartbeat enabled override
    #[must_use]
    pub fn with_heartbeat_enabled(mut self, enabled: bool) -> Self {
        self.heartbeat_enabled = Some(enabled);
        self
    }

    /// Set connect timeout override
    #[must_use]
    pub fn with_connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = Some(ms);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ClientConfig) {
        if self.url.is_some()
            || self.token.is_some()
            || self.token_file.is_some()
            || self.heartbeat_enabled.is_some()
            || self.connect_timeout_ms.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref url) = self.url {
            config.url = Some(url.clone());
        }

        if let Some(ref token) = self.token {
            config.token = Some(token.clone());
        }

        // An explicit token file wins over a token from the environment
        if let Some(ref path) = self.token_file {
            config.token_file = Some(path.clone());
            if self.token.is_none() {
                config.token = None;
            }
        }

        if let Some(enabled) = self.heartbeat_enabled {
            config.session.connection.heartbeat.enabled = enabled;
        }

        if let Some(ms) = self.connect_timeout_ms {
            config.session.connection.connect_timeout = Duration::from_millis(ms);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
