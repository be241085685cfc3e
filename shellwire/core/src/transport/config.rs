//! Connection Configuration
//!
//! Tunables for a single connection: handshake timeout, keepalive, close
//! grace period and queue sizes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::heartbeat::HeartbeatConfig;

/// Default maximum WebSocket message size (16 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Connection configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// How long the upgrade handshake may take
    pub connect_timeout: Duration,

    /// Keepalive settings
    pub heartbeat: HeartbeatConfig,

    /// How long to wait for the peer to acknowledge a close before the
    /// transport is dropped anyway
    pub close_timeout: Duration,

    /// Capacity of the inbound event queue
    ///
    /// When the consumer falls behind, the reader stops pulling from the
    /// socket rather than buffering further.
    pub event_capacity: usize,

    /// Largest message accepted or sent
    pub max_message_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            heartbeat: HeartbeatConfig::default(),
            close_timeout: Duration::from_secs(5),
            event_capacity: 256,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl ConnectionConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `SHELLWIRE_CONNECT_TIMEOUT`: Connection timeout in ms
    /// - `SHELLWIRE_HEARTBEAT`: "0" or "false" to disable
    /// - `SHELLWIRE_HEARTBEAT_INTERVAL`: Heartbeat interval in ms
    /// - `SHELLWIRE_CLOSE_TIMEOUT`: Close grace period in ms
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let heartbeat_enabled = std::env::var("SHELLWIRE_HEARTBEAT")
            .map(|v| v != "0" && v.to_lowercase() != "false")
            .unwrap_or(true);

        let heartbeat_interval = std::env::var("SHELLWIRE_HEARTBEAT_INTERVAL")
            .ok()
            .and_then(|v| v.parse().ok())
            .map_or(defaults.heartbeat.interval, Duration::from_millis);

        Self {
            connect_timeout: std::env::var("SHELLWIRE_CONNECT_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .map_or(defaults.connect_timeout, Duration::from_millis),
            heartbeat: HeartbeatConfig {
                interval: heartbeat_interval,
                enabled: heartbeat_enabled,
            },
            close_timeout: std::env::var("SHELLWIRE_CLOSE_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .map_or(defaults.close_timeout, Duration::from_millis),
            ..defaults
        }
    }

    /// Short timeouts and a fast heartbeat, for tests
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            heartbeat: HeartbeatConfig::for_testing(),
            close_timeout: Duration::from_millis(200),
            ..Default::default()
        }
    }

    /// Set the connect timeout
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the heartbeat config
    #[must_use]
    pub fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Set the close grace period
    #[must_use]
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }
}
