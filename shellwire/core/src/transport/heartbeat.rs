//! Keepalive Heartbeat
//!
//! While a connection is open its writer task originates a WebSocket Ping at
//! a fixed interval. This layer only sends heartbeats; detecting a dead peer
//! is left to the transport.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Configuration for heartbeat behavior
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Interval between pings (default: 30 seconds)
    pub interval: Duration,
    /// Whether heartbeat is enabled (can be disabled for testing)
    pub enabled: bool,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            enabled: true,
        }
    }
}

impl HeartbeatConfig {
    /// Create a new config with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config with heartbeat disabled
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Set the heartbeat interval
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Create a config suitable for testing (shorter interval)
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            interval: Duration::from_millis(50),
            enabled: true,
        }
    }
}

/// Ticker driving heartbeat pings
///
/// The first tick fires one full interval after creation. When disabled,
/// [`Heartbeat::tick`] never completes, so it can sit in a `select!` arm.
#[derive(Debug)]
pub struct Heartbeat {
    interval: Option<Interval>,
    sent: u64,
}

impl Heartbeat {
    /// Create a ticker from config
    #[must_use]
    pub fn new(config: &HeartbeatConfig) -> Self {
        let interval = (config.enabled && !config.interval.is_zero()).then(|| {
            let mut interval =
                tokio::time::interval_at(Instant::now() + config.interval, config.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        Self { interval, sent: 0 }
    }

    /// Wait for the next heartbeat
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
                self.sent += 1;
            }
            None => std::future::pending().await,
        }
    }

    /// Number of heartbeats fired so far
    #[must_use]
    pub fn sent(&self) -> u64 {
        self.sent
    }
}
