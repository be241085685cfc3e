//! Sessions
//!
//! A session is one use of the protocol for one purpose, bound to exactly one
//! [`Connection`](crate::transport::Connection) for its whole life.
//!
//! # Session Types
//!
//! - [`CommandSession`]: run one command, stream its output, await its result
//! - [`ConsoleSession`]: attach an interactive terminal, optionally injecting
//!   environment variables before it is declared open
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐  start()   ┌────────────┐  events   ┌──────────────┐
//! │  Session   │ ─────────► │ Connection │ ────────► │ driver task  │
//! │  (handle)  │            └────────────┘           │ (per session)│
//! └────────────┘                   ▲                 └──────┬───────┘
//!       ▲  wait() / closed()       │ close() on every       │ OutputStream
//!       └────────── watch ─────────┴── exit path ───────────┘ (bounded)
//! ```
//!
//! Sessions share no state with each other. Every session creates its own
//! connection and closes it when it ends, whatever the reason.

pub mod command;
pub mod console;
pub mod env_sync;
pub mod output;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transport::{BearerToken, ConnectionConfig};

// Re-exports for convenience
pub use command::{CommandOutcome, CommandSession, CommandState};
pub use console::{ConsoleInput, ConsoleSession, ConsoleState};
pub use env_sync::{EnvironmentSynchronizer, MarkerScanner, SyncMarker, SyncOutcome};
pub use output::OutputStream;

/// Where a session connects and how it authenticates
#[derive(Clone, Debug)]
pub struct Endpoint {
    /// `ws://` or `wss://` URL of the session endpoint
    pub url: String,
    /// Credential sent on the upgrade request
    pub token: BearerToken,
}

impl Endpoint {
    /// Create an endpoint
    pub fn new(url: impl Into<String>, token: BearerToken) -> Self {
        Self {
            url: url.into(),
            token,
        }
    }
}

/// Session tunables
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Settings for the underlying connection
    pub connection: ConnectionConfig,

    /// Chunks each output stream holds before the connection is paused
    pub output_capacity: usize,

    /// How long environment injection waits for its marker
    pub env_sync_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            output_capacity: 256,
            env_sync_timeout: Duration::from_secs(3),
        }
    }
}

impl SessionConfig {
    /// Short timeouts for tests
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            connection: ConnectionConfig::for_testing(),
            output_capacity: 64,
            env_sync_timeout: Duration::from_millis(300),
        }
    }

    /// Set the connection config
    #[must_use]
    pub fn with_connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    /// Set the environment injection timeout
    #[must_use]
    pub fn with_env_sync_timeout(mut self, timeout: Duration) -> Self {
        self.env_sync_timeout = timeout;
        self
    }
}
