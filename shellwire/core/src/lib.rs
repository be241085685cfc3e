//! Shellwire Core - Multiplexed WebSocket Sessions for Remote Shells
//!
//! This crate is the client side of a streaming protocol that runs remote
//! commands and attaches interactive terminals over one WebSocket per
//! session. It has no UI and no CLI of its own; the `shellwire` binary and
//! any embedding application drive it through the session types.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            Caller                                │
//! │       CommandSession::wait()          ConsoleSession::input()    │
//! │       OutputStream (stdout/stderr)    OutputStream (terminal)    │
//! └───────────────┬──────────────────────────────┬───────────────────┘
//!                 │                              │
//! ┌───────────────┼──────────────────────────────┼───────────────────┐
//! │               ▼          SESSIONS            ▼                   │
//! │  ┌─────────────────────────┐   ┌──────────────────────────────┐  │
//! │  │  Streaming Command      │   │  Interactive Console         │  │
//! │  │  request → output →     │   │  ┌────────────────────────┐  │  │
//! │  │  result                 │   │  │ Environment Injection  │  │  │
//! │  └────────────┬────────────┘   │  └────────────────────────┘  │  │
//! │               │                └───────────────┬──────────────┘  │
//! └───────────────┼────────────────────────────────┼─────────────────┘
//!                 │                                │
//! ┌───────────────┼────────────────────────────────┼─────────────────┐
//! │               ▼          TRANSPORT             ▼                 │
//! │   Connection (handshake + bearer, heartbeat, close, events)      │
//! │   Frame codec: [channel tag][payload] | JSON text                │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`CommandSession`]: One command execution with streamed output
//! - [`ConsoleSession`]: One interactive terminal attachment
//! - [`Connection`]: One WebSocket, owned by exactly one session
//! - [`Channel`] / [`Frame`]: The wire framing
//! - [`SessionError`]: How a session can fail
//!
//! # Quick Start
//!
//! ```ignore
//! use shellwire_core::{BearerToken, CommandOutcome, CommandRequest, CommandSession, Endpoint};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let endpoint = Endpoint::new(
//!         "wss://sandbox.example.com/v1/sandboxes/dev/exec",
//!         BearerToken::new(std::env::var("SHELLWIRE_TOKEN")?)?,
//!     );
//!
//!     let mut session = CommandSession::new(endpoint, CommandRequest::new(["ls", "-la"]))?;
//!     session.start().await?;
//!
//!     let mut stdout = session.take_stdout().expect("started");
//!     print!("{}", stdout.read_to_string().await);
//!
//!     if let CommandOutcome::Completed(result) = session.wait().await? {
//!         std::process::exit(result.status().unwrap_or(1));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`transport`]: Frame codec, bearer credential, heartbeat, connection
//! - [`session`]: Command and console sessions, output streams, environment injection
//! - [`messages`]: JSON request and result frames
//! - [`security`]: Request validation before connecting
//! - [`config`]: TOML file, environment and CLI configuration
//! - [`error`]: Session error type

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod messages;
pub mod security;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use error::SessionError;
pub use messages::{CommandRequest, CommandResult, EnvVar, ServerMessage, TIMEOUT_EXIT_STATUS};
pub use security::{InputValidator, RequestLimits, ValidationError};

// Session exports
pub use session::{
    CommandOutcome, CommandSession, CommandState, ConsoleInput, ConsoleSession, ConsoleState,
    Endpoint, EnvironmentSynchronizer, OutputStream, SessionConfig, SyncMarker, SyncOutcome,
};

// Transport exports
pub use transport::{
    BearerToken, Channel, Connection, ConnectionConfig, ConnectionEvent, ConnectionState, Frame,
    FrameError, HeartbeatConfig, TokenError, TransportError,
};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ClientConfig, ClientToml,
    ConfigError, ConfigOverrides, ConfigSource,
};
