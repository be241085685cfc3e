//! Transport Layer
//!
//! Everything below the sessions: the channel framing, the bearer
//! credential, keepalive and the WebSocket connection itself.
//!
//! # Design Philosophy
//!
//! The transport knows nothing about commands or consoles. It moves
//! channel-tagged binary frames and opaque text frames in wire order and
//! reports how the connection ended. Sessions decide what the frames mean.
//!
//! # Security
//!
//! - The bearer token is sent as a handshake header, never in the URL
//! - `wss://` endpoints are verified against the bundled web PKI roots
//! - Inbound message size is capped by `ConnectionConfig::max_message_size`

pub mod auth;
pub mod config;
pub mod connection;
pub mod frame;
pub mod heartbeat;
pub mod traits;

// Re-exports for convenience
pub use auth::{BearerToken, TokenError};
pub use config::ConnectionConfig;
pub use connection::Connection;
pub use frame::{decode_binary, encode_binary, Channel, Frame, FrameError};
pub use heartbeat::{Heartbeat, HeartbeatConfig};
pub use traits::{ConnectionEvent, ConnectionState, TransportError};
