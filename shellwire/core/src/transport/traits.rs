//! Transport Types
//!
//! Shared definitions between the connection and the sessions built on it:
//! the error type, the lifecycle state and the events a connection emits.

use std::fmt;

use thiserror::Error;

use super::frame::Frame;

/// Errors that can occur while establishing or running a connection
///
/// Every variant is a "connection error" in the protocol sense. None of them
/// are retried by this crate.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// DNS, TCP or other I/O failure
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    /// The server answered the upgrade request with a non-101 status
    #[error("handshake rejected with HTTP status {status}")]
    HandshakeRejected {
        /// HTTP status returned by the server
        status: u16,
    },
    /// TLS negotiation failed
    #[error("TLS error: {0}")]
    Tls(String),
    /// The handshake did not complete in time
    #[error("connection timed out after {0} ms")]
    Timeout(u64),
    /// The endpoint URL or credential could not form a valid request
    #[error("invalid request: {0}")]
    InvalidUrl(String),
    /// WebSocket protocol violation or mid-session transport fault
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match err {
            WsError::Http(response) => Self::HandshakeRejected {
                status: response.status().as_u16(),
            },
            WsError::Tls(e) => Self::Tls(e.to_string()),
            WsError::Io(e) => Self::ConnectionFailed(e.to_string()),
            WsError::Url(e) => Self::InvalidUrl(e.to_string()),
            WsError::HttpFormat(e) => Self::InvalidUrl(e.to_string()),
            other => Self::Protocol(other.to_string()),
        }
    }
}

/// Lifecycle of a connection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in progress
    Connecting,
    /// Handshake complete, frames flow both ways
    Open,
    /// Close requested, waiting for the peer
    Closing,
    /// Transport released
    Closed,
}

impl ConnectionState {
    /// Check if the connection accepts outgoing frames
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Check if the connection is in a terminal state
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Events delivered by a connection, in wire order
///
/// `Closed` is always the final event and is delivered exactly once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A decoded binary frame or an untouched text frame
    Frame(Frame),
    /// A transport fault; always followed by `Closed`
    Error(TransportError),
    /// The connection is gone
    Closed {
        /// WebSocket close code, if the peer sent one
        code: Option<u16>,
        /// Close reason (may be empty)
        reason: String,
    },
}
