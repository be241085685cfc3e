//! Session Errors
//!
//! Terminal errors surfaced by command and console sessions. Every variant
//! is `Clone` so one failure can be reported to several waiters.

use thiserror::Error;

use crate::security::ValidationError;
use crate::transport::TransportError;

/// Errors that end a session or prevent it from starting
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Handshake failure or mid-session transport fault
    #[error("connection error: {0}")]
    Connection(#[from] TransportError),

    /// The server reported a failure instead of a result
    #[error("remote execution error: {0}")]
    RemoteExecution(String),

    /// The request was rejected before connecting
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    /// The session has not been started
    #[error("session not started")]
    NotStarted,

    /// `start()` was called more than once
    #[error("session already started")]
    AlreadyStarted,
}
