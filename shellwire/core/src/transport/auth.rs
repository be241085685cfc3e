//! Bearer Credential
//!
//! The credential presented on the WebSocket upgrade request.
//!
//! # Security Model
//!
//! - The token travels only in the `Authorization` header of the upgrade
//!   request, never in the URL or in a message frame
//! - `Debug` output is redacted so the token cannot leak through `tracing`
//! - Token files are read once and trimmed of surrounding whitespace

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors related to loading a credential
#[derive(Debug, Error)]
pub enum TokenError {
    /// Failed to read token file
    #[error("failed to read token file {path}: {source}")]
    ReadFailed {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Token is empty or not a valid header value
    #[error("invalid token format: {0}")]
    InvalidFormat(String),
}

/// Bearer token attached to every connection handshake
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    /// Create a token from a raw string
    ///
    /// # Errors
    ///
    /// Returns an error if the token is empty or contains characters that
    /// cannot appear in an HTTP header value.
    pub fn new(token: impl Into<String>) -> Result<Self, TokenError> {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            return Err(TokenError::InvalidFormat("token is empty".to_string()));
        }
        if token.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return Err(TokenError::InvalidFormat(
                "token contains whitespace or control characters".to_string(),
            ));
        }
        Ok(Self(token))
    }

    /// Read a token from a file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or holds an invalid token.
    pub fn from_file(path: &Path) -> Result<Self, TokenError> {
        let contents = std::fs::read_to_string(path).map_err(|source| TokenError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(contents)
    }

    /// Value of the `Authorization` header
    #[must_use]
    pub fn header_value(&self) -> String {
        format!("Bearer {}", self.0)
    }

    /// The raw token
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken([REDACTED])")
    }
}
