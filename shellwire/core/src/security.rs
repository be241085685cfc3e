//! Security Module
//!
//! Request validation run before a session opens a connection.
//!
//! # Design Philosophy
//!
//! Untrusted input enters the client in two places: the command to run and
//! the environment to inject. Both end up either inside a JSON frame or typed
//! into a remote shell, so they are checked at session construction and a
//! session with bad input never touches the network.
//!
//! All validation is fail-safe: when in doubt, reject the input.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::messages::{CommandRequest, EnvVar};

/// Reasons a request is rejected before a session starts
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The command has no program to run
    #[error("command is empty")]
    EmptyCommand,

    /// An argument contains a NUL byte or exceeds the length limit
    #[error("invalid argument {index}: {reason}")]
    InvalidArgument {
        /// Position in the argument list
        index: usize,
        /// What is wrong with it
        reason: String,
    },

    /// An environment variable name is not a valid shell identifier
    #[error("invalid environment variable name: {0:?}")]
    InvalidEnvName(String),

    /// An environment variable value contains a NUL byte
    #[error("invalid value for environment variable {0}")]
    InvalidEnvValue(String),

    /// Too many arguments or environment assignments
    #[error("too many {what}: {count} (max: {max})")]
    TooManyArguments {
        /// "arguments" or "environment variables"
        what: &'static str,
        /// Number supplied
        count: usize,
        /// Configured limit
        max: usize,
    },

    /// The serialized request exceeds the size limit
    #[error("request too large: {size} bytes (max: {max})")]
    RequestTooLarge {
        /// Serialized size in bytes
        size: usize,
        /// Configured limit
        max: usize,
    },
}

/// Size limits for requests
///
/// These limits keep a request well under what the server accepts in one
/// frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLimits {
    /// Maximum number of arguments including the program (default: 4096)
    pub max_args: usize,
    /// Maximum length of one argument in bytes (default: 128KB)
    pub max_arg_len: usize,
    /// Maximum number of environment assignments (default: 1024)
    pub max_env: usize,
    /// Maximum serialized request size in bytes (default: 1MB)
    pub max_request_bytes: usize,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_args: 4096,
            max_arg_len: 128 * 1024, // 128KB
            max_env: 1024,
            max_request_bytes: 1024 * 1024, // 1MB
        }
    }
}

/// Validator for command requests and environment assignments
#[derive(Clone, Debug, Default)]
pub struct InputValidator {
    limits: RequestLimits,
}

impl InputValidator {
    /// Create a validator with the given limits
    #[must_use]
    pub fn new(limits: RequestLimits) -> Self {
        Self { limits }
    }

    /// The limits in force
    #[must_use]
    pub fn limits(&self) -> &RequestLimits {
        &self.limits
    }

    /// Validate a full command request
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate_request(&self, request: &CommandRequest) -> Result<(), ValidationError> {
        match request.command.first() {
            None => return Err(ValidationError::EmptyCommand),
            Some(program) if program.is_empty() => return Err(ValidationError::EmptyCommand),
            Some(_) => {}
        }

        if request.command.len() > self.limits.max_args {
            return Err(ValidationError::TooManyArguments {
                what: "arguments",
                count: request.command.len(),
                max: self.limits.max_args,
            });
        }

        for (index, arg) in request.command.iter().enumerate() {
            if arg.contains('\0') {
                return Err(ValidationError::InvalidArgument {
                    index,
                    reason: "contains NUL byte".to_string(),
                });
            }
            if arg.len() > self.limits.max_arg_len {
                return Err(ValidationError::InvalidArgument {
                    index,
                    reason: format!("{} bytes (max: {})", arg.len(), self.limits.max_arg_len),
                });
            }
        }

        self.validate_env(&request.env)?;

        let size = request
            .to_json()
            .map_err(|e| ValidationError::InvalidArgument {
                index: 0,
                reason: e.to_string(),
            })?
            .len();
        if size > self.limits.max_request_bytes {
            return Err(ValidationError::RequestTooLarge {
                size,
                max: self.limits.max_request_bytes,
            });
        }

        Ok(())
    }

    /// Validate environment assignments
    ///
    /// Names must match `[A-Za-z_][A-Za-z0-9_]*`. Values may contain
    /// anything except NUL, including quotes and newlines.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate_env(&self, env: &[EnvVar]) -> Result<(), ValidationError> {
        if env.len() > self.limits.max_env {
            return Err(ValidationError::TooManyArguments {
                what: "environment variables",
                count: env.len(),
                max: self.limits.max_env,
            });
        }

        for var in env {
            if !is_valid_env_name(&var.key) {
                return Err(ValidationError::InvalidEnvName(var.key.clone()));
            }
            if var.value.contains('\0') {
                return Err(ValidationError::InvalidEnvValue(var.key.clone()));
            }
        }

        Ok(())
    }
}

/// Check that `name` is a POSIX shell identifier
#[must_use]
pub fn is_valid_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
