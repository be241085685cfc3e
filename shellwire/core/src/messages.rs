//! Protocol Messages
//!
//! The JSON text frames exchanged on a command session, and the value types
//! built from them.
//!
//! # Wire Format
//!
//! ```text
//! client -> server (first and only text frame):
//!   {"command":["ls","-la"],"tty":false,"env":["KEY=VALUE"]}
//!
//! server -> client (terminal frame, one of):
//!   {"exit_code":0,"timed_out":false,"truncated":false}
//!   {"error":"sandbox not running"}
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::transport::FrameError;

/// Exit status reported for a command that hit its time limit
pub const TIMEOUT_EXIT_STATUS: i32 = 124;

/// One `KEY=VALUE` environment assignment
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EnvVar {
    /// Variable name
    pub key: String,
    /// Variable value, unescaped
    pub value: String,
}

impl EnvVar {
    /// Create an assignment
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for EnvVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

impl FromStr for EnvVar {
    type Err = String;

    /// Parse `KEY=VALUE`, splitting at the first `=`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((key, value)) => Ok(Self::new(key, value)),
            None => Err(format!("expected KEY=VALUE, got {s:?}")),
        }
    }
}

impl Serialize for EnvVar {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EnvVar {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Request that starts a streaming command
///
/// Sent once, as the first frame of the session, and never modified after.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Program and arguments
    pub command: Vec<String>,
    /// Whether the remote side allocates a terminal
    pub tty: bool,
    /// Environment assignments
    pub env: Vec<EnvVar>,
}

impl CommandRequest {
    /// Create a request for `command` with no terminal and no environment
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            tty: false,
            env: Vec::new(),
        }
    }

    /// Request a terminal
    #[must_use]
    pub fn with_tty(mut self, tty: bool) -> Self {
        self.tty = tty;
        self
    }

    /// Add an environment assignment
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push(EnvVar::new(key, value));
        self
    }

    /// Add several environment assignments
    #[must_use]
    pub fn with_envs(mut self, vars: impl IntoIterator<Item = EnvVar>) -> Self {
        self.env.extend(vars);
        self
    }

    /// Serialize to the wire form
    ///
    /// # Errors
    ///
    /// Returns an error only if serialization itself fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Outcome reported by the server for a finished command
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Captured text output, when the server includes it
    #[serde(default, rename = "stdout")]
    pub output: String,
    /// Exit code; absent when the process was killed by a signal
    #[serde(default)]
    pub exit_code: Option<i32>,
    /// Whether the command hit its time limit
    #[serde(default)]
    pub timed_out: bool,
    /// Whether the server cut the output short
    #[serde(default)]
    pub truncated: bool,
}

impl CommandResult {
    /// Exit status, with a timeout reported as [`TIMEOUT_EXIT_STATUS`]
    #[must_use]
    pub fn status(&self) -> Option<i32> {
        if self.timed_out {
            Some(TIMEOUT_EXIT_STATUS)
        } else {
            self.exit_code
        }
    }

    /// Whether the command exited with status 0
    #[must_use]
    pub fn success(&self) -> bool {
        self.status() == Some(0)
    }
}

/// A server -> client text frame, classified
#[derive(Clone, Debug, PartialEq)]
pub enum ServerMessage {
    /// Terminal result; ends the session
    Result(CommandResult),
    /// Remote failure; ends the session without a result
    Error(String),
    /// Valid JSON this client does not act on
    Other(Value),
}

impl ServerMessage {
    /// Classify a text frame
    ///
    /// A frame with an `exit_code` or `timed_out` key is a result; otherwise a
    /// frame with a string `error` is an error.
    ///
    /// # Errors
    ///
    /// Returns `FrameError::MalformedFrame` if the text is not JSON or a result
    /// frame has fields of the wrong type.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| FrameError::MalformedFrame(format!("invalid JSON text frame: {e}")))?;

        let Some(object) = value.as_object() else {
            return Ok(Self::Other(value));
        };

        if object.contains_key("exit_code") || object.contains_key("timed_out") {
            let result = serde_json::from_value(value)
                .map_err(|e| FrameError::MalformedFrame(format!("invalid result frame: {e}")))?;
            return Ok(Self::Result(result));
        }

        if let Some(error) = object.get("error").and_then(Value::as_str) {
            return Ok(Self::Error(error.to_string()));
        }

        Ok(Self::Other(value))
    }
}
