//! Frame Protocol
//!
//! Wire format for the multiplexed channels carried over one WebSocket.
//!
//! # Frame Format
//!
//! Binary frames carry a one-byte channel tag followed by the raw payload:
//!
//! ```text
//! +-------------+------------------------------------------+
//! | Channel (1) | Payload (variable, may be empty)         |
//! +-------------+------------------------------------------+
//! ```
//!
//! | Tag    | Channel       | Direction        |
//! |--------|---------------|------------------|
//! | `0x01` | `Output`      | server -> client |
//! | `0x02` | `ErrorOutput` | server -> client |
//! | `0x03` | `Input`       | client -> server |
//! | `0x04` | `Resize`      | client -> server |
//!
//! Text frames are opaque UTF-8 strings at this layer. JSON parsing happens
//! in [`crate::messages`].
//!
//! Unknown tags decode to [`Channel::Unrecognized`] so that a newer server can
//! add channels without breaking older clients.

use thiserror::Error;

const TAG_OUTPUT: u8 = 0x01;
const TAG_ERROR_OUTPUT: u8 = 0x02;
const TAG_INPUT: u8 = 0x03;
const TAG_RESIZE: u8 = 0x04;

/// Errors produced while decoding a frame
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The frame could not be interpreted (empty binary frame, invalid JSON)
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
}

/// Logical stream a binary frame belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Process standard output (server -> client)
    Output,
    /// Process standard error (server -> client)
    ErrorOutput,
    /// Terminal input (client -> server)
    Input,
    /// Terminal resize (client -> server, currently ignored remotely)
    Resize,
    /// A tag this client does not know about
    Unrecognized(u8),
}

impl Channel {
    /// Wire tag for this channel
    #[must_use]
    pub fn tag(self) -> u8 {
        match self {
            Self::Output => TAG_OUTPUT,
            Self::ErrorOutput => TAG_ERROR_OUTPUT,
            Self::Input => TAG_INPUT,
            Self::Resize => TAG_RESIZE,
            Self::Unrecognized(tag) => tag,
        }
    }

    /// Map a wire tag to a channel. Never fails.
    #[must_use]
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            TAG_OUTPUT => Self::Output,
            TAG_ERROR_OUTPUT => Self::ErrorOutput,
            TAG_INPUT => Self::Input,
            TAG_RESIZE => Self::Resize,
            other => Self::Unrecognized(other),
        }
    }

    /// Whether frames on this channel originate at the server
    #[must_use]
    pub fn is_server_to_client(self) -> bool {
        matches!(self, Self::Output | Self::ErrorOutput)
    }
}

/// A single decoded unit received on or sent over the connection
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Channel-tagged binary payload
    Binary {
        /// Channel the payload belongs to
        channel: Channel,
        /// Payload bytes (tag stripped)
        payload: Vec<u8>,
    },
    /// Control/text message, passed through untouched
    Text(String),
}

/// Prepend the channel tag to `payload`
#[must_use]
pub fn encode_binary(channel: Channel, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + payload.len());
    buf.push(channel.tag());
    buf.extend_from_slice(payload);
    buf
}

/// Split a binary frame into its channel and payload
///
/// # Errors
///
/// Returns `FrameError::MalformedFrame` if `data` is empty (no channel tag).
pub fn decode_binary(data: &[u8]) -> Result<(Channel, &[u8]), FrameError> {
    match data.split_first() {
        Some((&tag, payload)) => Ok((Channel::from_tag(tag), payload)),
        None => Err(FrameError::MalformedFrame(
            "binary frame has no channel tag".to_string(),
        )),
    }
}
