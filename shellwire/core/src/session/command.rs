//! Streaming Command Session
//!
//! Runs one non-interactive command and streams its output.
//!
//! # Lifecycle
//!
//! ```text
//! Created ──start()──► Connecting ──request sent──► Running ──► Terminated
//!                          │                                      ▲
//!                          └──────────── handshake failed ────────┘
//! ```
//!
//! The serialized request is the first and only text frame the client
//! sends. The session ends on exactly one of:
//!
//! - a result frame (`exit_code` / `timed_out`) → [`CommandOutcome::Completed`]
//! - an error frame (`error`) → [`SessionError::RemoteExecution`]
//! - a transport fault → [`SessionError::Connection`]
//! - the connection closing first, or [`CommandSession::close`] →
//!   [`CommandOutcome::Abnormal`]; no exit status is invented
//!
//! Both output streams end before the outcome is published.

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::output::{output_channel, OutputSender, OutputStream};
use super::{Endpoint, SessionConfig};
use crate::error::SessionError;
use crate::messages::{CommandRequest, CommandResult, ServerMessage};
use crate::security::{InputValidator, ValidationError};
use crate::transport::{Channel, Connection, ConnectionEvent, Frame};

/// Lifecycle of a command session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandState {
    /// Not started
    Created,
    /// Handshake in progress
    Connecting,
    /// Request sent, output flowing
    Running,
    /// Finished, for any reason
    Terminated,
}

/// How a command session ended without error
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The server reported a result
    Completed(CommandResult),
    /// The session ended before any result; the command's fate is unknown
    Abnormal,
}

impl CommandOutcome {
    /// Exit status, if one was reported
    #[must_use]
    pub fn status(&self) -> Option<i32> {
        match self {
            Self::Completed(result) => result.status(),
            Self::Abnormal => None,
        }
    }
}

type Completion = Option<Result<CommandOutcome, SessionError>>;

struct Shared {
    state: Mutex<CommandState>,
    connection: OnceLock<Connection>,
    done: watch::Sender<Completion>,
}

impl Shared {
    /// Publish the outcome; the first one wins
    fn finish(&self, outcome: Result<CommandOutcome, SessionError>) {
        *self.state.lock() = CommandState::Terminated;
        self.done.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(outcome);
                true
            } else {
                false
            }
        });
    }

    fn close_connection(&self) {
        if let Some(connection) = self.connection.get() {
            connection.close();
        }
    }
}

/// One streaming command execution
///
/// # Example
///
/// ```rust,ignore
/// let request = CommandRequest::new(["uname", "-a"]);
/// let mut session = CommandSession::new(endpoint, request)?;
/// session.start().await?;
///
/// let mut stdout = session.take_stdout().unwrap();
/// tokio::io::stdout().write_all(&stdout.read_to_end().await).await?;
///
/// match session.wait().await? {
///     CommandOutcome::Completed(result) => println!("exit {:?}", result.status()),
///     CommandOutcome::Abnormal => println!("connection lost"),
/// }
/// ```
pub struct CommandSession {
    id: Uuid,
    endpoint: Endpoint,
    request_json: String,
    config: SessionConfig,
    shared: Arc<Shared>,
    stdout: Mutex<Option<OutputStream>>,
    stderr: Mutex<Option<OutputStream>>,
}

impl CommandSession {
    /// Create a session for `request`
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Validation` if the request is rejected. No
    /// connection is attempted for an invalid request.
    pub fn new(endpoint: Endpoint, request: CommandRequest) -> Result<Self, SessionError> {
        InputValidator::default().validate_request(&request)?;
        let request_json = request
            .to_json()
            .map_err(|e| ValidationError::InvalidArgument {
                index: 0,
                reason: e.to_string(),
            })?;

        let (done, _) = watch::channel(None);
        Ok(Self {
            id: Uuid::new_v4(),
            endpoint,
            request_json,
            config: SessionConfig::default(),
            shared: Arc::new(Shared {
                state: Mutex::new(CommandState::Created),
                connection: OnceLock::new(),
                done,
            }),
            stdout: Mutex::new(None),
            stderr: Mutex::new(None),
        })
    }

    /// Use custom session settings
    #[must_use]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Session identifier used in logs
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> CommandState {
        *self.shared.state.lock()
    }

    /// Connect and send the request
    ///
    /// Returns once the request is on its way; output then flows on the
    /// streams from [`take_stdout`](Self::take_stdout) and
    /// [`take_stderr`](Self::take_stderr).
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AlreadyStarted` on a second call, or
    /// `SessionError::Connection` if the handshake fails. A failed session
    /// is terminated; it is never retried.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        {
            let mut state = self.shared.state.lock();
            if *state != CommandState::Created {
                return Err(SessionError::AlreadyStarted);
            }
            *state = CommandState::Connecting;
        }

        let span = info_span!("command_session", session_id = %self.id);

        let connected = Connection::connect(
            &self.endpoint.url,
            &self.endpoint.token,
            &self.config.connection,
        )
        .instrument(span.clone())
        .await;

        let (connection, events) = match connected {
            Ok(pair) => pair,
            Err(e) => {
                span.in_scope(|| warn!(error = %e, "Command session failed to connect"));
                let err = SessionError::Connection(e);
                self.shared.finish(Err(err.clone()));
                return Err(err);
            }
        };

        // The request must be the first frame on the wire
        connection.send_text(self.request_json.as_str());
        let _ = self.shared.connection.set(connection);
        *self.shared.state.lock() = CommandState::Running;

        let (stdout_tx, stdout) = output_channel(self.config.output_capacity);
        let (stderr_tx, stderr) = output_channel(self.config.output_capacity);
        *self.stdout.lock() = Some(stdout);
        *self.stderr.lock() = Some(stderr);

        span.in_scope(|| info!("Command request sent"));
        tokio::spawn(
            drive(Arc::clone(&self.shared), events, stdout_tx, stderr_tx).instrument(span),
        );

        Ok(())
    }

    /// Take the standard output stream; `None` before `start()` or once taken
    ///
    /// A taken stream must be read or dropped. Once it holds
    /// `output_capacity` unread chunks the session stops reading from the
    /// connection, and [`wait`](Self::wait) cannot resolve until the stream
    /// is drained or dropped.
    pub fn take_stdout(&self) -> Option<OutputStream> {
        self.stdout.lock().take()
    }

    /// Take the standard error stream; `None` before `start()` or once taken
    ///
    /// Same draining rule as [`take_stdout`](Self::take_stdout).
    pub fn take_stderr(&self) -> Option<OutputStream> {
        self.stderr.lock().take()
    }

    /// Wait for the session to end
    ///
    /// Streams that have not been taken are dropped first, so their output
    /// is discarded instead of holding up the session. Streams the caller
    /// took are not touched: read them concurrently (or drop them) while
    /// waiting, otherwise a command producing more than `output_capacity`
    /// chunks keeps this future pending.
    ///
    /// # Errors
    ///
    /// - `SessionError::NotStarted` if `start()` has not been called
    /// - `SessionError::RemoteExecution` if the server reported an error
    /// - `SessionError::Connection` on a handshake or transport fault
    pub async fn wait(&self) -> Result<CommandOutcome, SessionError> {
        if self.state() == CommandState::Created {
            return Err(SessionError::NotStarted);
        }

        drop(self.take_stdout());
        drop(self.take_stderr());

        let mut rx = self.shared.done.subscribe();
        let completion = rx
            .wait_for(Option::is_some)
            .await
            .map(|done| done.clone())
            .unwrap_or(Some(Ok(CommandOutcome::Abnormal)));

        completion.unwrap_or(Ok(CommandOutcome::Abnormal))
    }

    /// Exit status of a completed command
    ///
    /// `None` while running, after an abnormal end, or after an error.
    #[must_use]
    pub fn exit_status(&self) -> Option<i32> {
        match &*self.shared.done.borrow() {
            Some(Ok(outcome)) => outcome.status(),
            _ => None,
        }
    }

    /// Accepted and ignored; the server does not resize command sessions
    pub fn resize(&self, cols: u16, rows: u16) {
        debug!(session_id = %self.id, cols, rows, "Resize ignored for command session");
    }

    /// End the session. Idempotent.
    ///
    /// A pending [`wait`](Self::wait) resolves to [`CommandOutcome::Abnormal`]
    /// unless a result already arrived.
    pub fn close(&self) {
        if matches!(
            self.state(),
            CommandState::Connecting | CommandState::Running
        ) {
            info!(session_id = %self.id, "Closing command session");
            self.shared.finish(Ok(CommandOutcome::Abnormal));
        }
        self.shared.close_connection();
    }
}

impl std::fmt::Debug for CommandSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSession")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for CommandSession {
    fn drop(&mut self) {
        self.shared.close_connection();
    }
}

async fn drive(
    shared: Arc<Shared>,
    mut events: mpsc::Receiver<ConnectionEvent>,
    stdout: OutputSender,
    stderr: OutputSender,
) {
    let mut stdout = Some(stdout);
    let mut stderr = Some(stderr);

    let outcome = loop {
        let Some(event) = events.recv().await else {
            break Ok(CommandOutcome::Abnormal);
        };

        match event {
            ConnectionEvent::Frame(Frame::Binary { channel, payload }) => {
                let sink = match channel {
                    Channel::Output => &mut stdout,
                    Channel::ErrorOutput => &mut stderr,
                    other => {
                        debug!(channel = ?other, "Ignoring frame on unexpected channel");
                        continue;
                    }
                };
                forward(sink, payload).await;
            }
            ConnectionEvent::Frame(Frame::Text(text)) => match ServerMessage::parse(&text) {
                Ok(ServerMessage::Result(result)) => {
                    info!(
                        status = ?result.status(),
                        timed_out = result.timed_out,
                        truncated = result.truncated,
                        "Command finished"
                    );
                    break Ok(CommandOutcome::Completed(result));
                }
                Ok(ServerMessage::Error(message)) => {
                    warn!(error = %message, "Remote execution failed");
                    break Err(SessionError::RemoteExecution(message));
                }
                Ok(ServerMessage::Other(value)) => {
                    debug!(%value, "Ignoring unrecognized text frame");
                }
                Err(e) => {
                    warn!(error = %e, "Discarding malformed text frame");
                }
            },
            ConnectionEvent::Error(e) => {
                warn!(error = %e, "Command session transport fault");
                break Err(SessionError::Connection(e));
            }
            ConnectionEvent::Closed { code, reason } => {
                warn!(code, reason = %reason, "Connection closed before a result");
                break Ok(CommandOutcome::Abnormal);
            }
        }
    };

    // End both streams before anyone can observe the outcome
    drop(stdout);
    drop(stderr);

    shared.finish(outcome);
    shared.close_connection();
}

/// Deliver one chunk; a dropped stream discards the rest of its output
async fn forward(sink: &mut Option<OutputSender>, payload: Vec<u8>) {
    if let Some(tx) = sink {
        if tx.send(payload).await.is_err() {
            debug!("Output stream dropped, discarding further output");
            *sink = None;
        }
    }
}
