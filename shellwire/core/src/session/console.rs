//! Interactive Console Session
//!
//! A long-lived terminal attachment: local bytes go out on the input
//! channel, remote output comes back as a continuous stream.
//!
//! # Lifecycle
//!
//! ```text
//! Created ──start()──► Connecting ──► SynchronizingEnvironment ──► Open ──► Closed
//!                          │              (only with env vars)        ▲
//!                          └──────────────────────────────────────────┘
//!                                (no env vars: straight to Open)
//! ```
//!
//! No request frame is sent; the session is duplex as soon as the handshake
//! completes. When environment variables were supplied, `start()` returns
//! only after they have been injected and the marker came back, or the
//! injection timeout elapsed. Output that arrives during injection is held
//! back and handed to the output stream in arrival order once injection
//! ends. A transport fault or remote close moves the session to `Closed`
//! from any state and ends the output stream.

use std::collections::VecDeque;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::env_sync::EnvironmentSynchronizer;
use super::output::{output_channel, OutputSender, OutputStream};
use super::{Endpoint, SessionConfig};
use crate::error::SessionError;
use crate::messages::EnvVar;
use crate::security::InputValidator;
use crate::transport::{Channel, Connection, ConnectionEvent, Frame};

/// Lifecycle of a console session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsoleState {
    /// Not started
    Created,
    /// Handshake in progress
    Connecting,
    /// Injecting environment variables
    SynchronizingEnvironment,
    /// Ready for interactive use
    Open,
    /// Ended, for any reason
    Closed,
}

impl ConsoleState {
    /// Check if input is forwarded in this state
    #[must_use]
    pub fn accepts_input(&self) -> bool {
        matches!(self, Self::SynchronizingEnvironment | Self::Open)
    }
}

type Completion = Option<Result<(), SessionError>>;

struct Shared {
    state: Mutex<ConsoleState>,
    connection: OnceLock<Connection>,
    done: watch::Sender<Completion>,
}

impl Shared {
    fn write(&self, bytes: &[u8]) {
        let state = *self.state.lock();
        if !state.accepts_input() {
            debug!(?state, len = bytes.len(), "Dropping console input");
            return;
        }
        if let Some(connection) = self.connection.get() {
            connection.send_binary(Channel::Input, bytes);
        }
    }

    fn finish(&self, result: Result<(), SessionError>) {
        *self.state.lock() = ConsoleState::Closed;
        self.done.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(result);
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

/// Cloneable handle for writing to a console
///
/// Writes are fire-and-forget and silently dropped unless the session is
/// synchronizing or open.
#[derive(Clone)]
pub struct ConsoleInput {
    shared: Arc<Shared>,
}

impl ConsoleInput {
    /// Send `bytes` on the input channel, unmodified
    pub fn write(&self, bytes: &[u8]) {
        self.shared.write(bytes);
    }
}

impl std::fmt::Debug for ConsoleInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleInput")
            .field("state", &*self.shared.state.lock())
            .finish()
    }
}

/// One interactive console attachment
pub struct ConsoleSession {
    id: Uuid,
    endpoint: Endpoint,
    env: Vec<EnvVar>,
    config: SessionConfig,
    shared: Arc<Shared>,
    output: Mutex<Option<OutputStream>>,
}

impl ConsoleSession {
    /// Create a console session
    #[must_use]
    pub fn new(endpoint: Endpoint) -> Self {
        let (done, _) = watch::channel(None);
        Self {
            id: Uuid::new_v4(),
            endpoint,
            env: Vec::new(),
            config: SessionConfig::default(),
            shared: Arc::new(Shared {
                state: Mutex::new(ConsoleState::Created),
                connection: OnceLock::new(),
                done,
            }),
            output: Mutex::new(None),
        }
    }

    /// Inject `env` into the remote shell before the session opens
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Validation` for a name that is not a shell
    /// identifier or a value containing NUL.
    pub fn with_env(mut self, env: Vec<EnvVar>) -> Result<Self, SessionError> {
        InputValidator::default().validate_env(&env)?;
        self.env = env;
        Ok(self)
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
    pub fn state(&self) -> ConsoleState {
        *self.shared.state.lock()
    }

    /// Connect, inject the environment if any, and open the session
    ///
    /// Environment injection never fails the session: if the marker does
    /// not come back in time the session opens anyway. If the connection
    /// ends during injection the session is `Closed` when this returns.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AlreadyStarted` on a second call, or
    /// `SessionError::Connection` if the handshake fails.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        {
            let mut state = self.shared.state.lock();
            if *state != ConsoleState::Created {
                return Err(SessionError::AlreadyStarted);
            }
            *state = ConsoleState::Connecting;
        }

        let span = info_span!("console_session", session_id = %self.id);

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
                span.in_scope(|| warn!(error = %e, "Console session failed to connect"));
                let err = SessionError::Connection(e);
                self.shared.finish(Err(err.clone()));
                return Err(err);
            }
        };
        let _ = self.shared.connection.set(connection);

        let (output_tx, output) = output_channel(self.config.output_capacity);
        *self.output.lock() = Some(output);

        let synchronizing = !self.env.is_empty();
        let (tap_tx, mut tap_rx) = if synchronizing {
            let (tx, rx) = mpsc::unbounded_channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        *self.shared.state.lock() = if synchronizing {
            ConsoleState::SynchronizingEnvironment
        } else {
            ConsoleState::Open
        };

        tokio::spawn(
            drive(Arc::clone(&self.shared), events, output_tx, tap_tx).instrument(span.clone()),
        );

        if let Some(tap) = tap_rx.as_mut() {
            let synchronizer =
                EnvironmentSynchronizer::new(self.env.clone(), self.config.env_sync_timeout);
            let shared = Arc::clone(&self.shared);
            synchronizer
                .run(|bytes| shared.write(bytes), tap)
                .instrument(span.clone())
                .await;
        }
        // Stop mirroring output once injection is over
        drop(tap_rx);

        let mut state = self.shared.state.lock();
        if *state == ConsoleState::SynchronizingEnvironment {
            *state = ConsoleState::Open;
        }
        if *state == ConsoleState::Open {
            span.in_scope(|| info!("Console open"));
        }

        Ok(())
    }

    /// Take the output stream; `None` before `start()` or once taken
    pub fn take_output(&self) -> Option<OutputStream> {
        self.output.lock().take()
    }

    /// A handle for writing input, usable from other tasks
    #[must_use]
    pub fn input(&self) -> ConsoleInput {
        ConsoleInput {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Send `bytes` on the input channel; a no-op unless open
    pub fn write(&self, bytes: &[u8]) {
        self.shared.write(bytes);
    }

    /// Accepted and ignored; the server does not act on resize
    pub fn resize(&self, cols: u16, rows: u16) {
        debug!(session_id = %self.id, cols, rows, "Resize ignored for console session");
    }

    /// End the session. Idempotent.
    pub fn close(&self) {
        if !matches!(self.state(), ConsoleState::Created | ConsoleState::Closed) {
            info!(session_id = %self.id, "Closing console session");
            self.shared.finish(Ok(()));
        }
        self.shared.close_connection();
    }

    /// Wait until the session is closed
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotStarted` if `start()` has not been called,
    /// or `SessionError::Connection` if a transport fault ended the session.
    pub async fn closed(&self) -> Result<(), SessionError> {
        if self.state() == ConsoleState::Created {
            return Err(SessionError::NotStarted);
        }

        let mut rx = self.shared.done.subscribe();
        let completion = rx
            .wait_for(Option::is_some)
            .await
            .map(|done| done.clone())
            .unwrap_or(Some(Ok(())));

        completion.unwrap_or(Ok(()))
    }
}

impl std::fmt::Debug for ConsoleSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleSession")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("env_vars", &self.env.len())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for ConsoleSession {
    fn drop(&mut self) {
        self.shared.close_connection();
    }
}

async fn drive(
    shared: Arc<Shared>,
    mut events: mpsc::Receiver<ConnectionEvent>,
    output: OutputSender,
    mut tap: Option<mpsc::UnboundedSender<Vec<u8>>>,
) {
    let mut output = Some(output);
    // Output seen while injecting; the caller cannot drain the stream yet
    let mut held = VecDeque::new();
    let mut fault = None;

    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            () = injection_over(tap.as_ref()), if tap.is_some() => {
                tap = None;
                release(&mut held, &mut output).await;
                continue;
            }
        };
        let Some(event) = event else {
            break;
        };

        match event {
            ConnectionEvent::Frame(Frame::Binary {
                channel: Channel::Output | Channel::ErrorOutput,
                payload,
            }) => {
                if let Some(tx) = &tap {
                    if tx.send(payload.clone()).is_ok() {
                        held.push_back(payload);
                        continue;
                    }
                    tap = None;
                    release(&mut held, &mut output).await;
                }
                deliver(&mut output, payload).await;
            }
            ConnectionEvent::Frame(Frame::Binary { channel, .. }) => {
                debug!(?channel, "Ignoring frame on unexpected channel");
            }
            ConnectionEvent::Frame(Frame::Text(text)) => {
                debug!(len = text.len(), "Ignoring text frame on console");
            }
            ConnectionEvent::Error(e) => {
                warn!(error = %e, "Console transport fault");
                fault = Some(e);
            }
            ConnectionEvent::Closed { code, reason } => {
                info!(code, reason = %reason, "Console closed");
                break;
            }
        }
    }

    // Let a pending injection finish before waiting on the output stream
    drop(tap);
    release(&mut held, &mut output).await;
    drop(output);

    shared.finish(fault.map_or(Ok(()), |e| Err(SessionError::Connection(e))));
    shared.close_connection();
}

/// Resolves once `start()` stops listening for the injection marker
async fn injection_over(tap: Option<&mpsc::UnboundedSender<Vec<u8>>>) {
    match tap {
        Some(tap) => tap.closed().await,
        None => std::future::pending().await,
    }
}

/// Move held output into the stream, in arrival order
async fn release(held: &mut VecDeque<Vec<u8>>, output: &mut Option<OutputSender>) {
    while let Some(chunk) = held.pop_front() {
        deliver(output, chunk).await;
    }
}

/// Deliver one chunk; a dropped stream discards the rest of the output
async fn deliver(output: &mut Option<OutputSender>, payload: Vec<u8>) {
    if let Some(tx) = output.as_ref() {
        if tx.send(payload).await.is_err() {
            debug!("Output stream dropped, discarding further output");
            *output = None;
        }
    }
}
