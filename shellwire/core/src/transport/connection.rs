//! WebSocket Connection
//!
//! Owns one duplex WebSocket for the lifetime of one session.
//!
//! # Architecture
//!
//! ```text
//!                   ┌──────────────────────────────────────┐
//!  send_binary() ──►│ outgoing queue ──► writer task ──────┼──► socket
//!  send_text()      │                     ▲  (heartbeat)   │
//!  close()          │                     │ Shutdown       │
//!                   │ events (bounded) ◄── reader task ◄───┼─── socket
//!                   └──────────────────────────────────────┘
//! ```
//!
//! - Writes never suspend the caller: they go onto an unbounded queue and
//!   are dropped when the connection is not open
//! - Reads are delivered in wire order on a bounded queue, so a slow
//!   consumer stalls the socket instead of growing a buffer
//! - `Closed` is always the last event, delivered exactly once
//! - The credential is sent as an `Authorization` header on the upgrade
//!   request only

use std::sync::Arc;

use futures::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{
    self,
    client::IntoClientRequest,
    http::{header::AUTHORIZATION, HeaderValue},
    protocol::{frame::coding::CloseCode, CloseFrame, WebSocketConfig},
    Message,
};
use tracing::{debug, info, trace, warn, Instrument};

use super::auth::BearerToken;
use super::config::ConnectionConfig;
use super::frame::{self, Channel, Frame};
use super::heartbeat::Heartbeat;
use super::traits::{ConnectionEvent, ConnectionState, TransportError};

/// Commands for the writer task
#[derive(Debug)]
enum Outgoing {
    Frame(Message),
    Close,
    Shutdown,
}

/// State shared between the handle and its tasks
#[derive(Debug)]
struct Shared {
    state: Mutex<ConnectionState>,
    /// Fires when the reader must stop without waiting for the peer
    force_close: Notify,
    /// Fault observed by the writer, reported by the reader
    write_fault: Mutex<Option<TransportError>>,
}

/// Handle to one open connection
///
/// Dropping the handle closes the connection.
#[derive(Debug)]
pub struct Connection {
    outgoing: mpsc::UnboundedSender<Outgoing>,
    shared: Arc<Shared>,
}

impl Connection {
    /// Open a connection to `url`, presenting `token` as a bearer credential
    ///
    /// Returns the handle and the receiver for its events. Must be called
    /// from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns a `TransportError` if the URL is invalid, the handshake is
    /// rejected, TLS or the TCP connection fails, or the handshake exceeds
    /// `config.connect_timeout`. Failures are never retried here.
    pub async fn connect(
        url: &str,
        token: &BearerToken,
        config: &ConnectionConfig,
    ) -> Result<(Self, mpsc::Receiver<ConnectionEvent>), TransportError> {
        let mut request = url.into_client_request()?;
        let header = HeaderValue::from_str(&token.header_value())
            .map_err(|e| TransportError::InvalidUrl(format!("bad credential header: {e}")))?;
        request.headers_mut().insert(AUTHORIZATION, header);

        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(config.max_message_size);
        ws_config.max_frame_size = Some(config.max_message_size);

        debug!(url, "Connecting");

        let handshake =
            tokio_tungstenite::connect_async_with_config(request, Some(ws_config), true);
        let (ws, response) = tokio::time::timeout(config.connect_timeout, handshake)
            .await
            .map_err(|_| {
                TransportError::Timeout(
                    u64::try_from(config.connect_timeout.as_millis()).unwrap_or(u64::MAX),
                )
            })??;

        info!(url, status = response.status().as_u16(), "Connected");

        Ok(Self::from_stream(ws, config))
    }

    /// Wrap an already-upgraded WebSocket stream
    ///
    /// Spawns the reader and writer tasks on the current runtime.
    pub fn from_stream<S>(ws: S, config: &ConnectionConfig) -> (Self, mpsc::Receiver<ConnectionEvent>)
    where
        S: Stream<Item = Result<Message, tungstenite::Error>>
            + Sink<Message, Error = tungstenite::Error>
            + Send
            + Unpin
            + 'static,
    {
        let (sink, stream) = ws.split();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity.max(1));

        let shared = Arc::new(Shared {
            state: Mutex::new(ConnectionState::Open),
            force_close: Notify::new(),
            write_fault: Mutex::new(None),
        });

        tokio::spawn(
            run_writer(sink, outgoing_rx, Arc::clone(&shared), config.clone()).in_current_span(),
        );
        tokio::spawn(
            run_reader(stream, event_tx, Arc::clone(&shared), outgoing_tx.clone())
                .in_current_span(),
        );

        (
            Self {
                outgoing: outgoing_tx,
                shared,
            },
            event_rx,
        )
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    /// Check if frames can currently be sent
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// Send a channel-tagged binary frame; dropped unless open
    pub fn send_binary(&self, channel: Channel, payload: &[u8]) {
        self.send(Message::Binary(frame::encode_binary(channel, payload)));
    }

    /// Send a text frame; dropped unless open
    pub fn send_text(&self, text: impl Into<String>) {
        self.send(Message::Text(text.into()));
    }

    fn send(&self, msg: Message) {
        let state = self.shared.state.lock();
        if !state.is_open() {
            debug!(state = %*state, "Dropping frame on connection that is not open");
            return;
        }
        // Queued under the lock so nothing can land behind a Close
        if self.outgoing.send(Outgoing::Frame(msg)).is_err() {
            debug!("Writer task gone, frame dropped");
        }
    }

    /// Start a graceful close. Idempotent.
    pub fn close(&self) {
        begin_close(&self.shared, &self.outgoing);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

fn begin_close(shared: &Shared, outgoing: &mpsc::UnboundedSender<Outgoing>) {
    let mut state = shared.state.lock();
    if matches!(*state, ConnectionState::Connecting | ConnectionState::Open) {
        *state = ConnectionState::Closing;
        let _ = outgoing.send(Outgoing::Close);
        info!("Closing connection");
    }
}

async fn run_writer<W>(
    mut sink: W,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    shared: Arc<Shared>,
    config: ConnectionConfig,
) where
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let mut heartbeat = Heartbeat::new(&config.heartbeat);
    let mut close_deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            cmd = outgoing.recv() => match cmd {
                Some(Outgoing::Frame(msg)) => {
                    if let Err(e) = sink.send(msg).await {
                        record_write_fault(&shared, e);
                        break;
                    }
                }
                Some(Outgoing::Close) => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "".into(),
                    };
                    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                        debug!(error = %e, "Close frame not delivered");
                        shared.force_close.notify_one();
                        break;
                    }
                    close_deadline = Some(Instant::now() + config.close_timeout);
                }
                Some(Outgoing::Shutdown) | None => break,
            },
            () = heartbeat.tick(), if close_deadline.is_none() => {
                trace!(seq = heartbeat.sent(), "Heartbeat ping");
                if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                    record_write_fault(&shared, e);
                    break;
                }
            }
            () = sleep_until_deadline(close_deadline), if close_deadline.is_some() => {
                debug!("Peer did not complete close handshake in time");
                shared.force_close.notify_one();
                break;
            }
        }
    }

    let _ = tokio::time::timeout(config.close_timeout, sink.close()).await;
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn record_write_fault(shared: &Shared, err: tungstenite::Error) {
    warn!(error = %err, "Write error");
    shared.write_fault.lock().get_or_insert(TransportError::from(err));
    shared.force_close.notify_one();
}

async fn run_reader<R>(
    mut stream: R,
    events: mpsc::Sender<ConnectionEvent>,
    shared: Arc<Shared>,
    outgoing: mpsc::UnboundedSender<Outgoing>,
) where
    R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let mut consumer_gone = false;

    let (code, reason) = loop {
        let next = tokio::select! {
            biased;
            () = shared.force_close.notified() => {
                let fault = shared.write_fault.lock().take();
                match fault {
                    Some(err) => {
                        let reason = err.to_string();
                        let _ = events.send(ConnectionEvent::Error(err)).await;
                        break (None, reason);
                    }
                    None => break (None, String::new()),
                }
            }
            next = stream.next() => next,
        };

        let event = match next {
            Some(Ok(Message::Binary(data))) => match frame::decode_binary(&data) {
                Ok((channel, payload)) => ConnectionEvent::Frame(Frame::Binary {
                    channel,
                    payload: payload.to_vec(),
                }),
                Err(e) => {
                    warn!(error = %e, "Discarding malformed frame");
                    continue;
                }
            },
            Some(Ok(Message::Text(text))) => ConnectionEvent::Frame(Frame::Text(text)),
            Some(Ok(Message::Close(frame))) => {
                debug!(?frame, "Peer closed connection");
                break match frame {
                    Some(frame) => (Some(u16::from(frame.code)), frame.reason.to_string()),
                    None => (None, String::new()),
                };
            }
            Some(Ok(_)) => continue,
            Some(Err(
                tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed,
            ))
            | None => break (None, String::new()),
            Some(Err(e)) => {
                let err = TransportError::from(e);
                warn!(error = %err, "Read error");
                let reason = err.to_string();
                let _ = events.send(ConnectionEvent::Error(err)).await;
                break (None, reason);
            }
        };

        if !consumer_gone && events.send(event).await.is_err() {
            debug!("Event receiver dropped, closing connection");
            consumer_gone = true;
            begin_close(&shared, &outgoing);
        }
    };

    *shared.state.lock() = ConnectionState::Closed;
    let _ = outgoing.send(Outgoing::Shutdown);
    let _ = events
        .send(ConnectionEvent::Closed {
            code,
            reason: reason.clone(),
        })
        .await;

    info!(code, reason = %reason, "Connection closed");
}
