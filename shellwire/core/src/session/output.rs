//! Output Streams
//!
//! Append-only, single-consumer byte sequences fed by a session driver.
//! A stream ends exactly once, when the session drops its sending half.
//! Chunks are drained as they are read and never replayed.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Sending half held by the session driver
pub(crate) type OutputSender = mpsc::Sender<Vec<u8>>;

/// Create a stream and the sender that feeds it
pub(crate) fn output_channel(capacity: usize) -> (OutputSender, OutputStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (tx, OutputStream::new(rx))
}

/// Remote output, in the order it arrived on the wire
///
/// The channel is bounded: while the stream is not drained the session stops
/// reading from the connection. Dropping the stream discards further output.
#[derive(Debug)]
pub struct OutputStream {
    inner: ReceiverStream<Vec<u8>>,
}

impl OutputStream {
    fn new(rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self {
            inner: ReceiverStream::new(rx),
        }
    }

    /// Next chunk, or `None` once the stream has ended
    pub async fn next_chunk(&mut self) -> Option<Vec<u8>> {
        self.inner.next().await
    }

    /// Collect everything until the stream ends
    pub async fn read_to_end(&mut self) -> Vec<u8> {
        let mut buf = Vec::new();
        while let Some(chunk) = self.next_chunk().await {
            buf.extend_from_slice(&chunk);
        }
        buf
    }

    /// Collect everything until the stream ends, decoding as lossy UTF-8
    pub async fn read_to_string(&mut self) -> String {
        String::from_utf8_lossy(&self.read_to_end().await).into_owned()
    }
}

impl Stream for OutputStream {
    type Item = Vec<u8>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
