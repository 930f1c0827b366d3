//! Streaming relay: provider chunks in, `data: ...\n\n` frames out
//!
//! The relay runs as its own task. It pulls one chunk at a time from the
//! provider and pushes the encoded frame into a bounded channel whose
//! receiving end is the HTTP response body. A chunk is only pulled after the
//! previous frame has been accepted by the channel, so at most `capacity`
//! frames are ever buffered and ordering is preserved.
//!
//! Every run ends with exactly one terminal frame (`[DONE]` on success,
//! `{"error": ...}` on provider failure) unless the client is gone, and the
//! outbound stream is closed exactly once when the writer is dropped.

use axum::body::Body;
use bytes::Bytes;
use futures::StreamExt;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::Instrument;

use crate::api::ChatChunk;
use crate::upstream::ChunkStream;

/// Frames buffered between the relay task and the response body
pub const DEFAULT_RELAY_CAPACITY: usize = 1;

const FRAME_PREFIX: &str = "data: ";
const FRAME_DELIMITER: &str = "\n\n";
const DONE_PAYLOAD: &str = "[DONE]";

/// One unit of the outbound event stream
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Chunk(ChatChunk),
    Done,
    Error(String),
}

impl Frame {
    fn payload(&self) -> String {
        match self {
            Frame::Chunk(chunk) => chunk.to_json(),
            Frame::Done => DONE_PAYLOAD.to_string(),
            Frame::Error(message) => serde_json::json!({ "error": message }).to_string(),
        }
    }

    /// Wire form: `data: <payload>\n\n`
    pub fn encode(&self) -> Bytes {
        Bytes::from(format!("{}{}{}", FRAME_PREFIX, self.payload(), FRAME_DELIMITER))
    }
}

/// Relay lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RelayState {
    Open,
    Relaying,
    DrainingSuccess,
    DrainingError,
    Closed,
}

/// How a relay run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Provider finished; all chunks and `[DONE]` were written
    Completed { chunks: usize },
    /// Provider failed after `chunks` frames; an error frame was written
    UpstreamFailed { chunks: usize, message: String },
    /// The response body was dropped; the provider stream was abandoned
    ClientDisconnected { chunks: usize },
}

impl RelayOutcome {
    pub fn chunks(&self) -> usize {
        match self {
            RelayOutcome::Completed { chunks }
            | RelayOutcome::UpstreamFailed { chunks, .. }
            | RelayOutcome::ClientDisconnected { chunks } => *chunks,
        }
    }
}

/// The outbound stream's reader went away
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("outbound stream closed by client")]
pub struct RelayWriteError;

/// Write half of the outbound stream
///
/// `close` consumes the writer, so the stream can only be closed once.
#[derive(Debug)]
pub struct FrameWriter {
    tx: mpsc::Sender<Bytes>,
}

impl FrameWriter {
    /// Waits for channel capacity, giving backpressure from the client
    pub async fn write(&mut self, frame: &Frame) -> Result<(), RelayWriteError> {
        self.tx.send(frame.encode()).await.map_err(|_| RelayWriteError)
    }

    /// Resolves once the reading side has been dropped
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    pub fn close(self) {
        drop(self.tx);
    }
}

/// Read half of the outbound stream, usable as a response body
pub struct RelayBody {
    rx: mpsc::Receiver<Bytes>,
}

impl RelayBody {
    pub fn into_body(self) -> Body {
        Body::from_stream(ReceiverStream::new(self.rx).map(Ok::<_, Infallible>))
    }

    /// Next encoded frame, `None` once the relay has closed the stream
    pub async fn next_frame(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

/// Connected writer/body pair
pub fn outbound_channel(capacity: usize) -> (FrameWriter, RelayBody) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (FrameWriter { tx }, RelayBody { rx })
}

/// Bridges one provider chunk stream into one outbound stream
pub struct StreamingRelay {
    upstream: ChunkStream,
    writer: FrameWriter,
    state: RelayState,
    chunks: usize,
}

impl StreamingRelay {
    pub fn new(upstream: ChunkStream, writer: FrameWriter) -> Self {
        Self {
            upstream,
            writer,
            state: RelayState::Open,
            chunks: 0,
        }
    }

    /// Spawn the relay and hand back the body immediately
    ///
    /// The caller can return the response right away; the task fills the
    /// body over time. The connection stays open until the task closes the
    /// stream, so the server's request lifetime covers the whole relay.
    pub fn spawn(upstream: ChunkStream, capacity: usize) -> (RelayBody, JoinHandle<RelayOutcome>) {
        let (writer, body) = outbound_channel(capacity);
        let handle = tokio::spawn(Self::new(upstream, writer).run().in_current_span());
        (body, handle)
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    fn transition(&mut self, next: RelayState) {
        debug_assert!(next > self.state, "relay state must move forward: {:?} -> {:?}", self.state, next);
        tracing::trace!(from = ?self.state, to = ?next, chunks = self.chunks, "Relay state transition");
        self.state = next;
    }

    /// Drive the relay to completion
    pub async fn run(mut self) -> RelayOutcome {
        self.transition(RelayState::Relaying);

        let outcome = loop {
            let pulled = tokio::select! {
                biased;
                _ = self.writer.closed() => None,
                item = self.upstream.next() => Some(item),
            };

            let item = match pulled {
                Some(item) => item,
                None => {
                    tracing::debug!(chunks = self.chunks, "Client disconnected while waiting on provider");
                    self.transition(RelayState::DrainingError);
                    break RelayOutcome::ClientDisconnected { chunks: self.chunks };
                }
            };

            match item {
                Some(Ok(chunk)) => {
                    if self.writer.write(&Frame::Chunk(chunk)).await.is_err() {
                        tracing::debug!(chunks = self.chunks, "Client disconnected mid-stream");
                        self.transition(RelayState::DrainingError);
                        break RelayOutcome::ClientDisconnected { chunks: self.chunks };
                    }
                    self.chunks += 1;
                }
                Some(Err(err)) => {
                    let message = err.to_string();
                    tracing::error!(error = %message, chunks = self.chunks, "Stream error from provider");
                    self.transition(RelayState::DrainingError);
                    if self.writer.write(&Frame::Error(message.clone())).await.is_err() {
                        break RelayOutcome::ClientDisconnected { chunks: self.chunks };
                    }
                    break RelayOutcome::UpstreamFailed {
                        chunks: self.chunks,
                        message,
                    };
                }
                None => {
                    self.transition(RelayState::DrainingSuccess);
                    if self.writer.write(&Frame::Done).await.is_err() {
                        break RelayOutcome::ClientDisconnected { chunks: self.chunks };
                    }
                    break RelayOutcome::Completed { chunks: self.chunks };
                }
            }
        };

        self.transition(RelayState::Closed);
        let StreamingRelay { upstream, writer, .. } = self;
        // Stop consuming the provider before the client sees end-of-stream
        drop(upstream);
        writer.close();

        match &outcome {
            RelayOutcome::Completed { chunks } => {
                tracing::debug!(chunks = *chunks, "Stream relayed to completion")
            }
            RelayOutcome::UpstreamFailed { chunks, message } => {
                tracing::warn!(chunks = *chunks, error = %message, "Stream ended with provider error")
            }
            RelayOutcome::ClientDisconnected { chunks } => {
                tracing::warn!(chunks = *chunks, "Stream abandoned by client")
            }
        }

        outcome
    }
}
