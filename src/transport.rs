//! Transport adapter: a reader/writer pair carrying framed JSON-RPC messages.
//!
//! Over stdio the whole process serves one client: requests arrive on stdin,
//! responses leave on stdout, and nothing else may touch stdout. The same
//! type runs over any async stream pair, which is how the tests drive it.

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::FuturesUnordered;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::codec::{FrameCodec, Framing};
use crate::server::Server;
use crate::types::{McpError, McpResponse};

/// Order in which responses are written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ResponseOrder {
    /// As soon as each request finishes.
    #[default]
    Completion,
    /// In the order the requests arrived; early finishers are held back.
    Arrival,
}

#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub order: ResponseOrder,
    /// How long in-flight requests may still finish once input has ended.
    pub shutdown_grace: Duration,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            order: ResponseOrder::default(),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Why a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    InputClosed,
    Cancelled,
}

pub struct StreamTransport<R, W> {
    reader: FramedRead<R, FrameCodec>,
    writer: FramedWrite<W, FrameCodec>,
}

pub type StdioTransport = StreamTransport<tokio::io::Stdin, tokio::io::Stdout>;

/// Transport over this process's stdin/stdout.
pub fn stdio(framing: Framing) -> StdioTransport {
    StreamTransport::new(tokio::io::stdin(), tokio::io::stdout(), framing)
}

impl<R, W> StreamTransport<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, framing: Framing) -> Self {
        Self {
            reader: FramedRead::new(reader, FrameCodec::new(framing)),
            writer: FramedWrite::new(writer, FrameCodec::new(framing)),
        }
    }

    /// Next raw message payload, or `None` once the input stream has closed.
    pub async fn next_message(&mut self) -> Option<Result<Bytes, McpError>> {
        self.reader.next().await
    }

    /// Write one frame and flush it. Frames are never interleaved because the
    /// writer is only reachable through `&mut self`.
    pub async fn send_message(&mut self, payload: String) -> Result<(), McpError> {
        self.writer.send(payload).await.map_err(|e| match e {
            McpError::Io(io) => McpError::TransportWrite(io),
            other => other,
        })
    }

    /// Serve `server` until the input ends, `cancel` fires, or the transport
    /// breaks.
    ///
    /// Requests are dispatched in arrival order. Handlers that suspend run
    /// concurrently on this one task, so a slow request never holds up the
    /// ones behind it.
    pub async fn serve(
        &mut self,
        server: &Server,
        options: &ServeOptions,
        cancel: CancellationToken,
    ) -> Result<SessionEnd, McpError> {
        let mut pending = FuturesUnordered::new();
        let mut emitter = Emitter::new(options.order);
        let mut seq: u64 = 0;

        let end = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("cancellation requested; stopping session");
                    break SessionEnd::Cancelled;
                }
                frame = self.reader.next() => match frame {
                    Some(Ok(raw)) => {
                        tracing::debug!(frame = ?raw, "recv");
                        let n = seq;
                        seq += 1;
                        pending.push(async move { (n, server.handle_message(&raw).await) });
                    }
                    Some(Err(e)) => return Err(e),
                    None => {
                        tracing::debug!("EOF on reader; stopping session");
                        break SessionEnd::InputClosed;
                    }
                },
                Some((n, resp)) = pending.next(), if !pending.is_empty() => {
                    for payload in emitter.accept(n, encode(resp)) {
                        self.send_message(payload).await?;
                    }
                }
            }
        };

        let deadline = tokio::time::Instant::now() + options.shutdown_grace;
        while !pending.is_empty() {
            match tokio::time::timeout_at(deadline, pending.next()).await {
                Ok(Some((n, resp))) => {
                    for payload in emitter.accept(n, encode(resp)) {
                        self.send_message(payload).await?;
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(abandoned = pending.len(), "in-flight requests abandoned at shutdown");
                    break;
                }
            }
        }
        for payload in emitter.flush() {
            self.send_message(payload).await?;
        }

        Ok(end)
    }
}

fn encode(resp: Option<McpResponse>) -> Option<String> {
    let resp = resp?;
    match serde_json::to_string(&resp) {
        Ok(payload) => {
            tracing::debug!(frame = %payload, "send");
            Some(payload)
        }
        Err(e) => {
            tracing::error!(error = %e, id = ?resp.id(), "failed to serialize response");
            None
        }
    }
}

/// Decides when finished responses may be written.
///
/// Each request gets a sequence number on arrival. Notifications finish
/// with `None`, which still advances the arrival cursor.
struct Emitter {
    order: ResponseOrder,
    next: u64,
    held: BTreeMap<u64, Option<String>>,
}

impl Emitter {
    fn new(order: ResponseOrder) -> Self {
        Self {
            order,
            next: 0,
            held: BTreeMap::new(),
        }
    }

    fn accept(&mut self, seq: u64, payload: Option<String>) -> Vec<String> {
        match self.order {
            ResponseOrder::Completion => payload.into_iter().collect(),
            ResponseOrder::Arrival => {
                self.held.insert(seq, payload);
                let mut ready = Vec::new();
                while let Some(entry) = self.held.remove(&self.next) {
                    self.next += 1;
                    ready.extend(entry);
                }
                ready
            }
        }
    }

    /// Release whatever is still held, skipping requests that never finished.
    fn flush(&mut self) -> Vec<String> {
        std::mem::take(&mut self.held)
            .into_values()
            .flatten()
            .collect()
    }
}
