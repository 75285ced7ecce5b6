//! Message framing for the worker's stdout stream.
//!
//! The worker writes one JSON object per logical message. Most workers end
//! each object with a newline, but nothing guarantees that a read returns a
//! whole line, and some writers simply concatenate objects. The framer
//! therefore decodes JSON values as a stream over an accumulation buffer:
//!
//! ```text
//! {"id":1,"result":{...}}\n{"id":2,"res      <- chunk 1: one message + a partial one
//! ult":{...}}{"id":3,"error":{...}}          <- chunk 2: completes #2, carries #3
//! ```
//!
//! Incomplete input is never an error; it stays buffered until more bytes
//! arrive. Input that can never parse is skipped up to the next newline.

use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::ipc::protocol::RpcRequest;

/// Maximum bytes held while waiting for a message to complete (100MB).
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Size of each read from the worker's stdout.
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Framing failures. Only raised when the buffer would exceed
/// [`MAX_MESSAGE_SIZE`]; the buffer is cleared when that happens.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    #[error("Buffered message size {size} exceeds maximum {max} bytes")]
    Oversized { size: usize, max: usize },
}

/// Incremental JSON message decoder.
#[derive(Debug, Default)]
pub struct MessageFramer {
    buffer: Vec<u8>,
}

impl MessageFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes waiting for more input.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Feed a chunk and return every message it completes, in order.
    ///
    /// When nothing is buffered the chunk is decoded in place and only its
    /// unconsumed tail is copied.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Value>, FramingError> {
        let size = self.buffer.len() + chunk.len();
        if size > MAX_MESSAGE_SIZE {
            self.buffer.clear();
            return Err(FramingError::Oversized {
                size,
                max: MAX_MESSAGE_SIZE,
            });
        }

        let mut messages = Vec::new();
        if self.buffer.is_empty() {
            let consumed = drain_messages(chunk, &mut messages);
            self.buffer.extend_from_slice(&chunk[consumed..]);
        } else {
            self.buffer.extend_from_slice(chunk);
            let consumed = drain_messages(&self.buffer, &mut messages);
            self.buffer.drain(..consumed);
        }

        Ok(messages)
    }
}

/// Decode as many complete values from `bytes` as possible.
///
/// Returns the number of bytes consumed; everything after that offset is
/// the start of an incomplete value.
fn drain_messages(bytes: &[u8], out: &mut Vec<Value>) -> usize {
    let mut offset = 0;

    'resync: loop {
        let mut stream = serde_json::Deserializer::from_slice(&bytes[offset..]).into_iter::<Value>();

        loop {
            match stream.next() {
                Some(Ok(value)) => out.push(value),
                Some(Err(e)) if e.is_eof() => return offset + stream.byte_offset(),
                Some(Err(e)) => {
                    let start = offset + stream.byte_offset();
                    match bytes[start..].iter().position(|&b| b == b'\n') {
                        Some(newline) => {
                            warn!(
                                "Skipping {} malformed bytes from worker: {}",
                                newline + 1,
                                e
                            );
                            offset = start + newline + 1;
                            continue 'resync;
                        }
                        None => {
                            warn!(
                                "Discarding {} malformed bytes from worker: {}",
                                bytes.len() - start,
                                e
                            );
                            return bytes.len();
                        }
                    }
                }
                None => return bytes.len(),
            }
        }
    }
}

/// Read the worker's output until EOF, handing each message to `on_message`.
///
/// The stream is not restartable: once the worker closes stdout the pump
/// returns and any partial trailing message is dropped.
pub async fn read_messages<R, F>(mut reader: R, mut on_message: F) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    F: FnMut(Value),
{
    let mut framer = MessageFramer::new();
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            if framer.pending_len() > 0 {
                debug!(
                    "Worker output closed with {} unframed bytes",
                    framer.pending_len()
                );
            }
            return Ok(());
        }

        match framer.push(&chunk[..n]) {
            Ok(messages) => messages.into_iter().for_each(&mut on_message),
            Err(e) => warn!("Worker output framing error: {}", e),
        }
    }
}

/// Write one request line and flush it.
pub async fn write_message<W>(writer: &mut W, request: &RpcRequest) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let line = request.to_line()?;
    writer.write_all(&line).await?;
    writer.flush().await
}
