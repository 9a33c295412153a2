//! Chunk reading and incremental UTF-8 decoding.
//!
//! The match service streams its answer over a plain HTTP body. Network chunk
//! boundaries fall wherever they fall, including inside a multi-byte character
//! (most of the answer is Chinese text, three bytes per character), so bytes
//! are decoded with a stateful [`Utf8Decoder`] that carries an incomplete
//! trailing sequence over to the next chunk.
//!
//! [`StreamReader`] owns the byte stream for the duration of one consumption.
//! Nothing else can poll the stream while the reader holds it, and dropping
//! the reader releases it on every exit path.
//!
//! ```text
//! chunk 1: [e7 89 9b e6]   -> "牛"   (e6 kept pending)
//! chunk 2: [b4 a5 0a]      -> "津\n"
//! ```

use crate::{Error, Result};
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use std::fmt::Display;
use std::time::Duration;

/// Stateful UTF-8 decoder that tolerates sequences split across chunks.
///
/// Invalid bytes are replaced with U+FFFD rather than failing the read.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes as much of `pending + bytes` as forms complete characters.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::with_capacity(self.pending.len());

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        // A genuinely invalid sequence: replace it and keep going.
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                        // Incomplete sequence at the end: wait for more bytes.
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Flushes whatever is still pending as best-effort text.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(tail)
    }

    /// Number of bytes held back waiting for the rest of a character
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Outcome of one [`StreamReader::read`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Freshly decoded text; never empty
    Chunk(String),
    /// The stream completed and everything has been handed out
    Done,
}

/// Exclusive, one-read-at-a-time reader over a byte stream.
///
/// # Errors from `read`
///
/// - [`Error::StreamUnavailable`]: the stream failed before yielding a single byte.
/// - [`Error::Transport`]: the stream failed after data was received.
/// - [`Error::Timeout`]: no chunk arrived within the inactivity window.
///
/// After any error the reader is finished; call [`StreamReader::finish`] to
/// collect decoder leftovers.
pub struct StreamReader<S> {
    stream: S,
    decoder: Utf8Decoder,
    inactivity: Duration,
    bytes_read: u64,
    finished: bool,
}

impl<S, E> StreamReader<S>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: Display,
{
    pub fn new(stream: S, inactivity: Duration) -> Self {
        Self {
            stream,
            decoder: Utf8Decoder::new(),
            inactivity,
            bytes_read: 0,
            finished: false,
        }
    }

    /// Reads the next decoded chunk.
    ///
    /// This is the only suspension point of a stream consumption. Chunks that
    /// decode to nothing (half a character) are absorbed and reading continues.
    pub async fn read(&mut self) -> Result<ReadOutcome> {
        while !self.finished {
            let next = match tokio::time::timeout(self.inactivity, self.stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    self.finished = true;
                    return Err(Error::timeout());
                }
            };

            match next {
                Some(Ok(bytes)) => {
                    self.bytes_read += bytes.len() as u64;
                    let text = self.decoder.decode(&bytes);
                    if !text.is_empty() {
                        return Ok(ReadOutcome::Chunk(text));
                    }
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Err(if self.bytes_read == 0 {
                        Error::stream_unavailable(e.to_string())
                    } else {
                        Error::transport(format!("after {} bytes: {}", self.bytes_read, e))
                    });
                }
                None => {
                    self.finished = true;
                    if let Some(tail) = self.decoder.finish() {
                        return Ok(ReadOutcome::Chunk(tail));
                    }
                }
            }
        }

        Ok(ReadOutcome::Done)
    }

    /// Flushes decoder leftovers after an early stop.
    pub fn finish(&mut self) -> Option<String> {
        self.finished = true;
        self.decoder.finish()
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}
