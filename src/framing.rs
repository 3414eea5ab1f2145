//! Newline framing over a byte stream.
//!
//! A stream socket gives no message boundaries: one read may return part of
//! a line, exactly one line, or a line and the start of the next. The framer
//! buffers until it sees `\n` and keeps whatever follows for the next call.
//! Lines are handed out as raw bytes; no text encoding is assumed.

use crate::error::{ClientError, ProtocolViolation, ViolationKind};
use bytes::{Buf, Bytes, BytesMut};
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Longest line accepted before giving up on the peer.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Bytes reserved ahead of each socket read.
const READ_CHUNK: usize = 4 * 1024;

/// How much of an oversized line to keep for diagnostics.
const SNIPPET_LENGTH: usize = 64;

/// Reads and writes newline-terminated lines on `S`.
#[derive(Debug)]
pub struct LineFramer<S> {
    stream: S,
    buffer: BytesMut,
    /// Prefix of `buffer` already searched for a newline.
    scanned: usize,
    io_timeout: Option<Duration>,
}

impl<S> LineFramer<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap `stream`; every read and write is bounded by `io_timeout` if set.
    pub fn new(stream: S, io_timeout: Option<Duration>) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            scanned: 0,
            io_timeout,
        }
    }

    /// Read the next line, without its terminator.
    ///
    /// A trailing `\r` before the `\n` is dropped as well. If the peer closes
    /// before a newline arrives the result is `EndOfStream`, even when a
    /// partial line was buffered.
    pub async fn read_line(&mut self) -> Result<Bytes, ClientError> {
        loop {
            if let Some(pos) = find_newline(&self.buffer[self.scanned..]) {
                let end = self.scanned + pos;
                let mut line = self.buffer.split_to(end).freeze();
                self.buffer.advance(1);
                self.scanned = 0;
                if line.ends_with(b"\r") {
                    line.truncate(line.len() - 1);
                }
                return Ok(line);
            }
            self.scanned = self.buffer.len();

            if self.buffer.len() >= MAX_LINE_LENGTH {
                let snippet = &self.buffer[..SNIPPET_LENGTH];
                return Err(ProtocolViolation::new(
                    ViolationKind::LineTooLong,
                    String::from_utf8_lossy(snippet),
                )
                .into());
            }

            self.buffer.reserve(READ_CHUNK);
            let n = deadline(self.io_timeout, self.stream.read_buf(&mut self.buffer)).await?;
            if n == 0 {
                trace!(pending = self.buffer.len(), "Stream closed before newline");
                return Err(ClientError::EndOfStream);
            }
        }
    }

    /// Write `line` followed by `\n` and flush it.
    pub async fn write_line(&mut self, line: &[u8]) -> Result<(), ClientError> {
        let mut frame = BytesMut::with_capacity(line.len() + 1);
        frame.extend_from_slice(line);
        frame.extend_from_slice(b"\n");

        let stream = &mut self.stream;
        deadline(self.io_timeout, async move {
            stream.write_all(&frame).await?;
            stream.flush().await
        })
        .await?;
        Ok(())
    }

    /// The deadline applied to each read and write.
    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }
}

/// Run `op`, failing with `TimedOut` if it outlives `limit`.
pub(crate) async fn deadline<T>(
    limit: Option<Duration>,
    op: impl Future<Output = io::Result<T>>,
) -> io::Result<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, op).await.map_err(|_| {
            io::Error::new(io::ErrorKind::TimedOut, "peer did not respond in time")
        })?,
        None => op.await,
    }
}

fn find_newline(buffer: &[u8]) -> Option<usize> {
    buffer.iter().position(|&b| b == b'\n')
}
