//! Streaming relay of upstream response bodies
//!
//! Bodies are copied to the client one read at a time: the next upstream read
//! only happens once the previous chunk has been written out, so a slow
//! client slows the upstream down instead of growing a buffer.

use anyhow::Result;
use bytes::{Buf, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::proxy::error::UpstreamError;

/// Read size for body relay
const BUFFER_SIZE: usize = 16 * 1024;

/// How the end of an upstream body is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// No body (HEAD, 1xx, 204, 304).
    Empty,
    /// Exactly this many bytes follow the head.
    Length(u64),
    /// `Transfer-Encoding: chunked`, relayed verbatim unless the body is
    /// set to decode.
    Chunked,
    /// Body runs until the upstream closes the connection.
    UntilClose,
}

/// An upstream response body that has not been read yet.
#[derive(Debug)]
pub struct UpstreamBody {
    stream: TcpStream,
    /// Bytes read past the response head.
    buffered: BytesMut,
    framing: Framing,
    idle_timeout: Duration,
    /// Strip chunk framing and write only the payload
    decoding: bool,
}

impl UpstreamBody {
    pub fn new(
        stream: TcpStream,
        buffered: BytesMut,
        framing: Framing,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            stream,
            buffered,
            framing,
            idle_timeout,
            decoding: false,
        }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Relays a chunked body as plain payload bytes. The client then only
    /// learns where the body ends when the connection closes.
    pub fn decode_chunks(&mut self) {
        if self.framing == Framing::Chunked {
            self.decoding = true;
        }
    }

    /// Whether the client can only find the end of this body by the
    /// connection closing.
    pub fn is_close_delimited(&self) -> bool {
        self.framing == Framing::UntilClose || self.decoding
    }

    /// Copies the body to `out`, returning the number of bytes written.
    ///
    /// Consumes the body; the upstream connection is closed when this returns,
    /// whether the relay finished or the client went away.
    pub async fn relay<W>(mut self, out: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let sent = match self.framing {
            Framing::Empty => 0,
            Framing::Length(len) => self.relay_length(out, len).await?,
            Framing::Chunked => self.relay_chunked(out).await?,
            Framing::UntilClose => self.relay_until_close(out).await?,
        };

        out.flush().await?;
        Ok(sent)
    }

    async fn relay_length<W>(&mut self, out: &mut W, len: u64) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut remaining = len;

        loop {
            if !self.buffered.is_empty() {
                let take = remaining.min(self.buffered.len() as u64) as usize;
                let chunk = self.buffered.split_to(take);
                out.write_all(&chunk).await?;
                remaining -= take as u64;
            }

            if remaining == 0 {
                return Ok(len);
            }

            if self.fill().await? == 0 {
                anyhow::bail!("upstream closed with {} body bytes outstanding", remaining);
            }
        }
    }

    async fn relay_chunked<W>(&mut self, out: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut tracker = ChunkedTracker::new();
        let mut payload = Vec::new();
        let mut sent = 0u64;

        loop {
            if !self.buffered.is_empty() && self.decoding {
                payload.clear();
                let consumed =
                    tracker.scan(&self.buffered, |data| payload.extend_from_slice(data))?;
                self.buffered.advance(consumed);
                out.write_all(&payload).await?;
                sent += payload.len() as u64;
            } else if !self.buffered.is_empty() {
                let consumed = tracker.advance(&self.buffered)?;
                let chunk = self.buffered.split_to(consumed);
                out.write_all(&chunk).await?;
                sent += consumed as u64;
            }

            if tracker.is_done() {
                return Ok(sent);
            }

            if self.fill().await? == 0 {
                anyhow::bail!("upstream closed inside a chunked body");
            }
        }
    }

    async fn relay_until_close<W>(&mut self, out: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut sent = 0u64;

        loop {
            if !self.buffered.is_empty() {
                let chunk = self.buffered.split();
                out.write_all(&chunk).await?;
                sent += chunk.len() as u64;
            }

            if self.fill().await? == 0 {
                return Ok(sent);
            }
        }
    }

    /// Reads more upstream bytes into the buffer, bounded by the idle timeout.
    async fn fill(&mut self) -> Result<usize, UpstreamError> {
        self.buffered.reserve(BUFFER_SIZE);

        let n = timeout(self.idle_timeout, self.stream.read_buf(&mut self.buffered))
            .await
            .map_err(|_| UpstreamError::Timeout("body read"))??;

        Ok(n)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    Size,
    SizeLf,
    Data(u64),
    DataCr,
    DataLf,
    TrailerStart,
    TrailerLine,
    TrailerLf { empty: bool },
    Done,
}

/// Follows chunked framing byte by byte to find where the body ends.
///
/// [`ChunkedTracker::advance`] only counts bytes, so the chunked stream can be
/// relayed as-is; [`ChunkedTracker::scan`] also hands out the payload.
#[derive(Debug)]
pub struct ChunkedTracker {
    state: ChunkState,
    size: u64,
    digits: u32,
    in_extension: bool,
}

impl Default for ChunkedTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedTracker {
    pub fn new() -> Self {
        Self {
            state: ChunkState::Size,
            size: 0,
            digits: 0,
            in_extension: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == ChunkState::Done
    }

    /// Scans `buf` and returns how many of its bytes belong to the body.
    ///
    /// This is `buf.len()` unless the terminating chunk and trailers end
    /// inside `buf`.
    pub fn advance(&mut self, buf: &[u8]) -> Result<usize, UpstreamError> {
        self.scan(buf, |_| {})
    }

    /// Same as [`ChunkedTracker::advance`], passing each run of chunk payload
    /// to `on_data` along the way.
    pub fn scan<F>(&mut self, buf: &[u8], mut on_data: F) -> Result<usize, UpstreamError>
    where
        F: FnMut(&[u8]),
    {
        let mut i = 0;

        while i < buf.len() {
            match self.state {
                ChunkState::Done => return Ok(i),

                ChunkState::Data(remaining) => {
                    let take = remaining.min((buf.len() - i) as u64) as usize;
                    on_data(&buf[i..i + take]);
                    i += take;
                    self.state = match remaining - take as u64 {
                        0 => ChunkState::DataCr,
                        left => ChunkState::Data(left),
                    };
                }

                ChunkState::Size => {
                    self.size_byte(buf[i])?;
                    i += 1;
                }

                ChunkState::SizeLf => {
                    expect(buf[i], b'\n')?;
                    i += 1;
                    if self.digits == 0 {
                        return Err(malformed("chunk size line without digits"));
                    }
                    let size = self.size;
                    self.size = 0;
                    self.digits = 0;
                    self.in_extension = false;
                    self.state = if size == 0 {
                        ChunkState::TrailerStart
                    } else {
                        ChunkState::Data(size)
                    };
                }

                ChunkState::DataCr => {
                    expect(buf[i], b'\r')?;
                    i += 1;
                    self.state = ChunkState::DataLf;
                }

                ChunkState::DataLf => {
                    expect(buf[i], b'\n')?;
                    i += 1;
                    self.state = ChunkState::Size;
                }

                ChunkState::TrailerStart | ChunkState::TrailerLine => {
                    let empty = self.state == ChunkState::TrailerStart;
                    self.state = if buf[i] == b'\r' {
                        ChunkState::TrailerLf { empty }
                    } else {
                        ChunkState::TrailerLine
                    };
                    i += 1;
                }

                ChunkState::TrailerLf { empty } => {
                    expect(buf[i], b'\n')?;
                    i += 1;
                    self.state = if empty {
                        ChunkState::Done
                    } else {
                        ChunkState::TrailerStart
                    };
                }
            }
        }

        Ok(i)
    }

    fn size_byte(&mut self, b: u8) -> Result<(), UpstreamError> {
        if b == b'\r' {
            self.state = ChunkState::SizeLf;
            return Ok(());
        }
        if self.in_extension {
            return Ok(());
        }

        match b {
            b';' => self.in_extension = true,
            b' ' | b'\t' => {}
            _ => {
                let digit = (b as char)
                    .to_digit(16)
                    .ok_or_else(|| malformed("invalid chunk size"))?;
                self.size = self
                    .size
                    .checked_mul(16)
                    .and_then(|s| s.checked_add(digit as u64))
                    .ok_or_else(|| malformed("chunk size overflow"))?;
                self.digits += 1;
            }
        }

        Ok(())
    }
}

fn expect(got: u8, want: u8) -> Result<(), UpstreamError> {
    if got == want {
        Ok(())
    } else {
        Err(malformed("broken chunk delimiter"))
    }
}

fn malformed(reason: &str) -> UpstreamError {
    UpstreamError::MalformedResponse(reason.to_string())
}
