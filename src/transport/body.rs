//! Transfer-mode body coding.
//!
//! [`BodyDecoder`] turns the connection's byte stream into one message body
//! and knows where that body ends. [`BodyEncoder`] frames the request body.

use crate::error::{Error, Result};
use crate::headers::Headers;
use crate::request::TransferMode;
use crate::response::BodyFraming;
use crate::transport::connection::{Connection, Line};
use crate::transport::h1::{encode_chunk, encode_last_chunk, parse_chunk_size, parse_field_line};

/// Maximum length of a chunk-size line or a trailer field line.
const MAX_LINE_LEN: usize = 8 * 1024;

/// Maximum number of trailer fields.
const MAX_TRAILERS: usize = 100;

/// Position inside a chunked body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    Size,
    Data { remaining: u64 },
    DataEnd,
    Trailers,
}

/// Single-pass body decoder. Once done, every read returns 0.
#[derive(Debug)]
pub enum BodyDecoder {
    Fixed { expected: u64, received: u64 },
    Chunked { state: ChunkState, received: u64, trailers: Headers },
    UntilClose,
    Done { trailers: Headers },
}

impl BodyDecoder {
    pub fn new(framing: BodyFraming) -> Self {
        match framing {
            BodyFraming::None | BodyFraming::Length(0) => Self::done(),
            BodyFraming::Length(expected) => Self::Fixed {
                expected,
                received: 0,
            },
            BodyFraming::Chunked => Self::Chunked {
                state: ChunkState::Size,
                received: 0,
                trailers: Headers::new(),
            },
            BodyFraming::UntilClose => Self::UntilClose,
        }
    }

    /// A decoder with nothing to read.
    pub fn done() -> Self {
        Self::Done {
            trailers: Headers::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }

    /// Bytes still owed by a fixed-length body.
    pub fn remaining(&self) -> Option<u64> {
        match self {
            Self::Fixed { expected, received } => Some(expected - received),
            Self::Done { .. } => Some(0),
            _ => None,
        }
    }

    /// Trailer fields collected after the last chunk.
    pub fn trailers(&self) -> Option<&Headers> {
        match self {
            Self::Done { trailers } => Some(trailers),
            _ => None,
        }
    }

    /// Read body bytes into `out`. Returns 0 once the body is complete.
    pub async fn read(&mut self, conn: &mut Connection, out: &mut [u8]) -> Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        loop {
            match self {
                Self::Done { .. } => return Ok(0),
                Self::Fixed { expected, received } => {
                    let want = (*expected - *received).min(out.len() as u64) as usize;
                    let n = conn.read(&mut out[..want]).await?;
                    if n == 0 {
                        return Err(Error::TruncatedBody {
                            expected: *expected,
                            received: *received,
                        });
                    }
                    *received += n as u64;
                    if *received == *expected {
                        *self = Self::done();
                    }
                    return Ok(n);
                }
                Self::UntilClose => {
                    let n = conn.read(out).await?;
                    if n == 0 {
                        *self = Self::done();
                    }
                    return Ok(n);
                }
                Self::Chunked {
                    state,
                    received,
                    trailers,
                } => match *state {
                    ChunkState::Size => {
                        let line =
                            expect_line(conn, *received, 0, "Chunk size line too long").await?;
                        let size = parse_chunk_size(&line)?;
                        *state = if size == 0 {
                            ChunkState::Trailers
                        } else {
                            ChunkState::Data { remaining: size }
                        };
                    }
                    ChunkState::Data { remaining } => {
                        let want = remaining.min(out.len() as u64) as usize;
                        let n = conn.read(&mut out[..want]).await?;
                        if n == 0 {
                            return Err(Error::TruncatedBody {
                                expected: *received + remaining,
                                received: *received,
                            });
                        }
                        *received += n as u64;
                        let left = remaining - n as u64;
                        *state = if left == 0 {
                            ChunkState::DataEnd
                        } else {
                            ChunkState::Data { remaining: left }
                        };
                        return Ok(n);
                    }
                    ChunkState::DataEnd => {
                        let line =
                            expect_line(conn, *received, 2, "Missing CRLF after chunk data")
                                .await?;
                        if !line.is_empty() {
                            return Err(Error::chunk_framing("Missing CRLF after chunk data"));
                        }
                        *state = ChunkState::Size;
                    }
                    ChunkState::Trailers => match conn.read_line(MAX_LINE_LEN).await? {
                        Line::Complete(line) if line.is_empty() => {
                            let trailers = std::mem::take(trailers);
                            *self = Self::Done { trailers };
                        }
                        Line::Complete(line) => {
                            if trailers.len() >= MAX_TRAILERS {
                                return Err(Error::malformed("Too many trailer fields"));
                            }
                            let (name, value) = parse_field_line(&line)?;
                            trailers.add_received(&name, &value);
                        }
                        // The peer closed right after the last chunk: trailers absent.
                        Line::Eof => {
                            let trailers = std::mem::take(trailers);
                            *self = Self::Done { trailers };
                        }
                        Line::TooLong => {
                            return Err(Error::malformed("Trailer field too long"));
                        }
                    },
                },
            }
        }
    }
}

/// Read a chunk framing line, mapping EOF and overlong lines to body errors.
async fn expect_line(
    conn: &mut Connection,
    received: u64,
    owed: u64,
    too_long: &'static str,
) -> Result<bytes::Bytes> {
    match conn.read_line(MAX_LINE_LEN).await? {
        Line::Complete(line) => Ok(line),
        Line::Eof => Err(Error::TruncatedBody {
            expected: received + owed,
            received,
        }),
        Line::TooLong => Err(Error::chunk_framing(too_long)),
    }
}

/// Request body framing on the write side.
#[derive(Debug)]
pub enum BodyEncoder {
    Identity { declared: u64, written: u64 },
    Chunked { finished: bool },
}

impl BodyEncoder {
    pub fn new(mode: TransferMode) -> Self {
        match mode {
            TransferMode::Identity(declared) => Self::Identity {
                declared,
                written: 0,
            },
            TransferMode::Chunked => Self::Chunked { finished: false },
        }
    }

    /// Whether the body has been completely written.
    pub fn is_finished(&self) -> bool {
        match self {
            Self::Identity { declared, written } => declared == written,
            Self::Chunked { finished } => *finished,
        }
    }

    /// Write one piece of body. In chunked mode every non-empty call is one chunk.
    pub async fn write(&mut self, conn: &mut Connection, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        match self {
            Self::Identity { declared, written } => {
                let total = *written + data.len() as u64;
                if total > *declared {
                    return Err(Error::invalid_state(format!(
                        "Body exceeds declared Content-Length ({} > {})",
                        total, declared
                    )));
                }
                conn.write_all(data).await?;
                *written = total;
            }
            Self::Chunked { finished: true } => {
                return Err(Error::invalid_state("Chunked body already finished"));
            }
            Self::Chunked { finished: false } => {
                conn.write_all(&encode_chunk(data)).await?;
            }
        }
        Ok(())
    }

    /// Complete the body: checks the identity length, or writes the last chunk and trailers.
    pub async fn finish(&mut self, conn: &mut Connection, trailers: &Headers) -> Result<()> {
        match self {
            Self::Identity { declared, written } => {
                if written != declared {
                    return Err(Error::invalid_state(format!(
                        "Body shorter than declared Content-Length ({} < {})",
                        written, declared
                    )));
                }
            }
            Self::Chunked { finished: true } => {}
            Self::Chunked { finished } => {
                conn.write_all(&encode_last_chunk(trailers)?).await?;
                *finished = true;
            }
        }
        conn.flush().await
    }
}
