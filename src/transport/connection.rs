//! Buffered, timed and interruptible I/O over a [`BoxedTransport`].
//!
//! Reads append to an internal buffer and callers consume only complete
//! units (a head, a line, a frame), so a read that times out can simply be
//! retried without losing bytes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::sync::Interrupt;
use crate::timeouts::{with_timeout, Timeouts};
use crate::transport::connector::BoxedTransport;

/// Minimum free space before each socket read.
const READ_CHUNK: usize = 8192;

/// Result of scanning for a CRLF-terminated line.
#[derive(Debug, PartialEq, Eq)]
pub enum Line {
    /// Line contents without the CRLF.
    Complete(Bytes),
    /// The stream ended before a CRLF.
    Eof,
    /// No CRLF within the allowed length.
    TooLong,
}

/// A live connection: the transport plus its read buffer.
pub struct Connection {
    stream: BoxedTransport,
    buf: BytesMut,
    timeouts: Timeouts,
    interrupt: Arc<Interrupt>,
    eof: bool,
}

impl Connection {
    pub fn new(stream: BoxedTransport, timeouts: Timeouts, interrupt: Arc<Interrupt>) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(READ_CHUNK),
            timeouts,
            interrupt,
            eof: false,
        }
    }

    /// Bytes received but not consumed yet.
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    /// Whether the peer has closed its side.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.timeouts.read = timeout;
    }

    pub fn interrupt_handle(&self) -> Arc<Interrupt> {
        Arc::clone(&self.interrupt)
    }

    /// Drop `n` buffered bytes.
    pub fn consume(&mut self, n: usize) {
        self.buf.advance(n);
    }

    /// Read more bytes from the transport into the buffer. Returns 0 at EOF.
    pub async fn fill(&mut self) -> Result<usize> {
        if self.eof {
            return Ok(0);
        }
        self.interrupt.check()?;
        if self.buf.capacity() - self.buf.len() < READ_CHUNK {
            self.buf.reserve(READ_CHUNK);
        }

        let Self {
            stream,
            buf,
            timeouts,
            interrupt,
            ..
        } = self;
        let n = guarded(timeouts.read, "read", interrupt, async {
            stream.read_buf(buf).await.map_err(Error::from)
        })
        .await?;

        if n == 0 {
            self.eof = true;
        }
        Ok(n)
    }

    /// Read a CRLF-terminated line of at most `max` bytes (excluding CRLF).
    pub async fn read_line(&mut self, max: usize) -> Result<Line> {
        let mut scanned = 0usize;
        loop {
            if let Some(pos) = find_crlf(&self.buf[scanned.saturating_sub(1)..]) {
                let pos = pos + scanned.saturating_sub(1);
                if pos > max {
                    return Ok(Line::TooLong);
                }
                let line = self.buf.split_to(pos).freeze();
                self.buf.advance(2);
                return Ok(Line::Complete(line));
            }
            if self.buf.len() > max + 1 {
                return Ok(Line::TooLong);
            }
            scanned = self.buf.len();
            if self.fill().await? == 0 {
                return Ok(Line::Eof);
            }
        }
    }

    /// Read a message head through the terminating blank line.
    ///
    /// Empty lines before the head are skipped. Returns `None` if the stream
    /// ended cleanly before any byte of a head arrived.
    pub async fn read_head(&mut self, max: usize) -> Result<Option<Bytes>> {
        loop {
            while self.buf.starts_with(b"\r\n") {
                self.buf.advance(2);
            }
            let found = find_header_end(&self.buf);
            if found.map_or(self.buf.len(), |end| end) > max {
                return Err(Error::malformed(format!(
                    "Response headers exceed {} bytes",
                    max
                )));
            }
            if let Some(end) = found {
                return Ok(Some(self.buf.split_to(end).freeze()));
            }
            if self.fill().await? == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(Error::malformed(
                    "Connection closed before response headers complete",
                ));
            }
        }
    }

    /// Copy up to `out.len()` bytes, reading from the transport only if nothing is buffered.
    pub async fn read(&mut self, out: &mut [u8]) -> Result<usize> {
        if self.buf.is_empty() && self.fill().await? == 0 {
            return Ok(0);
        }
        let n = out.len().min(self.buf.len());
        out[..n].copy_from_slice(&self.buf[..n]);
        self.buf.advance(n);
        Ok(n)
    }

    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.interrupt.check()?;
        let Self {
            stream,
            timeouts,
            interrupt,
            ..
        } = self;
        guarded(timeouts.write, "write", interrupt, async {
            stream.write_all(data).await.map_err(Error::from)
        })
        .await
    }

    pub async fn flush(&mut self) -> Result<()> {
        let Self {
            stream,
            timeouts,
            interrupt,
            ..
        } = self;
        guarded(timeouts.write, "flush", interrupt, async {
            stream.flush().await.map_err(Error::from)
        })
        .await
    }

    /// Shut down the write side and drop buffered input.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.buf.clear();
        let Self {
            stream, timeouts, ..
        } = self;
        with_timeout(timeouts.write, "shutdown", async {
            stream.shutdown().await.map_err(Error::from)
        })
        .await
    }

    /// Give up the transport. Fails if unread bytes would be lost.
    pub fn into_transport(self) -> Result<BoxedTransport> {
        if !self.buf.is_empty() {
            return Err(Error::invalid_state(format!(
                "{} unread bytes buffered on connection",
                self.buf.len()
            )));
        }
        Ok(self.stream)
    }
}

/// Run an I/O future under the timeout, aborting early when interrupted.
async fn guarded<T, F>(
    limit: Option<Duration>,
    what: &str,
    interrupt: &Interrupt,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = interrupt.requested() => {
            interrupt.clear();
            Err(Error::Interrupted)
        }
        result = with_timeout(limit, what, fut) => result,
    }
}

/// Find the end of HTTP headers (\r\n\r\n).
pub(crate) fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| i + 4)
}

/// Find the first CRLF in a buffer, returning its position.
pub(crate) fn find_crlf(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\r\n")
}
