//! Timeout configuration for session I/O.
//!
//! # Timeout Types
//!
//! - **connect**: TCP connect (plus secure wrap) deadline
//! - **read**: Maximum time a single read may block (resets on each read)
//! - **write**: Maximum time a single write/flush may block (resets on each write)
//!
//! # Usage
//!
//! ```rust,ignore
//! use tether::{Session, SessionConfig, Timeouts};
//! use std::time::Duration;
//!
//! let config = SessionConfig::default()
//!     .timeouts(Timeouts::defaults().read(Duration::from_secs(5)));
//! let session = Session::with_config(endpoint, config);
//! ```

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

/// Timeout configuration for a session or upgraded connection.
///
/// All timeouts are optional. When `None`, no timeout is applied for that phase.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Timeouts {
    /// Timeout for establishing the connection (DNS + TCP + secure wrap).
    ///
    /// Default: 10s for defaults()
    pub connect: Option<Duration>,

    /// Read timeout: maximum time waiting for the next bytes from the peer.
    ///
    /// **This timeout resets on each successful read.** An idle WebSocket
    /// surfaces it as [`Error::Timeout`] without closing the connection.
    ///
    /// Default: 30s for defaults()
    pub read: Option<Duration>,

    /// Write timeout: maximum time waiting to hand bytes to the transport.
    ///
    /// Default: 30s for defaults()
    pub write: Option<Duration>,
}

impl Timeouts {
    /// Create a new Timeouts with all timeouts set to None.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sensible defaults.
    ///
    /// - connect: 10s
    /// - read: 30s
    /// - write: 30s
    pub fn defaults() -> Self {
        Self {
            connect: Some(Duration::from_secs(10)),
            read: Some(Duration::from_secs(30)),
            write: Some(Duration::from_secs(30)),
        }
    }

    /// Set connect timeout.
    pub fn connect(mut self, timeout: Duration) -> Self {
        self.connect = Some(timeout);
        self
    }

    /// Set read timeout.
    pub fn read(mut self, timeout: Duration) -> Self {
        self.read = Some(timeout);
        self
    }

    /// Set write timeout.
    pub fn write(mut self, timeout: Duration) -> Self {
        self.write = Some(timeout);
        self
    }

    /// Disable connect timeout.
    pub fn no_connect_timeout(mut self) -> Self {
        self.connect = None;
        self
    }

    /// Disable read timeout.
    pub fn no_read_timeout(mut self) -> Self {
        self.read = None;
        self
    }

    /// Disable write timeout.
    pub fn no_write_timeout(mut self) -> Self {
        self.write = None;
        self
    }
}

/// Run `fut` under an optional deadline, mapping expiry to [`Error::Timeout`].
pub(crate) async fn with_timeout<T, F>(limit: Option<Duration>, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(format!("{} after {:?}", what, limit))),
        },
        None => fut.await,
    }
}
