//! Error types for tether crate.

use std::io;
use std::time::Duration;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during a session exchange or on an upgraded connection.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Connect, DNS or refusal failure. The session must reconnect.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Connect timeout (TCP handshake plus optional secure wrap).
    #[error("Connect timeout after {0:?}")]
    ConnectTimeout(Duration),

    /// Read or write did not complete within the configured timeout.
    ///
    /// Recoverable: the caller may retry the same call.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// A blocked operation was interrupted through an [`Interrupt`](crate::sync::Interrupt) handle.
    #[error("Operation interrupted")]
    Interrupted,

    /// Malformed status line or header block.
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    /// Invalid chunked transfer framing.
    #[error("Chunk framing error: {0}")]
    ChunkFraming(String),

    /// The stream ended before the declared body was received.
    #[error("Truncated body: got {received} of {expected} bytes")]
    TruncatedBody { expected: u64, received: u64 },

    /// WebSocket upgrade was not accepted.
    #[error("WebSocket handshake failed: {0}")]
    Handshake(String),

    /// WebSocket framing violation.
    #[error("WebSocket frame error: {0}")]
    Frame(String),

    /// A WebSocket frame or reassembled message exceeded the configured limit.
    #[error("WebSocket message too large: {size} bytes (limit {limit})")]
    MessageTooLarge { size: u64, limit: u64 },

    /// The WebSocket connection is closed.
    #[error("WebSocket connection closed")]
    ConnectionClosed,

    /// The proxy refused to open a CONNECT tunnel.
    #[error("Proxy tunnel refused: HTTP {status} {reason}")]
    ProxyTunnel { status: u16, reason: String },

    /// Invalid non-proxy host pattern.
    #[error("Invalid non-proxy host pattern {pattern:?}: {message}")]
    InvalidProxyPattern { pattern: String, message: String },

    /// Operation called in a state that does not permit it.
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// URL parsing error.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    /// Create a malformed header error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedHeader(message.into())
    }

    /// Create a chunk framing error.
    pub fn chunk_framing(message: impl Into<String>) -> Self {
        Self::ChunkFraming(message.into())
    }

    /// Create a WebSocket handshake error.
    pub fn handshake(message: impl Into<String>) -> Self {
        Self::Handshake(message.into())
    }

    /// Create a WebSocket frame error.
    pub fn frame(message: impl Into<String>) -> Self {
        Self::Frame(message.into())
    }

    /// Create an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// Create an IO error with custom message.
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(io::Error::other(message.into()))
    }

    /// Whether the same call may be retried on the same session.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Interrupted)
    }
}
