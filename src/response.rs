//! Parsed HTTP/1.x response head.

use http::Version;

use crate::headers::Headers;

/// How the response body is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    /// No body (HEAD, 1xx, 204, 304).
    None,
    /// Exactly this many bytes.
    Length(u64),
    /// Chunked transfer coding, possibly followed by trailers.
    Chunked,
    /// Runs until the peer closes the connection.
    UntilClose,
}

/// HTTP response head. The body is read through [`Session::body`](crate::Session::body).
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub reason: String,
    pub version: Version,
    pub headers: Headers,
    framing: BodyFraming,
    content_length: Option<u64>,
    keep_alive: bool,
}

impl Response {
    pub(crate) fn new(
        status: u16,
        reason: String,
        version: Version,
        headers: Headers,
        framing: BodyFraming,
        content_length: Option<u64>,
        keep_alive: bool,
    ) -> Self {
        Self {
            status,
            reason,
            version,
            headers,
            framing,
            content_length,
            keep_alive,
        }
    }

    pub fn framing(&self) -> BodyFraming {
        self.framing
    }

    /// Declared `Content-Length`; `None` when unknown (chunked or close-delimited).
    ///
    /// A HEAD response reports the declared length even though no body follows.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn is_chunked(&self) -> bool {
        self.framing == BodyFraming::Chunked
    }

    /// Whether the connection may carry another exchange after this body.
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.headers.get_all(name)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get("Content-Type")
    }
}
