//! Outgoing HTTP/1.x request description.

use http::{Method, Version};

use crate::headers::Headers;

/// How the request body is framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// `Content-Length` framed body of exactly this many bytes.
    Identity(u64),
    /// `Transfer-Encoding: chunked`; every body write becomes one chunk.
    Chunked,
}

impl Default for TransferMode {
    fn default() -> Self {
        TransferMode::Identity(0)
    }
}

/// An HTTP request head plus framing options.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Request target, sent as-is (origin-form, absolute-form, `*` or authority-form).
    pub target: String,
    pub version: Version,
    pub headers: Headers,
    pub transfer_mode: TransferMode,
    /// Send `Expect: 100-continue` and hold the body until the server answers.
    pub expect_continue: bool,
    /// Explicit keep-alive choice; `None` defers to the session setting.
    pub keep_alive: Option<bool>,
    /// Trailer fields written after the last chunk (chunked mode only).
    pub trailers: Headers,
}

impl Request {
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            version: Version::HTTP_11,
            headers: Headers::new(),
            transfer_mode: TransferMode::default(),
            expect_continue: false,
            keep_alive: None,
            trailers: Headers::new(),
        }
    }

    pub fn get(target: impl Into<String>) -> Self {
        Self::new(Method::GET, target)
    }

    pub fn head(target: impl Into<String>) -> Self {
        Self::new(Method::HEAD, target)
    }

    pub fn post(target: impl Into<String>) -> Self {
        Self::new(Method::POST, target)
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Identity body of `length` bytes.
    pub fn content_length(mut self, length: u64) -> Self {
        self.transfer_mode = TransferMode::Identity(length);
        self
    }

    pub fn chunked(mut self) -> Self {
        self.transfer_mode = TransferMode::Chunked;
        self
    }

    pub fn expect_continue(mut self, expect: bool) -> Self {
        self.expect_continue = expect;
        self
    }

    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = Some(keep_alive);
        self
    }

    pub fn trailer(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.trailers.append(name, value);
        self
    }

    /// Whether the request carries body bytes at all.
    pub fn has_body(&self) -> bool {
        !matches!(self.transfer_mode, TransferMode::Identity(0))
    }
}
