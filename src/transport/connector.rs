//! Byte stream transport and the connector that produces it.
//!
//! The engine only needs an ordered byte stream. Plain TCP and (on Unix)
//! local domain sockets are provided here; TLS lives behind
//! [`Connector::secure`] in whatever connector the caller plugs in.

use std::future::Future;
#[cfg(unix)]
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::{Error, Result};
use crate::transport::tcp::{configure_tcp_socket, TcpOptions};

/// A bidirectional byte stream (plaintext or encrypted).
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// Owned, type-erased transport.
pub type BoxedTransport = Box<dyn Transport>;

/// Boxed future returned by [`Connector`] methods.
pub type ConnectFuture<'a> = Pin<Box<dyn Future<Output = Result<BoxedTransport>> + Send + 'a>>;

/// Opens transports for a session.
pub trait Connector: Send + Sync {
    /// Open a stream to `host:port` (origin or proxy).
    fn connect<'a>(&'a self, host: &'a str, port: u16) -> ConnectFuture<'a>;

    /// Wrap an established stream for a tunnel endpoint (e.g. a TLS handshake).
    ///
    /// Called after a direct connect or a successful proxy `CONNECT` when the
    /// endpoint asks for a tunnel. The default passes the stream through.
    fn secure<'a>(&'a self, stream: BoxedTransport, _host: &'a str) -> ConnectFuture<'a> {
        Box::pin(async move { Ok(stream) })
    }
}

/// Plain TCP connector.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    options: TcpOptions,
}

impl TcpConnector {
    /// Create a connector with default socket options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a connector applying `options` to every socket.
    pub fn with_options(options: TcpOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TcpOptions {
        &self.options
    }
}

impl Connector for TcpConnector {
    fn connect<'a>(&'a self, host: &'a str, port: u16) -> ConnectFuture<'a> {
        Box::pin(async move {
            let addr = if host.contains(':') {
                format!("[{}]:{}", host, port)
            } else {
                format!("{}:{}", host, port)
            };
            let stream = TcpStream::connect(&addr)
                .await
                .map_err(|e| Error::Connection(format!("Failed to connect to {}: {}", addr, e)))?;

            configure_tcp_socket(&stream, &self.options).map_err(|e| {
                Error::Connection(format!("Failed to configure TCP socket: {}", e))
            })?;

            tracing::debug!("Connected to {}", addr);
            Ok(Box::new(stream) as BoxedTransport)
        })
    }
}

/// Connector for a Unix domain socket.
///
/// Every connection goes to the socket path; the endpoint host and port only
/// feed the `Host` header.
#[cfg(unix)]
#[derive(Debug, Clone)]
pub struct UnixConnector {
    path: PathBuf,
}

#[cfg(unix)]
impl UnixConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
impl Connector for UnixConnector {
    fn connect<'a>(&'a self, _host: &'a str, _port: u16) -> ConnectFuture<'a> {
        Box::pin(async move {
            let stream = tokio::net::UnixStream::connect(&self.path)
                .await
                .map_err(|e| {
                    Error::Connection(format!(
                        "Failed to connect to {}: {}",
                        self.path.display(),
                        e
                    ))
                })?;
            tracing::debug!("Connected to {}", self.path.display());
            Ok(Box::new(stream) as BoxedTransport)
        })
    }
}
