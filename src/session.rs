//! HTTP/1.1 client session.
//!
//! A [`Session`] owns at most one live connection to its [`Endpoint`] (or to
//! the proxy in front of it) and runs one exchange at a time over it:
//!
//! ```text
//! Idle -> Connected -> RequestSent -> AwaitingInterim -> ResponseHeaderReceived
//!      -> BodyStreaming -> Idle (reusable) | Closed
//! ```
//!
//! Connections are kept alive between exchanges when both sides allow it. A
//! body the caller abandoned is drained before the next request; anything
//! that makes the connection unusable forces a reconnect instead.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use http::{Method, Version};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::headers::Headers;
use crate::proxy::{bypass_proxy, Endpoint, ProxyConfig};
use crate::request::{Request, TransferMode};
use crate::response::{BodyFraming, Response};
use crate::sync::Interrupt;
use crate::timeouts::Timeouts;
use crate::transport::body::{BodyDecoder, BodyEncoder};
use crate::transport::connection::Connection;
#[cfg(unix)]
use crate::transport::connector::UnixConnector;
use crate::transport::connector::{BoxedTransport, Connector, TcpConnector};
use crate::transport::h1::{
    encode_connect, encode_request_head, is_keep_alive, parse_response_head, resolve_framing,
    ResponseHead,
};
use crate::transport::tcp::TcpOptions;

/// Size of the scratch buffer used by body convenience readers.
const READ_BUF_SIZE: usize = 8192;

/// Session-wide settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub timeouts: Timeouts,
    /// Keep-alive default for requests that do not choose themselves.
    pub keep_alive: bool,
    /// Idle time after which a kept-alive connection is not reused.
    pub keep_alive_timeout: Option<Duration>,
    /// Maximum size of a response head.
    pub max_header_size: usize,
    /// Maximum number of abandoned body bytes drained to keep a connection.
    pub max_drain: u64,
    /// Socket options for the default TCP connector.
    pub tcp: TcpOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeouts: Timeouts::defaults(),
            keep_alive: true,
            keep_alive_timeout: Some(Duration::from_secs(8)),
            max_header_size: 64 * 1024,
            max_drain: 1024 * 1024,
            tcp: TcpOptions::default(),
        }
    }
}

impl SessionConfig {
    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn keep_alive_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.keep_alive_timeout = timeout;
        self
    }

    pub fn max_header_size(mut self, size: usize) -> Self {
        self.max_header_size = size;
        self
    }

    pub fn max_drain(mut self, bytes: u64) -> Self {
        self.max_drain = bytes;
        self
    }

    pub fn tcp(mut self, tcp: TcpOptions) -> Self {
        self.tcp = tcp;
        self
    }
}

/// Where a session is in its exchange cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connected,
    RequestSent,
    AwaitingInterim,
    ResponseHeaderReceived,
    BodyStreaming,
    Closed,
}

/// An HTTP/1.1 client session bound to one endpoint.
pub struct Session<C: Connector = TcpConnector> {
    endpoint: Endpoint,
    config: SessionConfig,
    connector: C,
    proxy: Option<ProxyConfig>,
    conn: Option<Connection>,
    state: SessionState,
    reusable: bool,
    /// Requests go to a forwarding proxy (not tunneled).
    forwarding: bool,
    exchanges: u64,
    connections_opened: u64,
    interrupt: Arc<Interrupt>,
    last_used: Option<Instant>,

    request_method: Method,
    request_keep_alive: bool,
    request_trailers: Headers,
    encoder: Option<BodyEncoder>,

    interim: Option<Response>,
    pending_final: Option<Response>,
    decoder: BodyDecoder,
    trailer: Headers,
}

impl Session<TcpConnector> {
    /// Session over plain TCP with default settings.
    pub fn new(endpoint: Endpoint) -> Self {
        Self::with_config(endpoint, SessionConfig::default())
    }

    pub fn with_config(endpoint: Endpoint, config: SessionConfig) -> Self {
        let connector = TcpConnector::with_options(config.tcp.clone());
        Self::with_connector(endpoint, config, connector)
    }
}

#[cfg(unix)]
impl Session<UnixConnector> {
    /// Session over the Unix domain socket at `path`. Requests carry `Host: localhost`.
    pub fn unix(path: impl Into<std::path::PathBuf>, config: SessionConfig) -> Self {
        Self::with_connector(Endpoint::new("localhost", 80), config, UnixConnector::new(path))
    }
}

impl<C: Connector> Session<C> {
    /// Session using a caller-supplied connector (e.g. one that adds TLS).
    pub fn with_connector(endpoint: Endpoint, config: SessionConfig, connector: C) -> Self {
        Self {
            endpoint,
            config,
            connector,
            proxy: None,
            conn: None,
            state: SessionState::Idle,
            reusable: false,
            forwarding: false,
            exchanges: 0,
            connections_opened: 0,
            interrupt: Arc::new(Interrupt::new()),
            last_used: None,
            request_method: Method::GET,
            request_keep_alive: true,
            request_trailers: Headers::new(),
            encoder: None,
            interim: None,
            pending_final: None,
            decoder: BodyDecoder::done(),
            trailer: Headers::new(),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn proxy(&self) -> Option<&ProxyConfig> {
        self.proxy.as_ref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of requests sent.
    pub fn exchanges(&self) -> u64 {
        self.exchanges
    }

    /// Number of connections opened (reconnects included).
    pub fn connections_opened(&self) -> u64 {
        self.connections_opened
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Handle for aborting a blocked operation from another task.
    pub fn interrupt_handle(&self) -> Arc<Interrupt> {
        Arc::clone(&self.interrupt)
    }

    /// The interim (or peeked final) response read by [`peek_response`](Self::peek_response).
    pub fn interim_response(&self) -> Option<&Response> {
        self.interim.as_ref()
    }

    /// Trailer fields of the last chunked response. Empty until its body is fully read.
    pub fn response_trailer(&self) -> &Headers {
        &self.trailer
    }

    pub fn set_keep_alive(&mut self, keep_alive: bool) {
        self.config.keep_alive = keep_alive;
    }

    /// Whether the endpoint is reached without the configured proxy.
    pub fn bypass_proxy(&self) -> bool {
        bypass_proxy(self.proxy.as_ref(), &self.endpoint)
    }

    /// Route through `host:port`, keeping existing credentials and bypass list.
    pub fn set_proxy(&mut self, host: impl Into<String>, port: u16) -> Result<()> {
        self.ensure_between_exchanges()?;
        let proxy = match self.proxy.take() {
            Some(mut proxy) => {
                proxy.host = host.into();
                proxy.port = port;
                proxy
            }
            None => ProxyConfig::new(host, port),
        };
        self.apply_proxy(Some(proxy));
        Ok(())
    }

    pub fn set_proxy_credentials(
        &mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<()> {
        self.ensure_between_exchanges()?;
        let proxy = self
            .proxy
            .take()
            .ok_or_else(|| Error::invalid_state("No proxy configured"))?;
        self.apply_proxy(Some(proxy.with_credentials(username, password)));
        Ok(())
    }

    /// Replace (or with `None`, remove) the proxy configuration.
    pub fn set_proxy_config(&mut self, proxy: Option<ProxyConfig>) -> Result<()> {
        self.ensure_between_exchanges()?;
        self.apply_proxy(proxy);
        Ok(())
    }

    fn apply_proxy(&mut self, proxy: Option<ProxyConfig>) {
        self.proxy = proxy;
        if self.conn.is_some() {
            debug!("Proxy settings changed, dropping connection to {}", self.endpoint.authority());
            self.disconnect();
        }
    }

    fn ensure_between_exchanges(&self) -> Result<()> {
        match self.state {
            SessionState::Idle | SessionState::Connected | SessionState::Closed => Ok(()),
            state => Err(Error::invalid_state(format!(
                "Cannot change proxy settings in state {:?}",
                state
            ))),
        }
    }

    /// Open a fresh connection, dropping any current one.
    pub async fn connect(&mut self) -> Result<()> {
        self.disconnect();

        let open = self.open();
        let (conn, forwarding) = match self.config.timeouts.connect {
            Some(limit) => tokio::time::timeout(limit, open)
                .await
                .map_err(|_| Error::ConnectTimeout(limit))??,
            None => open.await?,
        };

        self.conn = Some(conn);
        self.forwarding = forwarding;
        self.reusable = true;
        self.state = SessionState::Connected;
        self.last_used = None;
        self.connections_opened += 1;
        Ok(())
    }

    async fn open(&self) -> Result<(Connection, bool)> {
        let endpoint = &self.endpoint;
        match &self.proxy {
            Some(proxy) if !self.bypass_proxy() => {
                debug!(
                    "Connecting to {} via proxy {}:{}",
                    endpoint.authority(),
                    proxy.host,
                    proxy.port
                );
                let stream = self.connector.connect(&proxy.host, proxy.port).await?;
                if !endpoint.use_tunnel {
                    return Ok((self.wrap(stream), true));
                }
                let stream = self.tunnel(stream, proxy).await?;
                let stream = self.connector.secure(stream, &endpoint.host).await?;
                Ok((self.wrap(stream), false))
            }
            _ => {
                debug!("Connecting to {}", endpoint.authority());
                let mut stream = self.connector.connect(&endpoint.host, endpoint.port).await?;
                if endpoint.use_tunnel {
                    stream = self.connector.secure(stream, &endpoint.host).await?;
                }
                Ok((self.wrap(stream), false))
            }
        }
    }

    /// Ask the proxy for a `CONNECT` tunnel to the endpoint.
    async fn tunnel(&self, stream: BoxedTransport, proxy: &ProxyConfig) -> Result<BoxedTransport> {
        let authority = self.endpoint.authority();
        let mut conn = self.wrap(stream);
        let authorization = proxy.authorization();
        conn.write_all(&encode_connect(&authority, authorization.as_deref())?)
            .await?;
        conn.flush().await?;

        let head = conn
            .read_head(self.config.max_header_size)
            .await?
            .ok_or_else(|| Error::connection("Proxy closed connection during CONNECT"))?;
        let head = parse_response_head(&head)?;
        if !(200..300).contains(&head.status) {
            return Err(Error::ProxyTunnel {
                status: head.status,
                reason: head.reason,
            });
        }
        debug!("Tunnel to {} established via {}:{}", authority, proxy.host, proxy.port);
        conn.into_transport()
    }

    fn wrap(&self, stream: BoxedTransport) -> Connection {
        Connection::new(stream, self.config.timeouts.clone(), Arc::clone(&self.interrupt))
    }

    fn disconnect(&mut self) {
        self.conn = None;
        self.reusable = false;
        self.encoder = None;
        self.decoder = BodyDecoder::done();
        self.pending_final = None;
        self.state = SessionState::Closed;
    }

    /// Reuse the current connection if possible, otherwise reconnect.
    async fn prepare_connection(&mut self) -> Result<()> {
        let mut reuse = self.conn.is_some() && self.reusable;
        if reuse {
            reuse = match self.state {
                SessionState::Idle | SessionState::Connected => true,
                SessionState::ResponseHeaderReceived | SessionState::BodyStreaming => {
                    self.drain_for_reuse().await
                }
                _ => false,
            };
        }
        if reuse && self.conn.as_ref().map_or(true, Connection::is_eof) {
            reuse = false;
        }
        if reuse {
            if let (Some(limit), Some(last)) = (self.config.keep_alive_timeout, self.last_used) {
                if last.elapsed() >= limit {
                    debug!("Keep-alive timeout expired for {}", self.endpoint.authority());
                    reuse = false;
                }
            }
        }

        if reuse {
            debug!("Reusing connection to {}", self.endpoint.authority());
            Ok(())
        } else {
            if self.conn.is_some() {
                debug!("Reconnecting to {}", self.endpoint.authority());
            }
            self.connect().await
        }
    }

    /// Discard the rest of an abandoned response body. Returns whether the
    /// connection can carry the next request.
    async fn drain_for_reuse(&mut self) -> bool {
        let limit = self.config.max_drain;
        if let Some(remaining) = self.decoder.remaining() {
            if remaining > limit {
                debug!("Not draining {} remaining body bytes", remaining);
                return false;
            }
        }
        if matches!(self.decoder, BodyDecoder::UntilClose) {
            return false;
        }

        let mut buf = [0u8; READ_BUF_SIZE];
        let mut drained = 0u64;
        loop {
            match self.read_body(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    drained += n as u64;
                    if drained > limit {
                        warn!("Abandoned body exceeds {} bytes, reconnecting", limit);
                        return false;
                    }
                }
                Err(e) => {
                    warn!("Failed to drain response body: {}", e);
                    return false;
                }
            }
        }
        debug!("Drained {} body bytes", drained);
        self.reusable && self.conn.is_some()
    }

    /// Send a request head. The body, if any, follows through
    /// [`write_body`](Self::write_body) and [`finish_body`](Self::finish_body).
    pub async fn send_request(&mut self, request: &Request) -> Result<()> {
        if request.transfer_mode == TransferMode::Chunked && request.version == Version::HTTP_10 {
            return Err(Error::invalid_state(
                "Chunked transfer coding requires HTTP/1.1",
            ));
        }
        self.prepare_connection().await?;

        let keep_alive = request.keep_alive.unwrap_or(self.config.keep_alive);
        let head = self.build_head(request, keep_alive)?;

        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| Error::invalid_state("Not connected"))?;
        let written = match conn.write_all(&head).await {
            Ok(()) => conn.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            self.reusable = false;
            return Err(e);
        }

        self.request_method = request.method.clone();
        self.request_keep_alive = keep_alive;
        self.request_trailers = request.trailers.clone();
        self.encoder = Some(BodyEncoder::new(request.transfer_mode));
        self.interim = None;
        self.pending_final = None;
        self.decoder = BodyDecoder::done();
        self.trailer = Headers::new();
        self.exchanges += 1;
        self.state = if request.expect_continue {
            SessionState::AwaitingInterim
        } else {
            SessionState::RequestSent
        };
        debug!(
            "Sent {} {} to {} (exchange {})",
            request.method,
            request.target,
            self.endpoint.authority(),
            self.exchanges
        );
        Ok(())
    }

    fn build_head(&self, request: &Request, keep_alive: bool) -> Result<Vec<u8>> {
        let mut headers = Headers::new();
        if !request.headers.contains("host") {
            headers.append("Host", self.endpoint.host_header());
        }
        for (name, value) in request.headers.iter() {
            headers.append(name, value);
        }

        if !headers.contains("connection") {
            headers.append("Connection", if keep_alive { "keep-alive" } else { "close" });
        }

        match request.transfer_mode {
            TransferMode::Identity(length) => {
                headers.remove("transfer-encoding");
                let needs_length = request.has_body()
                    || matches!(request.method, Method::POST | Method::PUT | Method::PATCH);
                if needs_length {
                    headers.set("Content-Length", length.to_string());
                } else {
                    headers.remove("content-length");
                }
            }
            TransferMode::Chunked => {
                headers.remove("content-length");
                headers.set("Transfer-Encoding", "chunked");
            }
        }

        if request.expect_continue {
            headers.set("Expect", "100-continue");
        }

        let mut target = request.target.as_str();
        let forwarded;
        if self.forwarding {
            if let Some(proxy) = &self.proxy {
                if let Some(authorization) = proxy.authorization() {
                    if !headers.contains("proxy-authorization") {
                        headers.append("Proxy-Authorization", authorization);
                    }
                }
                forwarded = proxy.forward_target(&self.endpoint, &request.target);
                target = &forwarded;
            }
        }

        encode_request_head(&request.method, target, request.version, &headers)
    }

    /// Write request body bytes.
    pub async fn write_body(&mut self, data: &[u8]) -> Result<()> {
        match self.state {
            SessionState::RequestSent => {}
            SessionState::AwaitingInterim => {
                return Err(Error::invalid_state(
                    "Body withheld until 100 Continue; call peek_response first",
                ));
            }
            state => {
                return Err(Error::invalid_state(format!(
                    "No request body in progress (state {:?})",
                    state
                )));
            }
        }
        let (Some(conn), Some(encoder)) = (self.conn.as_mut(), self.encoder.as_mut()) else {
            return Err(Error::invalid_state("No request body in progress"));
        };
        let result = encoder.write(conn, data).await;
        if let Err(e) = &result {
            if !matches!(e, Error::InvalidState(_)) {
                self.reusable = false;
            }
        }
        result
    }

    /// Complete the request body (last chunk and trailers in chunked mode).
    pub async fn finish_body(&mut self) -> Result<()> {
        if self.state != SessionState::RequestSent {
            return Err(Error::invalid_state(format!(
                "No request body in progress (state {:?})",
                self.state
            )));
        }
        let (Some(conn), Some(encoder)) = (self.conn.as_mut(), self.encoder.as_mut()) else {
            return Err(Error::invalid_state("No request body in progress"));
        };
        let result = encoder.finish(conn, &self.request_trailers).await;
        if let Err(e) = &result {
            if !matches!(e, Error::InvalidState(_)) {
                self.reusable = false;
            }
        }
        result
    }

    /// After an `Expect: 100-continue` request, read the server's first answer.
    ///
    /// Returns `true` on `100 Continue`: write the body, then call
    /// [`receive_response`](Self::receive_response). Any other status is the
    /// final response; it is returned by the next `receive_response` and the
    /// body is never sent. The connection is then not reused.
    pub async fn peek_response(&mut self) -> Result<bool> {
        if self.state != SessionState::AwaitingInterim {
            return Err(Error::invalid_state(
                "peek_response requires a request sent with Expect: 100-continue",
            ));
        }
        loop {
            let head = self.read_response_head().await?;
            match head.status {
                100 => {
                    self.interim = Some(interim_response(head));
                    self.state = SessionState::RequestSent;
                    return Ok(true);
                }
                102..=199 => {
                    debug!("Skipping interim response {}", head.status);
                }
                _ => {
                    debug!("Expectation rejected with {}", head.status);
                    self.reusable = false;
                    self.encoder = None;
                    let response = self.accept_response(head)?;
                    self.interim = Some(response.clone());
                    self.pending_final = Some(response.clone());
                    return Ok(false);
                }
            }
        }
    }

    /// Read the final response head. Interim responses other than 101 are skipped.
    ///
    /// An unfinished chunked request body is finished first.
    pub async fn receive_response(&mut self) -> Result<Response> {
        if let Some(response) = self.pending_final.take() {
            return Ok(response);
        }
        match self.state {
            SessionState::RequestSent => {}
            SessionState::AwaitingInterim => {
                return Err(Error::invalid_state(
                    "Expect: 100-continue pending; call peek_response first",
                ));
            }
            state => {
                return Err(Error::invalid_state(format!(
                    "No request awaiting a response (state {:?})",
                    state
                )));
            }
        }

        if matches!(self.encoder, Some(BodyEncoder::Chunked { finished: false })) {
            self.finish_body().await?;
        } else if self.encoder.as_ref().map_or(false, |e| !e.is_finished()) {
            return Err(Error::invalid_state(
                "Request body shorter than declared Content-Length",
            ));
        }

        loop {
            let head = self.read_response_head().await?;
            if (100..200).contains(&head.status) && head.status != 101 {
                debug!("Skipping interim response {}", head.status);
                self.interim = Some(interim_response(head));
                continue;
            }
            return self.accept_response(head);
        }
    }

    async fn read_response_head(&mut self) -> Result<ResponseHead> {
        let max = self.config.max_header_size;
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| Error::invalid_state("Not connected"))?;
        let result = match conn.read_head(max).await {
            Ok(Some(head)) => parse_response_head(&head),
            Ok(None) => Err(Error::connection("Server closed connection without a response")),
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            if !e.is_recoverable() {
                self.reusable = false;
            }
        }
        result
    }

    fn accept_response(&mut self, head: ResponseHead) -> Result<Response> {
        let (framing, content_length) = match resolve_framing(&head, &self.request_method) {
            Ok(resolved) => resolved,
            Err(e) => {
                self.reusable = false;
                return Err(e);
            }
        };
        let upgraded = head.status == 101;
        let keep_alive = self.reusable
            && !upgraded
            && self.request_keep_alive
            && framing != BodyFraming::UntilClose
            && is_keep_alive(head.version, &head.headers);
        self.reusable = keep_alive;

        let response = Response::new(
            head.status,
            head.reason,
            head.version,
            head.headers,
            framing,
            content_length,
            keep_alive,
        );
        self.encoder = None;
        self.decoder = BodyDecoder::new(framing);
        self.state = SessionState::ResponseHeaderReceived;
        if self.decoder.is_done() && !upgraded {
            self.complete_response();
        }
        Ok(response)
    }

    fn complete_response(&mut self) {
        if let BodyDecoder::Done { trailers } = &mut self.decoder {
            self.trailer = std::mem::take(trailers);
        }
        self.last_used = Some(Instant::now());
        if self.reusable {
            self.state = SessionState::Idle;
        } else {
            debug!("Closing connection to {} after response", self.endpoint.authority());
            self.conn = None;
            self.state = SessionState::Closed;
        }
    }

    /// Reader for the current response body.
    pub fn body(&mut self) -> BodyReader<'_, C> {
        BodyReader { session: self }
    }

    async fn read_body(&mut self, out: &mut [u8]) -> Result<usize> {
        match self.state {
            SessionState::ResponseHeaderReceived | SessionState::BodyStreaming => {}
            _ => return Ok(0),
        }
        if out.is_empty() {
            return Ok(0);
        }
        let Some(conn) = self.conn.as_mut() else {
            return Err(Error::invalid_state("Not connected"));
        };
        self.state = SessionState::BodyStreaming;
        match self.decoder.read(conn, out).await {
            Ok(0) => {
                self.complete_response();
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) => {
                if !e.is_recoverable() {
                    self.reusable = false;
                }
                Err(e)
            }
        }
    }

    /// Run one complete exchange and return the response head.
    ///
    /// In identity mode the body length overrides the request's declared length.
    pub async fn send(&mut self, request: &Request, body: &[u8]) -> Result<Response> {
        let sized;
        let request = match request.transfer_mode {
            TransferMode::Identity(length) if length != body.len() as u64 => {
                sized = request.clone().content_length(body.len() as u64);
                &sized
            }
            _ => request,
        };

        self.send_request(request).await?;
        if request.expect_continue && !self.peek_response().await? {
            return self.receive_response().await;
        }
        self.write_body(body).await?;
        self.finish_body().await?;
        self.receive_response().await
    }

    /// Shut the connection down.
    pub async fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            debug!("Closing connection to {}", self.endpoint.authority());
            if let Err(e) = conn.shutdown().await {
                debug!("Shutdown of {} failed: {}", self.endpoint.authority(), e);
            }
        }
        self.disconnect();
    }

    /// Hand over the live connection, including bytes already buffered.
    pub fn into_connection(mut self) -> Result<Connection> {
        self.conn
            .take()
            .ok_or_else(|| Error::invalid_state("Session has no live connection"))
    }
}

fn interim_response(head: ResponseHead) -> Response {
    Response::new(
        head.status,
        head.reason,
        head.version,
        head.headers,
        BodyFraming::None,
        None,
        true,
    )
}

/// Borrowing reader over the current response body.
pub struct BodyReader<'a, C: Connector> {
    session: &'a mut Session<C>,
}

impl<C: Connector> BodyReader<'_, C> {
    /// Read up to `out.len()` body bytes. Returns 0 at the end of the body.
    pub async fn read(&mut self, out: &mut [u8]) -> Result<usize> {
        self.session.read_body(out).await
    }

    /// Next piece of the body, or `None` at the end.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>> {
        let mut buf = vec![0u8; READ_BUF_SIZE];
        let n = self.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(Bytes::from(buf)))
    }

    pub async fn read_to_end(&mut self) -> Result<Bytes> {
        let mut body = BytesMut::new();
        let mut buf = [0u8; READ_BUF_SIZE];
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                return Ok(body.freeze());
            }
            body.extend_from_slice(&buf[..n]);
        }
    }

    /// Discard the rest of the body, returning how many bytes were skipped.
    pub async fn drain(&mut self) -> Result<u64> {
        let mut buf = [0u8; READ_BUF_SIZE];
        let mut total = 0u64;
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                return Ok(total);
            }
            total += n as u64;
        }
    }
}
