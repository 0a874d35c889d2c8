//! WebSocket client over an upgraded session connection.
//!
//! [`WebSocket::connect`] performs the opening handshake on a [`Session`] and
//! takes over its connection, including any bytes the server sent right after
//! the `101` head.

pub mod frame;
pub mod handshake;

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::request::Request;
use crate::session::Session;
use crate::sync::Interrupt;
use crate::transport::connection::Connection;
use crate::transport::connector::Connector;

pub use frame::{close_code, Frame, Opcode};
use frame::{close_payload, parse_close_payload, MAX_CONTROL_PAYLOAD};

/// WebSocket connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebSocketState {
    HandshakeSent,
    HandshakeAccepted,
    Open,
    /// Close sent, waiting for the peer's Close.
    Closing,
    Closed,
}

#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Limit for a reassembled message.
    pub max_message_size: u64,
    /// Limit for a single frame payload.
    pub max_frame_size: u64,
    /// Answer Pings automatically.
    pub auto_pong: bool,
    /// How long `close` waits for the peer's Close frame.
    pub close_grace: Duration,
    /// Offered subprotocols, in preference order.
    pub protocols: Vec<String>,
    /// Read timeout on the open connection; `None` keeps the session's.
    pub read_timeout: Option<Duration>,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_message_size: 16 * 1024 * 1024,
            max_frame_size: 16 * 1024 * 1024,
            auto_pong: true,
            close_grace: Duration::from_secs(5),
            protocols: Vec::new(),
            read_timeout: None,
        }
    }
}

impl WebSocketConfig {
    pub fn max_message_size(mut self, size: u64) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn max_frame_size(mut self, size: u64) -> Self {
        self.max_frame_size = size;
        self
    }

    pub fn auto_pong(mut self, auto_pong: bool) -> Self {
        self.auto_pong = auto_pong;
        self
    }

    pub fn close_grace(mut self, grace: Duration) -> Self {
        self.close_grace = grace;
        self
    }

    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocols.push(protocol.into());
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }
}

/// A complete application-level message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Bytes),
    /// Only surfaced when automatic Pong replies are disabled.
    Ping(Bytes),
    Pong(Bytes),
    Close(Option<(u16, String)>),
}

pub struct WebSocket {
    conn: Connection,
    state: WebSocketState,
    config: WebSocketConfig,
    protocol: Option<String>,
    /// Ping payload awaiting a manual Pong.
    pending_pong: Option<Bytes>,
    /// Opcode and data of a message still being reassembled.
    fragment: Option<(Opcode, BytesMut)>,
    peer_close: Option<(u16, String)>,
}

impl WebSocket {
    /// Upgrade `session` to a WebSocket on `target`.
    ///
    /// On failure the session is closed and dropped.
    pub async fn connect<C: Connector>(
        mut session: Session<C>,
        target: &str,
        config: WebSocketConfig,
    ) -> Result<Self> {
        let key = handshake::generate_key()?;
        let request = handshake::build_request(target, &key, &config.protocols);

        let protocol = match upgrade(&mut session, &request, &key, &config.protocols).await {
            Ok(protocol) => protocol,
            Err(e) => {
                debug!("WebSocket handshake with {} failed: {}", session.endpoint().authority(), e);
                session.close().await;
                return Err(e);
            }
        };
        debug!(
            "WebSocket {:?} on {}{}",
            WebSocketState::HandshakeAccepted,
            session.endpoint().authority(),
            target
        );

        let mut conn = session.into_connection()?;
        if let Some(timeout) = config.read_timeout {
            conn.set_read_timeout(Some(timeout));
        }
        Ok(Self::from_connection(conn, config, protocol))
    }

    /// Wrap a connection whose handshake already completed.
    pub fn from_connection(conn: Connection, config: WebSocketConfig, protocol: Option<String>) -> Self {
        Self {
            conn,
            state: WebSocketState::Open,
            config,
            protocol,
            pending_pong: None,
            fragment: None,
            peer_close: None,
        }
    }

    pub fn state(&self) -> WebSocketState {
        self.state
    }

    /// Subprotocol selected by the server.
    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    pub fn interrupt_handle(&self) -> Arc<Interrupt> {
        self.conn.interrupt_handle()
    }

    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.conn.set_read_timeout(timeout);
    }

    /// Status and reason from the peer's Close frame, once received.
    pub fn close_status(&self) -> Option<&(u16, String)> {
        self.peer_close.as_ref()
    }

    /// Send one frame with a fresh masking key.
    ///
    /// A Ping left unanswered in manual mode is answered before any data frame.
    pub async fn send_frame(&mut self, opcode: Opcode, payload: &[u8], fin: bool) -> Result<()> {
        if self.state != WebSocketState::Open {
            return Err(Error::ConnectionClosed);
        }
        if opcode.is_control() {
            if !fin {
                return Err(Error::frame("Control frames cannot be fragmented"));
            }
            if payload.len() > MAX_CONTROL_PAYLOAD {
                return Err(Error::frame(format!(
                    "Control frame payload of {} bytes",
                    payload.len()
                )));
            }
        } else if let Some(ping) = self.pending_pong.take() {
            self.write_frame(Opcode::Pong, &ping, true).await?;
        }
        if opcode == Opcode::Pong {
            self.pending_pong = None;
        }
        self.write_frame(opcode, payload, fin).await
    }

    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.send_frame(Opcode::Text, text.as_bytes(), true).await
    }

    pub async fn send_binary(&mut self, data: &[u8]) -> Result<()> {
        self.send_frame(Opcode::Binary, data, true).await
    }

    pub async fn ping(&mut self, payload: &[u8]) -> Result<()> {
        self.send_frame(Opcode::Ping, payload, true).await
    }

    pub async fn pong(&mut self, payload: &[u8]) -> Result<()> {
        self.send_frame(Opcode::Pong, payload, true).await
    }

    async fn write_frame(&mut self, opcode: Opcode, payload: &[u8], fin: bool) -> Result<()> {
        let mut key = [0u8; 4];
        getrandom::fill(&mut key)
            .map_err(|e| Error::io(format!("Failed to generate masking key: {}", e)))?;
        let frame = Frame::new(opcode, Bytes::copy_from_slice(payload), fin).masked(key);

        let result = match self.conn.write_all(&frame.encode()).await {
            Ok(()) => self.conn.flush().await,
            Err(e) => Err(e),
        };
        // A failed write may leave a partial frame on the wire.
        if let Err(e) = &result {
            debug!("Write of {:?} frame failed: {}", opcode, e);
            self.state = WebSocketState::Closed;
        }
        result
    }

    /// Read the next frame. Ping and Close frames are handled before they are returned.
    pub async fn receive_frame(&mut self) -> Result<Frame> {
        if self.state == WebSocketState::Closed {
            return Err(Error::ConnectionClosed);
        }
        let frame = self.read_frame().await?;
        if frame.mask.is_some() {
            self.state = WebSocketState::Closed;
            return Err(Error::frame("Server frames must not be masked"));
        }

        match frame.opcode {
            Opcode::Ping if self.config.auto_pong => {
                self.write_frame(Opcode::Pong, &frame.payload, true).await?;
            }
            Opcode::Ping => self.pending_pong = Some(frame.payload.clone()),
            Opcode::Close => {
                let status = match parse_close_payload(&frame.payload) {
                    Ok(status) => status,
                    Err(e) => {
                        self.state = WebSocketState::Closed;
                        return Err(e);
                    }
                };
                self.peer_close = status.clone();
                if self.state == WebSocketState::Open {
                    let echo = status.map_or_else(Bytes::new, |(code, _)| close_payload(code, ""));
                    if let Err(e) = self.write_frame(Opcode::Close, &echo, true).await {
                        debug!("Failed to echo Close: {}", e);
                    }
                }
                self.shutdown().await;
            }
            _ => {}
        }
        Ok(frame)
    }

    async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            match Frame::decode(self.conn.buffered(), self.config.max_frame_size) {
                Ok(Some((frame, used))) => {
                    self.conn.consume(used);
                    return Ok(frame);
                }
                Ok(None) => {}
                Err(e) => {
                    self.state = WebSocketState::Closed;
                    return Err(e);
                }
            }
            match self.conn.fill().await {
                Ok(0) => {
                    self.state = WebSocketState::Closed;
                    return Err(Error::ConnectionClosed);
                }
                Ok(_) => {}
                Err(e) => {
                    if !e.is_recoverable() {
                        self.state = WebSocketState::Closed;
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Read the next complete message, reassembling fragments.
    pub async fn receive_message(&mut self) -> Result<Message> {
        loop {
            let frame = self.receive_frame().await?;
            match frame.opcode {
                Opcode::Ping if self.config.auto_pong => {}
                Opcode::Ping => return Ok(Message::Ping(frame.payload)),
                Opcode::Pong => return Ok(Message::Pong(frame.payload)),
                Opcode::Close => return Ok(Message::Close(self.peer_close.clone())),
                Opcode::Text | Opcode::Binary => {
                    if self.fragment.is_some() {
                        return Err(self.protocol_error("Data frame inside a fragmented message"));
                    }
                    if frame.fin {
                        return self.finish_message(frame.opcode, frame.payload);
                    }
                    self.check_message_size(frame.payload.len() as u64)?;
                    self.fragment = Some((frame.opcode, BytesMut::from(&frame.payload[..])));
                }
                Opcode::Continuation => {
                    let Some((_, data)) = self.fragment.as_ref() else {
                        return Err(self.protocol_error("Continuation frame without a message"));
                    };
                    let size = data.len() as u64 + frame.payload.len() as u64;
                    self.check_message_size(size)?;
                    if let Some((_, data)) = self.fragment.as_mut() {
                        data.extend_from_slice(&frame.payload);
                    }
                    if frame.fin {
                        if let Some((opcode, data)) = self.fragment.take() {
                            return self.finish_message(opcode, data.freeze());
                        }
                    }
                }
            }
        }
    }

    fn check_message_size(&mut self, size: u64) -> Result<()> {
        let limit = self.config.max_message_size;
        if size > limit {
            self.state = WebSocketState::Closed;
            return Err(Error::MessageTooLarge { size, limit });
        }
        Ok(())
    }

    fn protocol_error(&mut self, message: &str) -> Error {
        self.state = WebSocketState::Closed;
        Error::frame(message)
    }

    fn finish_message(&mut self, opcode: Opcode, payload: Bytes) -> Result<Message> {
        self.check_message_size(payload.len() as u64)?;
        match opcode {
            Opcode::Text => match String::from_utf8(payload.to_vec()) {
                Ok(text) => Ok(Message::Text(text)),
                Err(_) => Err(self.protocol_error("Text message is not valid UTF-8")),
            },
            _ => Ok(Message::Binary(payload)),
        }
    }

    /// Start the closing handshake and wait up to the close grace for the peer.
    pub async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        match self.state {
            WebSocketState::Closed => return Ok(()),
            WebSocketState::Open => {
                let payload = close_payload(code, reason);
                if payload.len() > MAX_CONTROL_PAYLOAD {
                    return Err(Error::frame("Close reason too long"));
                }
                self.write_frame(Opcode::Close, &payload, true).await?;
                self.state = WebSocketState::Closing;
                debug!("WebSocket {:?}", self.state);
            }
            _ => {}
        }

        let grace = self.config.close_grace;
        let await_close = async {
            loop {
                match self.receive_frame().await {
                    Ok(frame) if frame.opcode == Opcode::Close => return Ok(()),
                    Ok(_) => {}
                    Err(Error::Timeout(_)) => {}
                    Err(e) => return Err(e),
                }
            }
        };
        match tokio::time::timeout(grace, await_close).await {
            Ok(Ok(())) | Ok(Err(Error::ConnectionClosed)) => {}
            Ok(Err(e)) => debug!("Error while awaiting Close: {}", e),
            Err(_) => warn!("Peer did not answer Close within {:?}", grace),
        }

        if self.state != WebSocketState::Closed {
            self.shutdown().await;
        }
        Ok(())
    }

    async fn shutdown(&mut self) {
        if let Err(e) = self.conn.shutdown().await {
            debug!("WebSocket shutdown failed: {}", e);
        }
        self.state = WebSocketState::Closed;
        debug!("WebSocket {:?}", self.state);
    }
}

async fn upgrade<C: Connector>(
    session: &mut Session<C>,
    request: &Request,
    key: &str,
    protocols: &[String],
) -> Result<Option<String>> {
    session.send_request(request).await?;
    debug!(
        "WebSocket {:?} to {}",
        WebSocketState::HandshakeSent,
        session.endpoint().authority()
    );
    let response = session.receive_response().await?;
    handshake::verify_response(&response, key, protocols)
}
