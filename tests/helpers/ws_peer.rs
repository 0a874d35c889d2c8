use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

/// How the scripted peer answers the upgrade request.
pub enum Handshake {
    Accept,
    /// 101 with a wrong `Sec-WebSocket-Accept`.
    BadAccept,
    /// Plain 403.
    Reject,
}

/// Scripted WebSocket server: accepts one upgrade, then lets the test drive frames.
pub struct WsPeer {
    listener: TcpListener,
    port: u16,
}

impl WsPeer {
    pub async fn bind() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        Ok(Self { listener, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Accept one connection and answer its upgrade request.
    pub async fn accept(self, handshake: Handshake) -> PeerConnection {
        let (stream, _) = self.listener.accept().await.unwrap();
        let mut conn = PeerConnection {
            stream,
            buf: Vec::new(),
            request_head: String::new(),
        };
        let head = conn.read_until(b"\r\n\r\n").await.expect("upgrade request");
        conn.request_head = String::from_utf8(head).unwrap();
        let key = conn.request_header("sec-websocket-key").unwrap_or_default();

        let response = match handshake {
            Handshake::Accept => format!(
                "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {}\r\n\r\n",
                accept_for(&key)
            ),
            Handshake::BadAccept => "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: dGhpcyBpcyBub3QgaXQ=\r\n\r\n".to_string(),
            Handshake::Reject => "HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\n\r\n".to_string(),
        };
        conn.stream.write_all(response.as_bytes()).await.unwrap();
        conn
    }
}

/// `Sec-WebSocket-Accept` computed independently of the client.
pub fn accept_for(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11");
    STANDARD.encode(sha1.finalize())
}

/// A frame as it appeared on the wire from the client.
#[derive(Debug)]
pub struct PeerFrame {
    pub fin: bool,
    pub opcode: u8,
    pub masked: bool,
    /// The 7-bit length field (126 and 127 select the extended forms).
    pub length_code: u8,
    pub mask: [u8; 4],
    /// Unmasked payload.
    pub payload: Vec<u8>,
}

pub struct PeerConnection {
    stream: TcpStream,
    buf: Vec<u8>,
    pub request_head: String,
}

impl PeerConnection {
    pub fn request_header(&self, name: &str) -> Option<String> {
        self.request_head.lines().find_map(|line| {
            let (k, v) = line.split_once(':')?;
            k.trim()
                .eq_ignore_ascii_case(name)
                .then(|| v.trim().to_string())
        })
    }

    /// Send an unmasked server frame.
    pub async fn send(&mut self, fin: bool, opcode: u8, payload: &[u8]) {
        let mut out = vec![if fin { 0x80 } else { 0 } | opcode];
        if payload.len() < 126 {
            out.push(payload.len() as u8);
        } else if payload.len() <= 0xFFFF {
            out.push(126);
            out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        } else {
            out.push(127);
            out.extend_from_slice(&(payload.len() as u64).to_be_bytes());
        }
        out.extend_from_slice(payload);
        self.write_raw(&out).await;
    }

    pub async fn write_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    /// Read one client frame; `None` if the client closed the socket.
    pub async fn read_frame(&mut self) -> Option<PeerFrame> {
        let header = self.read_exact(2).await?;
        let fin = header[0] & 0x80 != 0;
        let opcode = header[0] & 0x0F;
        let masked = header[1] & 0x80 != 0;
        let length_code = header[1] & 0x7F;
        let len = match length_code {
            126 => {
                let ext = self.read_exact(2).await?;
                u16::from_be_bytes([ext[0], ext[1]]) as usize
            }
            127 => {
                let ext = self.read_exact(8).await?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&ext);
                u64::from_be_bytes(raw) as usize
            }
            n => n as usize,
        };
        let mut mask = [0u8; 4];
        if masked {
            mask.copy_from_slice(&self.read_exact(4).await?);
        }
        let mut payload = self.read_exact(len).await?;
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= mask[i % 4];
        }
        Some(PeerFrame {
            fin,
            opcode,
            masked,
            length_code,
            mask,
            payload,
        })
    }

    /// Whether the client has closed its side.
    pub async fn client_closed(&mut self) -> bool {
        let mut byte = [0u8; 1];
        matches!(
            timeout(Duration::from_secs(2), self.stream.read(&mut byte)).await,
            Ok(Ok(0)) | Ok(Err(_))
        )
    }

    async fn read_until(&mut self, pattern: &[u8]) -> Option<Vec<u8>> {
        loop {
            if let Some(pos) = self.buf.windows(pattern.len()).position(|w| w == pattern) {
                return Some(self.buf.drain(..pos + pattern.len()).collect());
            }
            self.fill().await?;
        }
    }

    async fn read_exact(&mut self, n: usize) -> Option<Vec<u8>> {
        while self.buf.len() < n {
            self.fill().await?;
        }
        Some(self.buf.drain(..n).collect())
    }

    async fn fill(&mut self) -> Option<()> {
        let mut chunk = [0u8; 16384];
        match timeout(Duration::from_secs(5), self.stream.read(&mut chunk)).await {
            Ok(Ok(0)) | Ok(Err(_)) | Err(_) => None,
            Ok(Ok(n)) => {
                self.buf.extend_from_slice(&chunk[..n]);
                Some(())
            }
        }
    }
}
