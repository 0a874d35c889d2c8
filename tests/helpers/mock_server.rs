use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::timeout;

use super::connection_tracker::ConnectionTracker;

/// Body returned by `/small` and `/trailer`.
pub const SMALL_BODY: &str = "This is some random text data returned by the server";

/// Body returned by `/large`.
#[allow(dead_code)]
pub fn large_body() -> Vec<u8> {
    (0..8000u32).map(|i| b"0123456789abcdef"[(i % 16) as usize]).collect()
}

/// A request as the server saw it.
#[derive(Debug, Clone, Default)]
#[allow(dead_code)]
pub struct RecordedRequest {
    pub method: String,
    pub target: String,
    /// Minor HTTP version (0 or 1).
    pub version: u8,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub chunked: bool,
    pub trailers: Vec<(String, String)>,
}

#[allow(dead_code)]
impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn trailer(&self, name: &str) -> Option<&str> {
        find_header(&self.trailers, name)
    }
}

#[derive(Default)]
struct ServerState {
    requests: Mutex<Vec<RecordedRequest>>,
    proxy_credentials: Option<(String, String)>,
}

/// HTTP/1.1 test server with keep-alive, chunked bodies, trailers,
/// `Expect: 100-continue` and enough proxy behaviour (absolute-form targets,
/// `CONNECT`, `Proxy-Authorization`) to stand in for a forward proxy.
///
/// Routes: `/small`, `/large`, `/echo`, `/expect`, `/trailer`, `/fail`,
/// `/nolength`, `/truncated`, `/malformed`, `/slow`.
pub struct MockHttpServer {
    listener: TcpListener,
    port: u16,
    state: Arc<ServerState>,
    tracker: ConnectionTracker,
}

#[allow(dead_code)]
impl MockHttpServer {
    /// Create a new mock server bound to a random port.
    pub async fn new() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        Ok(Self {
            listener,
            port,
            state: Arc::new(ServerState::default()),
            tracker: ConnectionTracker::new(),
        })
    }

    /// Require `Proxy-Authorization` with these credentials (407 otherwise).
    pub fn with_proxy_credentials(mut self, username: &str, password: &str) -> Self {
        self.state = Arc::new(ServerState {
            requests: Mutex::new(Vec::new()),
            proxy_credentials: Some((username.to_string(), password.to_string())),
        });
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Start serving; returns a handle for inspecting what the server saw.
    pub fn start(self) -> ServerHandle {
        let handle = ServerHandle {
            port: self.port,
            state: Arc::clone(&self.state),
            tracker: self.tracker.clone(),
        };
        let listener = self.listener;
        let state = self.state;
        let tracker = self.tracker;
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        tracker.record_connection(peer);
                        tokio::spawn(handle_connection(stream, Arc::clone(&state)));
                    }
                    Err(e) => {
                        tracing::error!("Accept error: {}", e);
                        break;
                    }
                }
            }
        });
        handle
    }
}

/// Serve the same routes on a Unix domain socket at `path`.
#[cfg(unix)]
#[allow(dead_code)]
pub fn start_unix(path: &std::path::Path) -> std::io::Result<ServerHandle> {
    let _ = std::fs::remove_file(path);
    let listener = tokio::net::UnixListener::bind(path)?;
    let state = Arc::new(ServerState::default());
    let tracker = ConnectionTracker::new();
    let handle = ServerHandle {
        port: 0,
        state: Arc::clone(&state),
        tracker: tracker.clone(),
    };
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    // Unix peers have no socket address; count them under one key.
                    tracker.record_connection(std::net::SocketAddr::from(([0, 0, 0, 0], 0)));
                    tokio::spawn(handle_connection(stream, Arc::clone(&state)));
                }
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                    break;
                }
            }
        }
    });
    Ok(handle)
}

/// Inspection side of a running [`MockHttpServer`].
#[derive(Clone)]
pub struct ServerHandle {
    port: u16,
    state: Arc<ServerState>,
    tracker: ConnectionTracker,
}

#[allow(dead_code)]
impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Connections accepted so far.
    pub fn connections(&self) -> usize {
        self.tracker.total_connections()
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.state.requests.lock().unwrap().last().cloned()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }
}

enum Body {
    Fixed(Vec<u8>),
    Chunked(Vec<u8>, Vec<(String, String)>),
    UntilClose(Vec<u8>),
    /// Written verbatim, then the connection is closed.
    Raw(&'static [u8]),
}

/// Any stream the server can speak HTTP over (TCP or Unix).
trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

/// Handle a connection, processing requests until either side closes.
async fn handle_connection<S: Stream>(mut stream: S, state: Arc<ServerState>) {
    let mut buf = Vec::new();
    loop {
        let head = match read_until(&mut stream, &mut buf, b"\r\n\r\n").await {
            Some(head) => head,
            None => break,
        };
        let mut request = match parse_request(&head) {
            Some(request) => request,
            None => {
                tracing::warn!("Unparseable request head");
                break;
            }
        };

        let keep_alive = wants_keep_alive(&request);

        if request.method == "CONNECT" {
            record(&state, request.clone());
            if !authorized(&state, &request) {
                let _ = stream
                    .write_all(b"HTTP/1.1 407 Proxy Authentication Required\r\nContent-Length: 0\r\n\r\n")
                    .await;
                break;
            }
            if request.target.starts_with("deny.") {
                let _ = stream
                    .write_all(b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\n\r\n")
                    .await;
                break;
            }
            if stream
                .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
                .await
                .is_err()
            {
                break;
            }
            // From here on the tunnel carries requests to the origin, served locally.
            continue;
        }

        let path = origin_path(&request.target).to_string();
        let expects_continue = find_header(&request.headers, "expect")
            .map_or(false, |v| v.eq_ignore_ascii_case("100-continue"));

        if expects_continue {
            if path == "/fail" {
                record(&state, request);
                let _ = stream
                    .write_all(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                    .await;
                break;
            }
            if stream.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await.is_err() {
                break;
            }
        }

        if read_body(&mut stream, &mut buf, &mut request).await.is_none() {
            break;
        }
        record(&state, request.clone());

        if state.proxy_credentials.is_some()
            && request.target.starts_with("http://")
            && !authorized(&state, &request)
        {
            let response = b"HTTP/1.1 407 Proxy Authentication Required\r\nContent-Length: 0\r\n\r\n";
            if stream.write_all(response).await.is_err() {
                break;
            }
            continue;
        }

        let (status, body) = route(&path, &request).await;
        let head_only = request.method == "HEAD";
        let (bytes, close) = render(status, request.version, keep_alive, body, head_only);
        if stream.write_all(&bytes).await.is_err() || stream.flush().await.is_err() {
            break;
        }
        if close {
            break;
        }
    }
}

async fn route(path: &str, request: &RecordedRequest) -> (u16, Body) {
    match path {
        "/small" => (200, Body::Fixed(SMALL_BODY.as_bytes().to_vec())),
        "/large" if request.version == 1 => (200, Body::Chunked(large_body(), Vec::new())),
        "/large" => (200, Body::UntilClose(large_body())),
        "/echo" | "/expect" | "/keepAlive" => {
            if request.chunked {
                (200, Body::Chunked(request.body.clone(), Vec::new()))
            } else {
                (200, Body::Fixed(request.body.clone()))
            }
        }
        "/trailer" => (
            200,
            Body::Chunked(
                SMALL_BODY.as_bytes().to_vec(),
                vec![
                    ("Trailer-1".to_string(), "Value 1".to_string()),
                    ("Trailer-2".to_string(), "Value 2".to_string()),
                ],
            ),
        ),
        "/fail" => (400, Body::Fixed(Vec::new())),
        "/nolength" => (200, Body::UntilClose(SMALL_BODY.as_bytes().to_vec())),
        "/truncated" => (
            200,
            Body::Raw(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nonly ten b"),
        ),
        "/malformed" => (
            200,
            Body::Raw(b"HTTP/1.1 200 OK\r\nX-Folded: first\r\n second\r\nContent-Length: 0\r\n\r\n"),
        ),
        "/slow" => {
            tokio::time::sleep(Duration::from_millis(300)).await;
            (200, Body::Fixed(SMALL_BODY.as_bytes().to_vec()))
        }
        _ => (404, Body::Fixed(Vec::new())),
    }
}

/// Serialize a response. Returns the bytes and whether to close afterwards.
fn render(status: u16, version: u8, keep_alive: bool, body: Body, head_only: bool) -> (Vec<u8>, bool) {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        _ => "Unknown",
    };
    let mut out = format!("HTTP/1.{} {} {}\r\n", version, status, reason).into_bytes();
    let mut close = !keep_alive;

    let payload = match body {
        Body::Raw(raw) => return (raw.to_vec(), true),
        Body::Fixed(data) => {
            out.extend_from_slice(format!("Content-Length: {}\r\n", data.len()).as_bytes());
            data
        }
        Body::Chunked(data, trailers) => {
            out.extend_from_slice(b"Transfer-Encoding: chunked\r\n");
            let mut encoded = Vec::new();
            for piece in data.chunks(1000) {
                encoded.extend_from_slice(format!("{:x}\r\n", piece.len()).as_bytes());
                encoded.extend_from_slice(piece);
                encoded.extend_from_slice(b"\r\n");
            }
            encoded.extend_from_slice(b"0\r\n");
            for (name, value) in trailers {
                encoded.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
            }
            encoded.extend_from_slice(b"\r\n");
            encoded
        }
        Body::UntilClose(data) => {
            close = true;
            data
        }
    };

    out.extend_from_slice(if close {
        b"Connection: close\r\n\r\n".as_slice()
    } else {
        b"Connection: keep-alive\r\n\r\n".as_slice()
    });
    if !head_only {
        out.extend_from_slice(&payload);
    }
    (out, close)
}

fn record(state: &ServerState, request: RecordedRequest) {
    state.requests.lock().unwrap().push(request);
}

fn authorized(state: &ServerState, request: &RecordedRequest) -> bool {
    let Some((user, pass)) = &state.proxy_credentials else {
        return true;
    };
    find_header(&request.headers, "proxy-authorization")
        .and_then(tether::auth::parse_basic_auth)
        .map_or(false, |(u, p)| &u == user && &p == pass)
}

fn wants_keep_alive(request: &RecordedRequest) -> bool {
    let connection = find_header(&request.headers, "connection").unwrap_or("");
    let has = |token: &str| {
        connection
            .split(',')
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    };
    if request.version == 1 {
        !has("close")
    } else {
        has("keep-alive")
    }
}

/// Path of an origin-form or absolute-form target.
fn origin_path(target: &str) -> &str {
    match target.strip_prefix("http://") {
        Some(rest) => rest.find('/').map_or("/", |i| &rest[i..]),
        None => target,
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn parse_request(head: &[u8]) -> Option<RecordedRequest> {
    let mut headers = [httparse::EMPTY_HEADER; 64];
    let mut req = httparse::Request::new(&mut headers);
    match req.parse(head) {
        Ok(httparse::Status::Complete(_)) => {}
        _ => return None,
    }
    Some(RecordedRequest {
        method: req.method?.to_string(),
        target: req.path?.to_string(),
        version: req.version?,
        headers: req
            .headers
            .iter()
            .map(|h| {
                (
                    h.name.to_string(),
                    String::from_utf8_lossy(h.value).into_owned(),
                )
            })
            .collect(),
        ..Default::default()
    })
}

/// Read the request body per its framing. `None` if the client went away.
async fn read_body<S: Stream>(stream: &mut S, buf: &mut Vec<u8>, request: &mut RecordedRequest) -> Option<()> {
    let chunked = find_header(&request.headers, "transfer-encoding")
        .map_or(false, |v| v.to_ascii_lowercase().contains("chunked"));
    if chunked {
        request.chunked = true;
        loop {
            let line = read_until(stream, buf, b"\r\n").await?;
            let line = String::from_utf8_lossy(&line[..line.len() - 2]).into_owned();
            let size_str = line.split(';').next().unwrap_or("").trim();
            let size = usize::from_str_radix(size_str, 16).ok()?;
            if size == 0 {
                loop {
                    let line = read_until(stream, buf, b"\r\n").await?;
                    if line.len() == 2 {
                        return Some(());
                    }
                    let line = String::from_utf8_lossy(&line[..line.len() - 2]).into_owned();
                    let (name, value) = line.split_once(':')?;
                    request
                        .trailers
                        .push((name.trim().to_string(), value.trim().to_string()));
                }
            }
            let data = read_exact(stream, buf, size + 2).await?;
            request.body.extend_from_slice(&data[..size]);
        }
    }

    let length = find_header(&request.headers, "content-length")
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    if length > 0 {
        request.body = read_exact(stream, buf, length).await?;
    }
    Some(())
}

/// Read through `pattern`, returning everything up to and including it.
async fn read_until<S: Stream>(stream: &mut S, buf: &mut Vec<u8>, pattern: &[u8]) -> Option<Vec<u8>> {
    loop {
        if let Some(pos) = buf.windows(pattern.len()).position(|w| w == pattern) {
            return Some(buf.drain(..pos + pattern.len()).collect());
        }
        fill(stream, buf).await?;
    }
}

async fn read_exact<S: Stream>(stream: &mut S, buf: &mut Vec<u8>, n: usize) -> Option<Vec<u8>> {
    while buf.len() < n {
        fill(stream, buf).await?;
    }
    Some(buf.drain(..n).collect())
}

async fn fill<S: Stream>(stream: &mut S, buf: &mut Vec<u8>) -> Option<()> {
    let mut chunk = [0u8; 8192];
    // Idle connections are dropped after a while so tests do not hang.
    match timeout(Duration::from_secs(5), stream.read(&mut chunk)).await {
        Ok(Ok(0)) | Ok(Err(_)) | Err(_) => None,
        Ok(Ok(n)) => {
            buf.extend_from_slice(&chunk[..n]);
            Some(())
        }
    }
}
