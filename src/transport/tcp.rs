//! TCP socket options applied to freshly connected sockets.

use std::io;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;

/// TCP socket configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpOptions {
    /// Disable Nagle's algorithm. Request heads and small chunks go out immediately.
    pub nodelay: bool,
    /// Idle time before TCP keepalive probes start; `None` leaves the OS default.
    pub keepalive: Option<Duration>,
    /// Receive buffer size (influences the advertised window).
    pub recv_buffer_size: Option<usize>,
    /// Send buffer size.
    pub send_buffer_size: Option<usize>,
}

impl Default for TcpOptions {
    fn default() -> Self {
        Self {
            nodelay: true,
            keepalive: Some(Duration::from_secs(60)),
            recv_buffer_size: None,
            send_buffer_size: None,
        }
    }
}

impl TcpOptions {
    /// Options that leave every socket setting at the OS default.
    pub fn os_defaults() -> Self {
        Self {
            nodelay: false,
            keepalive: None,
            recv_buffer_size: None,
            send_buffer_size: None,
        }
    }
}

/// Configure a connected TCP socket.
///
/// Uses socket2 for the options tokio does not expose.
pub fn configure_tcp_socket(stream: &TcpStream, opts: &TcpOptions) -> io::Result<()> {
    stream.set_nodelay(opts.nodelay)?;

    let socket = SockRef::from(stream);
    if let Some(idle) = opts.keepalive {
        socket.set_tcp_keepalive(&TcpKeepalive::new().with_time(idle))?;
    }
    if let Some(size) = opts.recv_buffer_size {
        socket.set_recv_buffer_size(size)?;
    }
    if let Some(size) = opts.send_buffer_size {
        socket.set_send_buffer_size(size)?;
    }

    Ok(())
}
