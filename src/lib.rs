//! # Tether
//!
//! HTTP/1.1 client session engine.
//!
//! Tether runs request/response exchanges over one persistent connection per
//! session, with chunked bodies and trailers, `Expect: 100-continue`, proxy
//! forwarding and `CONNECT` tunnels, and a WebSocket layer on top of the
//! upgraded connection.

pub mod auth;
pub mod error;
pub mod headers;
pub mod proxy;
pub mod request;
pub mod response;
pub mod session;
pub mod sync;
pub mod timeouts;
pub mod transport;
pub mod ws;

// Re-exports
pub use error::{Error, Result};
pub use headers::Headers;
pub use proxy::{Endpoint, ProxyConfig};
pub use request::{Request, TransferMode};
pub use response::{BodyFraming, Response};
pub use session::{BodyReader, Session, SessionConfig, SessionState};
pub use sync::{Interrupt, WakeSignal};
pub use timeouts::Timeouts;
pub use transport::connector::{Connector, TcpConnector, Transport};
#[cfg(unix)]
pub use transport::connector::UnixConnector;
pub use transport::tcp::TcpOptions;
pub use ws::{Frame, Message, Opcode, WebSocket, WebSocketConfig, WebSocketState};
