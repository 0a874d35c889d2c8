//! HTTP/1.x transport layer.
//!
//! - `connector`: byte stream transports and the connectors that open them
//! - `connection`: buffered, timed, interruptible I/O
//! - `h1`: message head encoding and parsing
//! - `body`: transfer-mode body coding

pub mod body;
pub mod connection;
pub mod connector;
pub mod h1;
pub mod tcp;
