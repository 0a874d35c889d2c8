//! Client side of the WebSocket opening handshake (RFC 6455 Section 4).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::Response;

const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Random 16-byte nonce, base64 encoded, for `Sec-WebSocket-Key`.
pub fn generate_key() -> Result<String> {
    let mut nonce = [0u8; 16];
    getrandom::fill(&mut nonce)
        .map_err(|e| Error::handshake(format!("Failed to generate key: {}", e)))?;
    Ok(STANDARD.encode(nonce))
}

/// Expected `Sec-WebSocket-Accept` for a key.
pub fn accept_key(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(WEBSOCKET_GUID.as_bytes());
    STANDARD.encode(sha1.finalize())
}

/// Upgrade request for `target`.
pub fn build_request(target: &str, key: &str, protocols: &[String]) -> Request {
    let mut request = Request::get(target)
        .keep_alive(true)
        .header("Upgrade", "websocket")
        .header("Connection", "Upgrade")
        .header("Sec-WebSocket-Key", key)
        .header("Sec-WebSocket-Version", "13");
    if !protocols.is_empty() {
        request = request.header("Sec-WebSocket-Protocol", protocols.join(", "));
    }
    request
}

/// Check the server's answer. Returns the negotiated subprotocol, if any.
pub fn verify_response(response: &Response, key: &str, protocols: &[String]) -> Result<Option<String>> {
    if response.status != 101 {
        return Err(Error::handshake(format!(
            "Expected 101 Switching Protocols, got {} {}",
            response.status, response.reason
        )));
    }
    if !response
        .get("upgrade")
        .map_or(false, |v| v.trim().eq_ignore_ascii_case("websocket"))
    {
        return Err(Error::handshake("Missing Upgrade: websocket"));
    }
    if !response.headers.has_token("connection", "upgrade") {
        return Err(Error::handshake("Missing Connection: Upgrade"));
    }
    match response.get("sec-websocket-accept") {
        Some(accept) if accept.trim() == accept_key(key) => {}
        Some(_) => return Err(Error::handshake("Sec-WebSocket-Accept mismatch")),
        None => return Err(Error::handshake("Missing Sec-WebSocket-Accept")),
    }

    match response.get("sec-websocket-protocol") {
        Some(protocol) => {
            let protocol = protocol.trim();
            if !protocols.iter().any(|p| p == protocol) {
                return Err(Error::handshake(format!(
                    "Server selected unrequested subprotocol {:?}",
                    protocol
                )));
            }
            Ok(Some(protocol.to_string()))
        }
        None => Ok(None),
    }
}
