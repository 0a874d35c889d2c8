//! RFC 9112 message framing for the client side.
//!
//! Request heads are written by hand to keep full control over header order;
//! response heads are parsed with httparse.

use http::{Method, Version};

use crate::error::{Error, Result};
use crate::headers::Headers;
use crate::response::BodyFraming;

/// Maximum number of headers to parse.
const MAX_HEADERS_COUNT: usize = 100;

/// A parsed status line plus header block.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: u16,
    pub reason: String,
    pub version: Version,
    pub headers: Headers,
}

/// Serialize a request line and header block, ending with the blank line.
pub fn encode_request_head(
    method: &Method,
    target: &str,
    version: Version,
    headers: &Headers,
) -> Result<Vec<u8>> {
    if target.is_empty() || target.bytes().any(|b| b <= b' ' || b == 0x7f) {
        return Err(Error::malformed(format!("Invalid request target: {:?}", target)));
    }
    let version = match version {
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_11 => "HTTP/1.1",
        other => {
            return Err(Error::invalid_state(format!(
                "Unsupported protocol version {:?}",
                other
            )))
        }
    };

    let mut request = Vec::with_capacity(256);
    request.extend_from_slice(method.as_str().as_bytes());
    request.push(b' ');
    request.extend_from_slice(target.as_bytes());
    request.push(b' ');
    request.extend_from_slice(version.as_bytes());
    request.extend_from_slice(b"\r\n");
    write_fields(&mut request, headers)?;
    request.extend_from_slice(b"\r\n");
    Ok(request)
}

/// Write `name: value\r\n` lines after validating them.
fn write_fields(out: &mut Vec<u8>, headers: &Headers) -> Result<()> {
    for (name, value) in headers.iter() {
        validate_header_name(name)?;
        validate_header_value(value)?;
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    Ok(())
}

/// One chunk: `<hex-size>\r\n<data>\r\n`.
pub fn encode_chunk(data: &[u8]) -> Vec<u8> {
    let mut chunk = Vec::with_capacity(data.len() + 12);
    chunk.extend_from_slice(format!("{:X}\r\n", data.len()).as_bytes());
    chunk.extend_from_slice(data);
    chunk.extend_from_slice(b"\r\n");
    chunk
}

/// Last chunk, trailer fields and the final blank line.
pub fn encode_last_chunk(trailers: &Headers) -> Result<Vec<u8>> {
    let mut out = b"0\r\n".to_vec();
    write_fields(&mut out, trailers)?;
    out.extend_from_slice(b"\r\n");
    Ok(out)
}

/// Parse a complete response head (status line through blank line).
pub fn parse_response_head(head: &[u8]) -> Result<ResponseHead> {
    reject_obs_fold(head)?;

    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS_COUNT];
    let mut response = httparse::Response::new(&mut headers);

    let parsed = response
        .parse(head)
        .map_err(|e| Error::malformed(format!("Failed to parse response: {}", e)))?;
    if let httparse::Status::Partial = parsed {
        return Err(Error::malformed("Incomplete response headers"));
    }

    let status = response
        .code
        .ok_or_else(|| Error::malformed("Missing status code"))?;
    let version = match response.version {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    };
    let reason = response.reason.unwrap_or("").to_string();

    let mut fields = Headers::new();
    for h in response.headers.iter().filter(|h| !h.name.is_empty()) {
        let value = std::str::from_utf8(h.value)
            .map_err(|_| Error::malformed(format!("Non UTF-8 value for header {}", h.name)))?;
        fields.add_received(h.name, value);
    }

    Ok(ResponseHead {
        status,
        reason,
        version,
        headers: fields,
    })
}

/// Obsolete line folding (RFC 9112 Section 5.2) is not accepted.
fn reject_obs_fold(head: &[u8]) -> Result<()> {
    let folded = head
        .split(|&b| b == b'\n')
        .skip(1)
        .any(|line| matches!(line.first(), Some(b' ') | Some(b'\t')));
    if folded {
        return Err(Error::malformed("Obsolete header line folding"));
    }
    Ok(())
}

/// Parse one trailer field line (no CRLF).
pub fn parse_field_line(line: &[u8]) -> Result<(String, String)> {
    if matches!(line.first(), Some(b' ') | Some(b'\t')) {
        return Err(Error::malformed("Obsolete line folding in trailer"));
    }
    let line = std::str::from_utf8(line)
        .map_err(|_| Error::malformed("Non UTF-8 trailer field"))?;
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| Error::malformed(format!("Trailer field without colon: {:?}", line)))?;
    validate_header_name(name)?;
    let value = value.trim_matches(|c| c == ' ' || c == '\t');
    validate_header_value(value)?;
    Ok((name.to_string(), value.to_string()))
}

/// Parse a chunk-size line; extensions after `;` are ignored.
pub fn parse_chunk_size(line: &[u8]) -> Result<u64> {
    let line = std::str::from_utf8(line)
        .map_err(|_| Error::chunk_framing("Chunk size is not ASCII"))?;
    let size = line.split(';').next().unwrap_or("").trim();
    if size.is_empty() || !size.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::chunk_framing(format!("Invalid chunk size: {:?}", line)));
    }
    u64::from_str_radix(size, 16)
        .map_err(|_| Error::chunk_framing(format!("Chunk size overflow: {:?}", line)))
}

/// Decide body framing per RFC 9112 Section 6.3.
///
/// Returns the framing and the declared content length (reported even when
/// no body follows, e.g. for HEAD).
pub fn resolve_framing(
    head: &ResponseHead,
    request_method: &Method,
) -> Result<(BodyFraming, Option<u64>)> {
    let transfer_encoding = head.headers.get("transfer-encoding");

    let declared = match (transfer_encoding, head.headers.get("content-length")) {
        // Content-Length MUST be ignored when Transfer-Encoding is present
        (Some(_), _) => None,
        (None, Some(value)) => Some(parse_content_length(value)?),
        (None, None) => None,
    };

    let has_body = !matches!(head.status, 100..=199 | 204 | 304) && *request_method != Method::HEAD;
    if !has_body {
        return Ok((BodyFraming::None, declared));
    }

    if let Some(te) = transfer_encoding {
        // chunked must be the final transfer coding
        let chunked = te
            .split(',')
            .next_back()
            .map(|s| s.trim().eq_ignore_ascii_case("chunked"))
            .unwrap_or(false);
        if chunked {
            return Ok((BodyFraming::Chunked, None));
        }
        return Ok((BodyFraming::UntilClose, None));
    }

    match declared {
        Some(len) => Ok((BodyFraming::Length(len), declared)),
        None => Ok((BodyFraming::UntilClose, None)),
    }
}

/// Persistent-connection decision for a response (RFC 9112 Section 9.3).
pub fn is_keep_alive(version: Version, headers: &Headers) -> bool {
    if headers.has_token("connection", "close") {
        return false;
    }
    match version {
        Version::HTTP_10 => headers.has_token("connection", "keep-alive"),
        _ => true,
    }
}

/// Validate a header name per RFC 9110 Section 5.1.
///
/// Header names must be tokens: 1*tchar where tchar excludes
/// delimiters, control characters, and whitespace.
pub fn validate_header_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::malformed("Empty header name"));
    }
    for b in name.bytes() {
        if !is_tchar(b) {
            return Err(Error::malformed(format!(
                "Invalid character in header name: {:?}",
                name
            )));
        }
    }
    Ok(())
}

/// Check if a byte is a valid token character per RFC 9110.
fn is_tchar(b: u8) -> bool {
    matches!(b,
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' |
        b'^' | b'_' | b'`' | b'|' | b'~' | b'0'..=b'9' | b'A'..=b'Z' | b'a'..=b'z'
    )
}

/// Validate a header value per RFC 9110 Section 5.5.
///
/// Header values must not contain NUL, CR, or LF (prevents header injection).
pub fn validate_header_value(value: &str) -> Result<()> {
    for b in value.bytes() {
        if b == 0 || b == b'\r' || b == b'\n' {
            return Err(Error::malformed(
                "Invalid character in header value (CR/LF/NUL not allowed)",
            ));
        }
    }
    Ok(())
}

/// Parse and validate Content-Length header value per RFC 9112 Section 6.2.
///
/// Content-Length must be a non-negative integer. If multiple values are
/// present (comma-separated), they must all be identical.
pub fn parse_content_length(value: &str) -> Result<u64> {
    let parse = |part: &str| -> Result<u64> {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::malformed(format!("Invalid Content-Length: {}", value)));
        }
        part.parse::<u64>()
            .map_err(|_| Error::malformed(format!("Invalid Content-Length: {}", value)))
    };

    let mut parts = value.split(',').map(|s| s.trim());
    let first = parse(parts.next().unwrap_or(""))?;

    // Per RFC 9112: If multiple values, they must all be identical
    for part in parts {
        if parse(part)? != first {
            return Err(Error::malformed(format!(
                "Conflicting Content-Length values: {}",
                value
            )));
        }
    }

    Ok(first)
}

/// Build a `CONNECT` request head for `authority` (`host:port`).
pub fn encode_connect(authority: &str, proxy_authorization: Option<&str>) -> Result<Vec<u8>> {
    let mut headers = Headers::new();
    headers.append("Host", authority);
    if let Some(value) = proxy_authorization {
        headers.append("Proxy-Authorization", value);
    }
    encode_request_head(&Method::CONNECT, authority, Version::HTTP_11, &headers)
}
