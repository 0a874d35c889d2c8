//! RFC 7617 Basic credentials for `Proxy-Authorization`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

/// Proxy credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Header value for these credentials.
    pub fn basic(&self) -> String {
        basic_auth(&self.username, &self.password)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Generate Basic Auth header value (RFC 7617).
///
/// # Returns
/// "Basic " followed by base64-encoded credentials.
pub fn basic_auth(username: &str, password: &str) -> String {
    let plain = format!("{}:{}", username, password);
    let encoded = BASE64.encode(plain);
    format!("Basic {}", encoded)
}

/// Parse a Basic Auth header value.
///
/// Returns (username, password) or None if invalid.
pub fn parse_basic_auth(header: &str) -> Option<(String, String)> {
    let encoded = header.strip_prefix("Basic ")?.trim();
    let decoded_vec = BASE64.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded_vec).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}
