//! Endpoint identity and proxy routing policy.

use regex::{Regex, RegexBuilder};
use url::Url;

use crate::auth::Credentials;
use crate::error::{Error, Result};

/// The logical remote target of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    /// Reach the origin through an end-to-end tunnel (proxy `CONNECT`, then
    /// [`Connector::secure`](crate::transport::connector::Connector::secure)).
    pub use_tunnel: bool,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            use_tunnel: false,
        }
    }

    /// Endpoint reached through a tunnel.
    pub fn tunneled(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            use_tunnel: true,
        }
    }

    /// Build an endpoint from an `http`, `https`, `ws` or `wss` URL.
    ///
    /// Secure schemes default to port 443 and set `use_tunnel`.
    pub fn parse(url: &str) -> Result<Self> {
        let url = Url::parse(url)?;
        let secure = match url.scheme() {
            "http" | "ws" => false,
            "https" | "wss" => true,
            other => {
                return Err(Error::connection(format!("Unsupported scheme: {}", other)));
            }
        };
        let host = url
            .host_str()
            .ok_or_else(|| Error::connection("URL has no host"))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = url.port().unwrap_or(if secure { 443 } else { 80 });
        Ok(Self {
            host,
            port,
            use_tunnel: secure,
        })
    }

    fn default_port(&self) -> u16 {
        if self.use_tunnel {
            443
        } else {
            80
        }
    }

    /// `host:port` with IPv6 literals bracketed.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.bracketed_host(), self.port)
    }

    /// Value for the `Host` header; the port is omitted when it is the default.
    pub fn host_header(&self) -> String {
        if self.port == self.default_port() {
            self.bracketed_host()
        } else {
            self.authority()
        }
    }

    fn bracketed_host(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }
}

/// Compiled `|`-separated list of host patterns that skip the proxy.
///
/// Each pattern must match the whole host name, ignoring ASCII case.
#[derive(Debug, Clone, Default)]
pub struct NonProxyHosts {
    source: String,
    patterns: Vec<Regex>,
}

impl NonProxyHosts {
    pub fn parse(list: &str) -> Result<Self> {
        let mut patterns = Vec::new();
        for pattern in list.split('|').map(str::trim).filter(|p| !p.is_empty()) {
            let anchored = format!("^(?:{})$", pattern);
            let regex = RegexBuilder::new(&anchored)
                .case_insensitive(true)
                .build()
                .map_err(|e| Error::InvalidProxyPattern {
                    pattern: pattern.to_string(),
                    message: e.to_string(),
                })?;
            patterns.push(regex);
        }
        Ok(Self {
            source: list.to_string(),
            patterns,
        })
    }

    pub fn matches(&self, host: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(host))
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Proxy settings owned by a session.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    pub credentials: Option<Credentials>,
    pub non_proxy_hosts: NonProxyHosts,
    /// Prefix origin-form request targets with `http://host[:port]` when forwarding.
    pub absolute_form: bool,
}

impl ProxyConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            credentials: None,
            non_proxy_hosts: NonProxyHosts::default(),
            absolute_form: false,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    /// Set the bypass list, e.g. `"localhost|127\\.0\\.0\\.1|.*\\.internal"`.
    pub fn with_non_proxy_hosts(mut self, list: &str) -> Result<Self> {
        self.non_proxy_hosts = NonProxyHosts::parse(list)?;
        Ok(self)
    }

    pub fn with_absolute_form(mut self, absolute_form: bool) -> Self {
        self.absolute_form = absolute_form;
        self
    }

    /// Whether traffic to `host` goes direct.
    pub fn bypass(&self, host: &str) -> bool {
        host.eq_ignore_ascii_case(&self.host) || self.non_proxy_hosts.matches(host)
    }

    /// `Proxy-Authorization` value, if credentials are configured.
    pub fn authorization(&self) -> Option<String> {
        self.credentials.as_ref().map(Credentials::basic)
    }

    /// Request target to send to a forwarding proxy.
    pub fn forward_target(&self, endpoint: &Endpoint, target: &str) -> String {
        if self.absolute_form && target.starts_with('/') {
            format!("http://{}{}", endpoint.host_header(), target)
        } else {
            target.to_string()
        }
    }
}

/// Routing decision: true when the session connects straight to the endpoint.
pub fn bypass_proxy(proxy: Option<&ProxyConfig>, endpoint: &Endpoint) -> bool {
    proxy.map_or(true, |p| p.bypass(&endpoint.host))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy() -> ProxyConfig {
        ProxyConfig::new("proxy.domain.com", 80)
            .with_non_proxy_hosts("localhost|127\\.0\\.0\\.1")
            .unwrap()
    }

    #[test]
    fn test_bypass_matching_hosts() {
        let proxy = proxy();
        assert!(bypass_proxy(Some(&proxy), &Endpoint::new("127.0.0.1", 80)));
        assert!(bypass_proxy(Some(&proxy), &Endpoint::new("localhost", 8080)));
        assert!(!bypass_proxy(Some(&proxy), &Endpoint::new("www.appinf.com", 80)));
    }

    #[test]
    fn test_patterns_match_whole_host() {
        let proxy = proxy();
        assert!(!bypass_proxy(Some(&proxy), &Endpoint::new("localhost.evil.com", 80)));
        assert!(!bypass_proxy(Some(&proxy), &Endpoint::new("10.127.0.0.1", 80)));
    }

    #[test]
    fn test_patterns_ignore_case() {
        let proxy = proxy();
        assert!(bypass_proxy(Some(&proxy), &Endpoint::new("LOCALHOST", 80)));
        assert!(bypass_proxy(Some(&proxy), &Endpoint::new("LocalHost", 80)));
    }

    #[test]
    fn test_bypass_without_proxy_or_to_proxy_itself() {
        assert!(bypass_proxy(None, &Endpoint::new("www.appinf.com", 80)));
        let proxy = ProxyConfig::new("proxy.domain.com", 3128);
        assert!(bypass_proxy(Some(&proxy), &Endpoint::new("PROXY.domain.com", 80)));
        assert!(!bypass_proxy(Some(&proxy), &Endpoint::new("other.domain.com", 80)));
    }

    #[test]
    fn test_wildcard_patterns() {
        let proxy = ProxyConfig::new("proxy", 8080)
            .with_non_proxy_hosts(".*\\.internal| 10\\.\\d+\\.\\d+\\.\\d+ ")
            .unwrap();
        assert!(proxy.bypass("db.internal"));
        assert!(proxy.bypass("10.1.2.3"));
        assert!(!proxy.bypass("internal.com"));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = ProxyConfig::new("proxy", 8080)
            .with_non_proxy_hosts("ok|(unclosed")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidProxyPattern { ref pattern, .. } if pattern == "(unclosed"));
    }

    #[test]
    fn test_authorization_header() {
        let proxy = ProxyConfig::new("proxy", 8080).with_credentials("user", "pass");
        assert_eq!(proxy.authorization().as_deref(), Some("Basic dXNlcjpwYXNz"));
        assert_eq!(ProxyConfig::new("proxy", 8080).authorization(), None);
    }

    #[test]
    fn test_forward_target() {
        let endpoint = Endpoint::new("www.somehost.com", 8000);
        let proxy = ProxyConfig::new("proxy", 8080);
        assert_eq!(proxy.forward_target(&endpoint, "/large"), "/large");
        let proxy = proxy.with_absolute_form(true);
        assert_eq!(
            proxy.forward_target(&endpoint, "/large"),
            "http://www.somehost.com:8000/large"
        );
        assert_eq!(
            proxy.forward_target(&endpoint, "http://x/y"),
            "http://x/y"
        );
    }

    #[test]
    fn test_endpoint_parse() {
        let e = Endpoint::parse("http://example.com/path").unwrap();
        assert_eq!(e, Endpoint::new("example.com", 80));
        let e = Endpoint::parse("wss://example.com:9443/chat").unwrap();
        assert_eq!(e, Endpoint::tunneled("example.com", 9443));
        let e = Endpoint::parse("http://[::1]:8080/").unwrap();
        assert_eq!(e.host, "::1");
        assert_eq!(e.authority(), "[::1]:8080");
        assert!(Endpoint::parse("ftp://example.com").is_err());
        assert!(matches!(Endpoint::parse("not a url"), Err(Error::UrlParse(_))));
    }

    #[test]
    fn test_host_header() {
        assert_eq!(Endpoint::new("example.com", 80).host_header(), "example.com");
        assert_eq!(Endpoint::new("example.com", 8080).host_header(), "example.com:8080");
        assert_eq!(Endpoint::tunneled("example.com", 443).host_header(), "example.com");
    }
}
