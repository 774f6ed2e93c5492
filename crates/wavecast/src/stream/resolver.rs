//! Station URI resolution
//!
//! Splits a station URI into scheme/host/port/path and builds the outbound
//! GET request. Only `http://` and `https://` are understood; anything
//! without a resolvable host is a `Parse` error.

use crate::error::{RadioError, Result};

const HTTP_PREFIX: &str = "http://";
const HTTPS_PREFIX: &str = "https://";

/// A resolved stream endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamLocation {
    pub host: String,
    pub port: u16,
    /// Request path without the leading slash; empty is allowed
    pub path: String,
    pub secure: bool,
}

impl StreamLocation {
    /// Parse a station URI.
    ///
    /// The scheme prefix is optional and case-insensitive; `https://`
    /// selects port 443 and TLS, otherwise port 80. An explicit `:port`
    /// before the first `/` overrides the default.
    pub fn parse(uri: &str) -> Result<Self> {
        let (rest, secure) = strip_scheme(uri);

        let (host_port, path) = match rest.find('/') {
            Some(slash) => (&rest[..slash], &rest[slash + 1..]),
            None => (rest, ""),
        };

        let (host, port) = match host_port.find(':') {
            Some(colon) => {
                let host = &host_port[..colon];
                let port = host_port[colon + 1..]
                    .parse::<u16>()
                    .map_err(|_| RadioError::Parse(format!("bad port in {uri:?}")))?;
                (host, port)
            }
            None => (host_port, if secure { 443 } else { 80 }),
        };

        if host.is_empty() {
            return Err(RadioError::Parse(format!("no host in {uri:?}")));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            path: path.to_string(),
            secure,
        })
    }

    /// The outbound request line, asking the origin to interleave ICY
    /// metadata into the stream.
    pub fn request(&self) -> String {
        format!(
            "GET /{} HTTP/1.1\r\nHost:{}\r\nicy-metadata:1\r\n\r\n",
            self.path, self.host
        )
    }
}

fn strip_scheme(uri: &str) -> (&str, bool) {
    // byte comparison: a matched prefix is pure ASCII, so the split is safe
    let bytes = uri.as_bytes();
    if bytes.len() >= HTTPS_PREFIX.len()
        && bytes[..HTTPS_PREFIX.len()].eq_ignore_ascii_case(HTTPS_PREFIX.as_bytes())
    {
        (&uri[HTTPS_PREFIX.len()..], true)
    } else if bytes.len() >= HTTP_PREFIX.len()
        && bytes[..HTTP_PREFIX.len()].eq_ignore_ascii_case(HTTP_PREFIX.as_bytes())
    {
        (&uri[HTTP_PREFIX.len()..], false)
    } else {
        (uri, false)
    }
}
