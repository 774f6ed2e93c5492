//! HTTP response header parsing
//!
//! Parses the status line and the headers the streaming pipeline cares
//! about: redirects (`Location:`) and the ICY fields. All malformed input
//! is reported as a recoverable `Protocol` error; the controller rotates to
//! the next station instead of halting.

use crate::error::{RadioError, Result};

/// Status codes treated as redirects
const REDIRECT_STATUSES: [u16; 6] = [201, 301, 302, 303, 307, 308];

/// Parsed response header block
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: u16,
    /// Redirect target; set only for redirect statuses
    pub location: Option<String>,
    /// True when the next location must come from the station list
    pub use_list: bool,
    /// Audio bytes between metadata blocks; 0 = no metadata interleaving
    pub icy_metaint: usize,
    pub station_name: Option<String>,
    pub content_type: Option<String>,
    pub bitrate: Option<u32>,
}

impl ResponseHead {
    pub fn is_redirect(&self) -> bool {
        REDIRECT_STATUSES.contains(&self.status)
    }
}

/// Parse a complete header block (terminated by the blank line).
///
/// The status line must begin with `HTTP/1.0` or `HTTP/1.1` followed by a
/// nonzero numeric status code. Redirect statuses require a `Location:`
/// header; its value keeps everything up to the line end, minus one
/// optional leading space.
pub fn parse_response(raw: &[u8]) -> Result<ResponseHead> {
    let text = String::from_utf8_lossy(raw);

    if !(text.starts_with("HTTP/1.0") || text.starts_with("HTTP/1.1")) {
        return Err(RadioError::Protocol("unsupported HTTP version".into()));
    }
    let status = parse_status(&text["HTTP/1.0".len()..])?;

    let mut head = ResponseHead {
        status,
        location: None,
        use_list: true,
        icy_metaint: header_value(&text, "icy-metaint")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0),
        station_name: header_value(&text, "icy-name").map(|v| v.trim().to_string()),
        content_type: header_value(&text, "content-type").map(|v| v.trim().to_string()),
        bitrate: header_value(&text, "icy-br").and_then(|v| v.trim().parse().ok()),
    };

    if head.is_redirect() {
        let value = header_value(&text, "Location")
            .ok_or_else(|| RadioError::Protocol(format!("redirect {status} without Location")))?;
        let value = value.strip_prefix(' ').unwrap_or(value);
        head.location = Some(value.to_string());
        head.use_list = false;
    }
    Ok(head)
}

/// Extract `icy-metaint` from a raw header block; 0 when absent
pub fn icy_metaint(raw: &[u8]) -> usize {
    let text = String::from_utf8_lossy(raw);
    header_value(&text, "icy-metaint")
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

fn parse_status(after_version: &str) -> Result<u16> {
    let rest = after_version.trim_start_matches(' ');
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    let status: u16 = digits
        .parse()
        .map_err(|_| RadioError::Protocol("non-numeric status code".into()))?;
    if status == 0 {
        return Err(RadioError::Protocol("zero status code".into()));
    }
    Ok(status)
}

/// Case-insensitive lookup of a header value, excluding the status line.
/// Returns the raw value text after the colon, untrimmed.
fn header_value<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    for line in text.split("\r\n").skip(1) {
        let Some(prefix) = line.get(..name.len()) else {
            continue;
        };
        if prefix.eq_ignore_ascii_case(name) && line[name.len()..].starts_with(':') {
            return Some(&line[name.len() + 1..]);
        }
    }
    None
}
