//! Station and access-point list records
//!
//! Both lists are `\r\n`-delimited text. Station records are raw URIs;
//! access-point records are `ssid/password`. Indices are 1-based. Station
//! lookup wraps past the end back to the first record; access-point lookup
//! reports exhaustion instead, which is what sends the controller into
//! provisioning mode.

use crate::error::{RadioError, Result};

/// One WiFi credential record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApCredential {
    pub ssid: String,
    pub password: String,
}

fn records(text: &str) -> impl Iterator<Item = &str> {
    text.split("\r\n").filter(|r| !r.is_empty())
}

/// Look up the station at a 1-based `index`.
///
/// An index past the last record wraps to the first; the effective index is
/// returned alongside the record so the controller's cursor stays honest.
/// An empty list is a configuration error.
pub fn station_record(text: &str, index: usize) -> Result<(String, usize)> {
    let mut first = None;
    for (n, record) in records(text).enumerate() {
        let n = n + 1;
        if first.is_none() {
            first = Some(record);
        }
        if n == index {
            return Ok((record.to_string(), n));
        }
    }
    match first {
        Some(record) => Ok((record.to_string(), 1)),
        None => Err(RadioError::Config("station list is empty".into())),
    }
}

/// Number of non-empty records in a list
pub fn record_count(text: &str) -> usize {
    records(text).count()
}

/// Look up the access-point credential at a 1-based `index`.
///
/// Returns `None` once the index has walked off the end of the list. A
/// record without the `/` separator is a configuration error.
pub fn ap_record(text: &str, index: usize) -> Result<Option<ApCredential>> {
    let Some(record) = records(text).nth(index.saturating_sub(1)) else {
        return Ok(None);
    };
    let slash = record.find('/').ok_or_else(|| {
        RadioError::Config(format!("access-point record {index} has no ssid/password separator"))
    })?;
    Ok(Some(ApCredential {
        ssid: record[..slash].to_string(),
        password: record[slash + 1..].to_string(),
    }))
}
