//! Transport capability traits
//!
//! The controller drives the network through these traits so that the core
//! compiles once and each target supplies a thin adapter: a WiFi radio on
//! the appliance, plain OS sockets on a host (see `net::HostTransport`),
//! scripted mocks in tests.

use std::time::Duration;

use crate::control::lists::ApCredential;
use crate::error::Result;

/// Result of one non-blocking receive
#[derive(Debug, PartialEq, Eq)]
pub enum RecvOutcome {
    /// `n` bytes were written into the caller's buffer
    Data(usize),
    /// Nothing available yet; poll again after a short sleep
    WouldBlock,
    /// The peer closed the connection
    Closed,
}

/// One open stream connection. Dropping the value closes it.
pub trait Connection {
    fn send(&mut self, data: &[u8]) -> Result<()>;
    fn recv(&mut self, buf: &mut [u8]) -> Result<RecvOutcome>;
}

/// Network access: the WiFi link plus outbound stream connections.
pub trait Transport {
    type Conn: Connection;

    /// Attempt to join an access point, waiting up to `timeout` for an IP.
    /// `Ok(false)` is a plain timeout; `Err` is a radio-level failure.
    fn join(&mut self, credential: &ApCredential, timeout: Duration) -> Result<bool>;

    /// Whether the link is still up. A drop forces the controller back to
    /// `NotConnected` from any state.
    fn link_up(&self) -> bool;

    /// Broadcast an open access point for provisioning
    fn start_access_point(&mut self, ssid: &str) -> Result<()>;

    /// Open a TCP (or TLS when `secure`) connection to the origin
    fn connect(&mut self, host: &str, port: u16, secure: bool) -> Result<Self::Conn>;
}
