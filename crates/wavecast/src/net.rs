//! Host transport adapter
//!
//! Implements the `Transport` capability over `std::net::TcpStream`, with
//! rustls for `https://` stations. On a hosted OS the WiFi link is managed
//! by the system, so `join` reports immediate success and `link_up` is
//! always true; provisioning mode is not available here.
//!
//! Certificate verification is intentionally disabled: the appliance
//! carries no CA bundle and accepts whatever chain the origin presents,
//! which this adapter reproduces.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::{Arc, Once};
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, ClientConnection, DigitallySignedStruct, SignatureScheme, StreamOwned};

use crate::config::network::{CONNECT_TIMEOUT_SECS, RECV_POLL_TIMEOUT_MS};
use crate::control::lists::ApCredential;
use crate::error::{RadioError, Result};
use crate::transport::{Connection, RecvOutcome, Transport};

/// Ensures the rustls CryptoProvider is installed exactly once.
fn ensure_crypto_provider() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = rustls::crypto::CryptoProvider::install_default(
            rustls::crypto::aws_lc_rs::default_provider(),
        );
    });
}

/// Accepts any server certificate, like the firmware's verify-optional TLS
#[derive(Debug)]
struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::CryptoProvider::get_default()
            .map(|p| p.signature_verification_algorithms.supported_schemes())
            .unwrap_or_default()
    }
}

/// A plain or TLS stream connection
pub enum HostConn {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl HostConn {
    fn map_recv(res: std::io::Result<usize>) -> Result<RecvOutcome> {
        match res {
            Ok(0) => Ok(RecvOutcome::Closed),
            Ok(n) => Ok(RecvOutcome::Data(n)),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Ok(RecvOutcome::WouldBlock)
            }
            Err(e) => Err(RadioError::Transport(format!("recv failed: {e}"))),
        }
    }
}

impl Connection for HostConn {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        let res = match self {
            HostConn::Plain(s) => s.write_all(data),
            HostConn::Tls(s) => s.write_all(data),
        };
        res.map_err(|e| RadioError::Transport(format!("send failed: {e}")))
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<RecvOutcome> {
        match self {
            HostConn::Plain(s) => Self::map_recv(s.read(buf)),
            HostConn::Tls(s) => Self::map_recv(s.read(buf)),
        }
    }
}

/// `Transport` over OS sockets
pub struct HostTransport;

impl HostTransport {
    pub fn new() -> Self {
        ensure_crypto_provider();
        Self
    }

    fn tcp_connect(host: &str, port: u16) -> Result<TcpStream> {
        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|e| RadioError::Transport(format!("resolve {host}: {e}")))?;
        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, Duration::from_secs(CONNECT_TIMEOUT_SECS)) {
                Ok(stream) => {
                    stream
                        .set_read_timeout(Some(Duration::from_millis(RECV_POLL_TIMEOUT_MS)))
                        .map_err(|e| RadioError::Transport(format!("socket setup: {e}")))?;
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(RadioError::Transport(match last_err {
            Some(e) => format!("connect {host}:{port}: {e}"),
            None => format!("no addresses for {host}"),
        }))
    }
}

impl Default for HostTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HostTransport {
    type Conn = HostConn;

    fn join(&mut self, credential: &ApCredential, _timeout: Duration) -> Result<bool> {
        // The OS owns the link; any configured credential "joins".
        tracing::debug!(ssid = %credential.ssid, "host link already up");
        Ok(true)
    }

    fn link_up(&self) -> bool {
        true
    }

    fn start_access_point(&mut self, _ssid: &str) -> Result<()> {
        Err(RadioError::Transport(
            "provisioning access point not available on host".into(),
        ))
    }

    fn connect(&mut self, host: &str, port: u16, secure: bool) -> Result<HostConn> {
        let stream = Self::tcp_connect(host, port)?;
        if !secure {
            tracing::debug!(host, port, "tcp connected");
            return Ok(HostConn::Plain(stream));
        }

        let config = ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
            .with_no_client_auth();
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| RadioError::Transport(format!("bad server name {host}: {e}")))?;
        let conn = ClientConnection::new(Arc::new(config), server_name)
            .map_err(|e| RadioError::Transport(format!("tls setup: {e}")))?;

        // Drive the handshake under the connect timeout; the short poll
        // timeout is for streaming reads only and would starve it.
        let mut tls = StreamOwned::new(conn, stream);
        tls.sock
            .set_read_timeout(Some(Duration::from_secs(CONNECT_TIMEOUT_SECS)))
            .map_err(|e| RadioError::Transport(format!("socket setup: {e}")))?;
        while tls.conn.is_handshaking() {
            tls.conn
                .complete_io(&mut tls.sock)
                .map_err(|e| RadioError::Transport(format!("tls handshake: {e}")))?;
        }
        tls.sock
            .set_read_timeout(Some(Duration::from_millis(RECV_POLL_TIMEOUT_MS)))
            .map_err(|e| RadioError::Transport(format!("socket setup: {e}")))?;
        tracing::debug!(host, port, "tls connected");
        Ok(HostConn::Tls(Box::new(tls)))
    }
}
