//! OpenSSL-backed transport

use super::config::{TlsConfig, TlsError};
use crate::http::session::{poll_fd, PollEvents, SessionOps};
use crate::http::{Error, Result as HttpResult};
use openssl::ssl::{Ssl, SslStream};
use std::io::{Read, Write};
use std::net::{IpAddr, Shutdown, TcpStream};
use std::os::fd::AsRawFd;
use std::time::Duration;

/// Client side of a TLS connection
///
/// Skips the close_notify exchange on close once an I/O error was seen.
pub struct TlsSessionOps {
    stream: SslStream<TcpStream>,
    failed: bool,
}

impl TlsSessionOps {
    /// Run the client handshake; SNI is set when the config names a server
    ///
    /// With peer verification on, the certificate must also match that name.
    pub fn connect(tcp_stream: TcpStream, config: &TlsConfig) -> Result<Self, TlsError> {
        let mut ssl = Ssl::new(&config.ctx)?;

        if let Some(ref servername) = config.servername {
            ssl.set_hostname(servername)?;
            // Chain checks alone accept any name the CA vouches for
            if config.verifies_peer() {
                match servername.parse::<IpAddr>() {
                    Ok(ip) => ssl.param_mut().set_ip(ip)?,
                    Err(_) => ssl.param_mut().set_host(servername)?,
                }
            }
        }

        // The handshake runs in blocking mode
        let stream = ssl
            .connect(tcp_stream)
            .map_err(|e| TlsError::HandshakeFailed(e.to_string()))?;

        tracing::debug!(
            version = stream.ssl().version_str(),
            cipher = stream.ssl().current_cipher().map(|c| c.name()),
            "TLS handshake complete"
        );

        Ok(TlsSessionOps {
            stream,
            failed: false,
        })
    }

    /// Negotiated protocol version, e.g. `TLSv1.3`
    pub fn version(&self) -> &'static str {
        self.stream.ssl().version_str()
    }

    /// Negotiated ALPN protocol, if any
    pub fn alpn_protocol(&self) -> Option<&[u8]> {
        self.stream.ssl().selected_alpn_protocol()
    }

    fn fail(&mut self, e: std::io::Error) -> Error {
        self.failed = true;
        Error::Io(e)
    }
}

impl SessionOps for TlsSessionOps {
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> HttpResult<bool> {
        // Decrypted bytes already held by OpenSSL never show up on the socket
        if events == PollEvents::Read && self.stream.ssl().pending() > 0 {
            return Ok(true);
        }

        poll_fd(self.stream.get_ref().as_raw_fd(), events, timeout)
    }

    fn read(&mut self, buf: &mut [u8]) -> HttpResult<usize> {
        match self.stream.read(buf) {
            Ok(n) => Ok(n),
            // A peer that closes without close_notify is treated as EOF
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(0),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn write(&mut self, buf: &[u8]) -> HttpResult<usize> {
        self.stream.write(buf).map_err(|e| self.fail(e))
    }

    fn flush(&mut self) -> HttpResult<()> {
        self.stream.flush().map_err(|e| self.fail(e))
    }

    fn close(&mut self) -> HttpResult<()> {
        if !self.failed {
            let _ = self.stream.shutdown();
        }

        match self.stream.get_mut().shutdown(Shutdown::Both) {
            Err(e) if e.kind() != std::io::ErrorKind::NotConnected => Err(Error::from(e)),
            _ => Ok(()),
        }
    }
}
