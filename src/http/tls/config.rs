//! TLS configuration
//!
//! Client-side only: the upstream connection is wrapped in TLS before
//! the upgrade request is sent.

use openssl::error::ErrorStack;
use openssl::ssl::{SslContext, SslContextBuilder, SslFiletype, SslMethod, SslVerifyMode, SslVersion};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Protocol versions that can bound a handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    Tls10,
    Tls11,
    Tls12,
    Tls13,
}

impl TlsVersion {
    fn openssl(self) -> SslVersion {
        match self {
            TlsVersion::Tls10 => SslVersion::TLS1,
            TlsVersion::Tls11 => SslVersion::TLS1_1,
            TlsVersion::Tls12 => SslVersion::TLS1_2,
            TlsVersion::Tls13 => SslVersion::TLS1_3,
        }
    }
}

impl FromStr for TlsVersion {
    type Err = TlsError;

    /// Accepts `TLSv1.2`, `tls1.2` and the like; `TLSv1` means 1.0
    fn from_str(s: &str) -> Result<Self, TlsError> {
        let lower = s.to_ascii_lowercase();
        let number = lower
            .strip_prefix("tlsv")
            .or_else(|| lower.strip_prefix("tls"))
            .ok_or_else(|| TlsError::InvalidVersion(s.to_string()))?;
        match number {
            "1" | "1.0" => Ok(TlsVersion::Tls10),
            "1.1" => Ok(TlsVersion::Tls11),
            "1.2" => Ok(TlsVersion::Tls12),
            "1.3" => Ok(TlsVersion::Tls13),
            _ => Err(TlsError::InvalidVersion(s.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] ErrorStack),

    #[error("Invalid TLS version: {0}")]
    InvalidVersion(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unreadable CA, certificate or key file
    #[error("{path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: ErrorStack,
    },

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),
}

/// Built client context plus the per-connection SNI name
#[derive(Clone)]
pub struct TlsConfig {
    pub(crate) ctx: SslContext,
    pub(crate) servername: Option<String>,
    verify_peer: bool,
}

impl TlsConfig {
    pub fn client() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// SNI name sent during the handshake, if any
    pub fn servername(&self) -> Option<&str> {
        self.servername.as_deref()
    }

    pub fn verifies_peer(&self) -> bool {
        self.verify_peer
    }

    /// Run the client handshake over `stream`
    pub fn connect(&self, stream: TcpStream) -> Result<super::TlsSessionOps, TlsError> {
        super::session::TlsSessionOps::connect(stream, self)
    }
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("servername", &self.servername)
            .field("verify_peer", &self.verify_peer)
            .finish_non_exhaustive()
    }
}

/// Collects client settings; nothing touches OpenSSL until `build`
///
/// Peer verification is off unless enabled, since upstreams under test are
/// usually self-signed.
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    versions: Option<(TlsVersion, TlsVersion)>,
    alpn: Vec<String>,
    servername: Option<String>,
    verify_peer: bool,
    ca_file: Option<PathBuf>,
    cert_file: Option<PathBuf>,
    key_file: Option<PathBuf>,
}

impl ClientConfigBuilder {
    /// Pin a single protocol version
    pub fn version(self, version: TlsVersion) -> Self {
        self.version_range(version, version)
    }

    pub fn version_range(mut self, min: TlsVersion, max: TlsVersion) -> Self {
        self.versions = Some((min, max));
        self
    }

    /// Protocols offered through ALPN, most preferred first
    pub fn alpn(mut self, protocols: &[&str]) -> Self {
        self.alpn = protocols.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn servername(mut self, name: impl Into<String>) -> Self {
        self.servername = Some(name.into());
        self
    }

    pub fn verify_peer(mut self, verify: bool) -> Self {
        self.verify_peer = verify;
        self
    }

    /// Trust the CA certificates in a PEM file
    pub fn ca_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.ca_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Present a client certificate chain from a PEM file
    pub fn cert_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.cert_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Private key for the client certificate
    ///
    /// Defaults to the certificate file, which may hold both.
    pub fn key_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.key_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn build(self) -> Result<TlsConfig, TlsError> {
        if let Some((min, max)) = self.versions {
            if min > max {
                return Err(TlsError::InvalidConfig(format!(
                    "Minimum version {:?} is above maximum {:?}",
                    min, max
                )));
            }
        }
        if self.key_file.is_some() && self.cert_file.is_none() {
            return Err(TlsError::InvalidConfig(
                "Key file given without a certificate".to_string(),
            ));
        }

        let mut ctx = SslContextBuilder::new(SslMethod::tls_client())?;
        ctx.set_verify(if self.verify_peer {
            SslVerifyMode::PEER
        } else {
            SslVerifyMode::NONE
        });

        if let Some((min, max)) = self.versions {
            ctx.set_min_proto_version(Some(min.openssl()))?;
            ctx.set_max_proto_version(Some(max.openssl()))?;
        }
        if !self.alpn.is_empty() {
            ctx.set_alpn_protos(&encode_alpn(&self.alpn)?)?;
        }
        if let Some(ca) = &self.ca_file {
            ctx.set_ca_file(ca).map_err(|source| file_error(ca, source))?;
        }
        if let Some(cert) = &self.cert_file {
            let key = self.key_file.as_ref().unwrap_or(cert);
            ctx.set_certificate_chain_file(cert)
                .map_err(|source| file_error(cert, source))?;
            ctx.set_private_key_file(key, SslFiletype::PEM)
                .map_err(|source| file_error(key, source))?;
            ctx.check_private_key().map_err(|e| {
                TlsError::InvalidConfig(format!("Key does not match certificate: {}", e))
            })?;
        }

        Ok(TlsConfig {
            ctx: ctx.build(),
            servername: self.servername,
            verify_peer: self.verify_peer,
        })
    }
}

fn file_error(path: &Path, source: ErrorStack) -> TlsError {
    TlsError::File {
        path: path.to_path_buf(),
        source,
    }
}

/// Wire format of the ALPN extension: each name prefixed by its length
fn encode_alpn(protocols: &[String]) -> Result<Vec<u8>, TlsError> {
    let mut wire = Vec::new();
    for proto in protocols {
        let len = u8::try_from(proto.len())
            .ok()
            .filter(|&len| len > 0)
            .ok_or_else(|| TlsError::InvalidConfig(format!("Bad ALPN protocol {:?}", proto)))?;
        wire.push(len);
        wire.extend_from_slice(proto.as_bytes());
    }
    Ok(wire)
}
