//! TLS support for upstream connections
//!
//! The upgrade request can travel over TLS. The TLS layer plugs in
//! through the session operations pattern:
//!
//! 1. `TlsConfig` defines client TLS settings (versions, SNI, trust, client cert)
//! 2. `TlsSessionOps` implements the `SessionOps` trait for encrypted I/O
//! 3. Upgrade negotiation and HTTP/2 framing run unchanged on top of it
//!
//! # Examples
//!
//! ```no_run
//! use h2csmuggler::http::tls::{TlsConfig, TlsVersion};
//! use h2csmuggler::http::HttpClient;
//! use std::net::TcpStream;
//!
//! let tls_config = TlsConfig::client()
//!     .version_range(TlsVersion::Tls12, TlsVersion::Tls13)
//!     .servername("example.com")
//!     .verify_peer(false)
//!     .build()
//!     .unwrap();
//!
//! let tcp_stream = TcpStream::connect("example.com:443").unwrap();
//! let tls_session = tls_config.connect(tcp_stream).unwrap();
//! let mut client = HttpClient::new(tls_session);
//! ```

pub mod config;
pub mod session;

pub use config::{ClientConfigBuilder, TlsConfig, TlsError, TlsVersion};
pub use session::TlsSessionOps;

/// Result type for TLS operations
pub type Result<T> = std::result::Result<T, TlsError>;
