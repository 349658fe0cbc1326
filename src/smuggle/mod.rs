//! h2c upgrade smuggling
//!
//! An exchange starts as plain HTTP/1.1 with an `Upgrade: h2c` request. When
//! the peer answers `101 Switching Protocols` the same connection continues
//! as raw HTTP/2: the client sends the preface and its SETTINGS, reads frames
//! and assembles the response to the upgraded request on stream 1. Any other
//! answer is passed through untouched.
//!
//! # Architecture
//!
//! ```text
//! upgrade::negotiate -> h2::handshake::perform -> h2::H2Client::run
//!        |                                              |
//!        +--> NotUpgraded (HTTP/1.1 response)           +--> AssembledResponse
//! ```
//!
//! [`Exchange`] drives those steps for one connection and tracks its
//! [`ConnectionPhase`]. [`SmuggleTransport`] wraps an exchange behind the
//! [`RoundTrip`] trait and [`SneakyProxy`] serves it to HTTP/1.1 clients.
//!
//! # Examples
//!
//! ```no_run
//! use h2csmuggler::smuggle::{Exchange, ExchangeResult, ProbeConfig};
//!
//! let config = ProbeConfig::builder()
//!     .authority("localhost:61001")
//!     .path("/flag")
//!     .build()
//!     .unwrap();
//!
//! match Exchange::new(config).run().unwrap() {
//!     ExchangeResult::Http2(response) => println!("smuggled: {}", response.status().code()),
//!     ExchangeResult::Http1(response) => println!("refused: {}", response.status().code()),
//! }
//! ```

pub mod config;
pub mod exchange;
pub mod proxy;
pub mod transport;
pub mod upgrade;

pub use config::{ProbeConfig, ProbeConfigBuilder};
pub use exchange::{Exchange, ExchangeResult};
pub use proxy::{SneakyProxy, UpgradeDirector};
pub use transport::{RoundTrip, SmuggleTransport, PARTIAL_HEADER};
pub use upgrade::{UpgradeOutcome, UpgradeRequest};

use crate::http;
use crate::http::h2::{self, AbortCause, StreamState};
use crate::http::tls::TlsError;
use crate::net;
use std::fmt;

/// Result type for smuggling exchanges
pub type Result<T> = std::result::Result<T, Error>;

/// Exchange errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Upgrade negotiation failed: {0}")]
    Negotiation(#[source] http::Error),

    #[error("Writing the HTTP/2 handshake failed: {0}")]
    HandshakeWrite(#[source] h2::Error),

    #[error("Frame decode failed: {0}")]
    FrameDecode(#[source] h2::Error),

    #[error("Connection aborted before any response: {0}")]
    ConnectionAborted(AbortCause),

    #[error("Connection closed before the stream ended after {frames_read} frames")]
    StreamIncomplete {
        frames_read: usize,
        partial: Option<Box<StreamState>>,
    },

    #[error("Network error: {0}")]
    Net(#[from] net::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Where a connection stands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionPhase {
    #[default]
    PlainHttp1,
    UpgradeRequested,
    Http2Handshaking,
    Http2Active,
    Closed,
    Failed,
}

impl ConnectionPhase {
    fn rank(self) -> u8 {
        match self {
            ConnectionPhase::PlainHttp1 => 0,
            ConnectionPhase::UpgradeRequested => 1,
            ConnectionPhase::Http2Handshaking => 2,
            ConnectionPhase::Http2Active => 3,
            ConnectionPhase::Closed | ConnectionPhase::Failed => 4,
        }
    }

    /// Whether no further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionPhase::Closed | ConnectionPhase::Failed)
    }

    /// Whether `next` may follow this phase
    ///
    /// Phases only move forward. `Failed` is reachable from every
    /// non-terminal phase.
    pub fn can_advance_to(self, next: ConnectionPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == ConnectionPhase::Failed || next.rank() > self.rank()
    }
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionPhase::PlainHttp1 => "plain-http1",
            ConnectionPhase::UpgradeRequested => "upgrade-requested",
            ConnectionPhase::Http2Handshaking => "http2-handshaking",
            ConnectionPhase::Http2Active => "http2-active",
            ConnectionPhase::Closed => "closed",
            ConnectionPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}
