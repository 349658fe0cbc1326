//! HTTP plumbing for the h2c probe
//!
//! This module provides the HTTP/1.1 client and server pieces used around the
//! upgrade, the raw HTTP/2 framing layer used after it, and the TLS transport.
//!
//! # Architecture
//!
//! The HTTP layer uses a session operations abstraction pattern that allows
//! seamless switching between plain TCP, TLS and in-memory connections:
//!
//! - `SessionOps` trait defines operations (poll, read, write, flush, close)
//! - `HttpSession` applies the per-operation deadline and cancellation
//! - `SessionReader` adds buffered line and exact reads on top of a session
//! - All HTTP I/O code is transparent to the underlying transport
//!
//! # Examples
//!
//! ```no_run
//! use h2csmuggler::http::{HttpClient, HttpRequest, Method};
//! use h2csmuggler::http::session::FdSessionOps;
//! use std::net::TcpStream;
//!
//! let stream = TcpStream::connect("127.0.0.1:8080").unwrap();
//! let mut client = HttpClient::new(FdSessionOps::new(stream));
//!
//! let request = HttpRequest::builder()
//!     .method(Method::Get)
//!     .uri("/")
//!     .header("Host", "localhost")
//!     .build();
//! client.send_request(&request).unwrap();
//!
//! let head = client.receive_head().unwrap();
//! assert_eq!(head.status.code(), 200);
//! ```

pub mod chunked;
pub mod client;
pub mod h2;
pub mod headers;
pub mod message;
pub mod parser;
pub mod reader;
pub mod server;
pub mod session;
pub mod tls;

pub use client::{HttpClient, ResponseHead};
pub use headers::{canonical_header_key, Headers};
pub use message::{HttpRequest, HttpResponse, Method, Status, Version};
pub use reader::SessionReader;
pub use server::HttpServer;
pub use session::{BufferSession, CancelFlag, HttpSession, SessionOps};

pub type Result<T> = std::result::Result<T, Error>;

/// Failures of the HTTP/1.1 layer and of the session below it
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed start line or framing
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid HTTP version: {0}")]
    InvalidVersion(String),

    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("Invalid HTTP status: {0}")]
    InvalidStatus(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(String),

    /// A line or body ran past its byte limit
    #[error("Message exceeds {0} bytes")]
    TooLarge(usize),

    #[error("More than {0} header lines")]
    TooManyHeaders(usize),

    /// The session deadline passed while waiting for the peer
    #[error("Timed out waiting for the peer")]
    Timeout,

    /// The exchange's cancel flag was raised
    #[error("Cancelled")]
    Cancelled,

    /// EOF where more bytes were required
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Longest accepted request/status/header line
pub const MAX_LINE_LEN: usize = 8192;

/// Default HTTP port
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// CRLF line ending
pub const CRLF: &str = "\r\n";
