//! HTTP/2 client framing for h2c upgrades
//!
//! After a `101 Switching Protocols` the probe speaks raw HTTP/2 on the same
//! byte stream. This module holds everything from that point on.
//!
//! # Architecture
//!
//! - `settings`: SETTINGS parameters and the `HTTP2-Settings` upgrade token
//! - `frames`: the closed [`Frame`] enum handed to the dispatcher
//! - `codec`: frame encoding, and [`FrameReader`] which decodes frames off a
//!   [`SessionReader`](crate::http::SessionReader), strips padding and
//!   priority fields, merges CONTINUATION and runs HPACK (`hpack` crate)
//! - `handshake`: preface, initial SETTINGS and connection WINDOW_UPDATE
//! - `stream`: per-stream assembly into an [`AssembledResponse`]
//! - `client`: the read/dispatch loop
//!
//! Exactly one stream is tracked per connection. Flow control goes no further
//! than the initial windows announced during the handshake.
//!
//! # Examples
//!
//! ```no_run
//! use h2csmuggler::http::h2::{handshake, H2Client, HandshakeConfig};
//! use h2csmuggler::http::session::FdSessionOps;
//! use h2csmuggler::http::SessionReader;
//! use std::net::TcpStream;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // A connection that already answered the upgrade with 101
//! let stream = TcpStream::connect("127.0.0.1:8080")?;
//! let mut reader = SessionReader::from_ops(FdSessionOps::new(stream));
//!
//! handshake::perform(&mut reader, &HandshakeConfig::default())?;
//! let outcome = H2Client::new(reader).run()?;
//! println!("{:?}", outcome);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod error;
pub mod frames;
pub mod handshake;
pub mod settings;
pub mod stream;

pub use client::{H2Client, Outcome};
pub use codec::{FrameCodec, FrameReader};
pub use error::{Error, ErrorCode, Result};
pub use frames::{Frame, FrameFlags, FrameHeader, FrameType, HeaderField};
pub use handshake::HandshakeConfig;
pub use settings::{Settings, SettingsBuilder, SettingsParameter};
pub use stream::{AbortCause, AssembledResponse, FinalizeReason, StreamAssembler, StreamState};

/// HTTP/2 connection preface that must be sent by clients
///
/// From RFC 7540 Section 3.5:
/// "PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n"
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Size of the fixed frame header
pub const FRAME_HEADER_LEN: usize = 9;

/// Default maximum frame size (16384 bytes)
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16384;

/// Stream-level window announced in the handshake SETTINGS (4 MiB)
pub const DEFAULT_STREAM_WINDOW: u32 = 4 << 20;

/// Connection-level window increment sent after the handshake SETTINGS (1 GiB)
pub const DEFAULT_CONNECTION_WINDOW_INCREMENT: u32 = 1 << 30;

/// Largest legal flow-control window (2^31 - 1)
pub const MAX_WINDOW_SIZE: u32 = 0x7FFF_FFFF;

/// Stream ID 0 (connection-level)
pub const CONNECTION_STREAM_ID: u32 = 0;

/// Stream that carries the response to an h2c upgrade request (RFC 7540
/// Section 3.2)
pub const UPGRADE_STREAM_ID: u32 = 1;
