//! HTTP/2 frame types and utilities
//!
//! This module defines the frame layout of RFC 7540 Section 4 and the closed
//! set of decoded frames the client dispatches on.

use super::error::{Error, ErrorCode, Result};
use super::settings::Settings;
use super::FRAME_HEADER_LEN;
use bytes::Bytes;
use std::fmt;

/// Frame types from RFC 7540 Section 6
///
/// The discriminant is the wire byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    Data = 0x0,
    Headers = 0x1,
    Priority = 0x2,
    RstStream = 0x3,
    Settings = 0x4,
    PushPromise = 0x5,
    Ping = 0x6,
    Goaway = 0x7,
    WindowUpdate = 0x8,
    Continuation = 0x9,
}

/// Indexed by wire byte
const FRAME_TYPES: [(FrameType, &str); 10] = [
    (FrameType::Data, "DATA"),
    (FrameType::Headers, "HEADERS"),
    (FrameType::Priority, "PRIORITY"),
    (FrameType::RstStream, "RST_STREAM"),
    (FrameType::Settings, "SETTINGS"),
    (FrameType::PushPromise, "PUSH_PROMISE"),
    (FrameType::Ping, "PING"),
    (FrameType::Goaway, "GOAWAY"),
    (FrameType::WindowUpdate, "WINDOW_UPDATE"),
    (FrameType::Continuation, "CONTINUATION"),
];

impl FrameType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(byte: u8) -> Option<Self> {
        FRAME_TYPES.get(byte as usize).map(|&(kind, _)| kind)
    }

    pub fn name(&self) -> &'static str {
        FRAME_TYPES[*self as usize].1
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.as_u8())
    }
}

/// Flag byte of a frame header
///
/// Bit meanings depend on the frame type, so the constants are plain bytes
/// and the accessors only make sense for the types that define them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags(u8);

impl FrameFlags {
    /// DATA, HEADERS
    pub const END_STREAM: u8 = 0x1;
    /// SETTINGS, PING
    pub const ACK: u8 = 0x1;
    /// HEADERS, PUSH_PROMISE, CONTINUATION
    pub const END_HEADERS: u8 = 0x4;
    /// DATA, HEADERS, PUSH_PROMISE
    pub const PADDED: u8 = 0x8;
    /// HEADERS
    pub const PRIORITY: u8 = 0x20;

    pub fn empty() -> Self {
        FrameFlags(0)
    }

    pub fn from_u8(flags: u8) -> Self {
        FrameFlags(flags)
    }

    pub fn as_u8(&self) -> u8 {
        self.0
    }

    pub fn set(&mut self, flag: u8) {
        self.0 |= flag;
    }

    pub fn is_set(&self, flag: u8) -> bool {
        self.0 & flag == flag
    }

    pub fn is_end_stream(&self) -> bool {
        self.is_set(Self::END_STREAM)
    }

    pub fn is_ack(&self) -> bool {
        self.is_set(Self::ACK)
    }

    pub fn is_end_headers(&self) -> bool {
        self.is_set(Self::END_HEADERS)
    }

    pub fn is_padded(&self) -> bool {
        self.is_set(Self::PADDED)
    }

    pub fn is_priority(&self) -> bool {
        self.is_set(Self::PRIORITY)
    }
}

/// The fixed 9-byte frame header (RFC 7540 Section 4.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Payload length (24 bits)
    pub length: u32,
    /// Raw frame type; unknown types are kept
    pub frame_type: u8,
    /// Frame flags
    pub flags: FrameFlags,
    /// Stream ID with the reserved bit cleared
    pub stream_id: u32,
}

impl FrameHeader {
    /// Parse a frame header
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < FRAME_HEADER_LEN {
            return Err(Error::FrameSize(format!(
                "Frame header needs {} bytes, got {}",
                FRAME_HEADER_LEN,
                buf.len()
            )));
        }

        Ok(FrameHeader {
            length: u32::from_be_bytes([0, buf[0], buf[1], buf[2]]),
            frame_type: buf[3],
            flags: FrameFlags::from_u8(buf[4]),
            stream_id: u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]) & 0x7FFF_FFFF,
        })
    }

    /// Append the encoded header to `buf`
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.length.to_be_bytes()[1..]);
        buf.push(self.frame_type);
        buf.push(self.flags.as_u8());
        buf.extend_from_slice(&(self.stream_id & 0x7FFF_FFFF).to_be_bytes());
    }

    /// Known frame type, if any
    pub fn kind(&self) -> Option<FrameType> {
        FrameType::from_u8(self.frame_type)
    }
}

/// A decoded header field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: String,
    pub value: String,
}

impl HeaderField {
    /// Create a header field
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        HeaderField {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Whether this is a pseudo-header such as `:status`
    pub fn is_pseudo(&self) -> bool {
        self.name.starts_with(':')
    }
}

/// HEADERS frame (RFC 7540 Section 6.2), with any CONTINUATION merged in
#[derive(Debug, Clone)]
pub struct HeadersFrame {
    /// Stream ID
    pub stream_id: u32,
    /// Decoded header block
    pub fields: Vec<HeaderField>,
    /// END_STREAM flag
    pub end_stream: bool,
}

impl HeadersFrame {
    /// Value of a pseudo-header, without the leading colon
    pub fn pseudo_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name.strip_prefix(':') == Some(name))
            .map(|f| f.value.as_str())
    }

    /// Fields that are not pseudo-headers
    pub fn regular_fields(&self) -> impl Iterator<Item = &HeaderField> {
        self.fields.iter().filter(|f| !f.is_pseudo())
    }
}

/// DATA frame (RFC 7540 Section 6.1), padding removed
#[derive(Debug, Clone)]
pub struct DataFrame {
    /// Stream ID
    pub stream_id: u32,
    /// Data payload
    pub data: Bytes,
    /// END_STREAM flag
    pub end_stream: bool,
}

/// SETTINGS frame (RFC 7540 Section 6.5)
#[derive(Debug, Clone)]
pub struct SettingsFrame {
    /// ACK flag
    pub ack: bool,
    /// Settings parameters
    pub settings: Settings,
}

/// WINDOW_UPDATE frame (RFC 7540 Section 6.9)
#[derive(Debug, Clone, Copy)]
pub struct WindowUpdateFrame {
    /// Stream ID (0 for connection-level)
    pub stream_id: u32,
    /// Window size increment
    pub size_increment: u32,
}

/// GOAWAY frame (RFC 7540 Section 6.8)
#[derive(Debug, Clone)]
pub struct GoawayFrame {
    /// Last stream ID
    pub last_stream_id: u32,
    /// Raw error code
    pub error_code: u32,
    /// Debug data
    pub debug_data: Bytes,
}

/// RST_STREAM frame (RFC 7540 Section 6.4)
#[derive(Debug, Clone, Copy)]
pub struct RstStreamFrame {
    /// Stream ID
    pub stream_id: u32,
    /// Raw error code
    pub error_code: u32,
}

/// PUSH_PROMISE frame (RFC 7540 Section 6.6)
#[derive(Debug, Clone)]
pub struct PushPromiseFrame {
    /// Stream ID
    pub stream_id: u32,
    /// Promised stream ID
    pub promised_stream_id: u32,
    /// Decoded request header block
    pub fields: Vec<HeaderField>,
}

/// PING frame (RFC 7540 Section 6.7)
#[derive(Debug, Clone, Copy)]
pub struct PingFrame {
    /// ACK flag
    pub ack: bool,
    /// Opaque data (8 bytes)
    pub data: [u8; 8],
}

/// Any frame the client does not handle, PRIORITY and stray CONTINUATION
/// included
#[derive(Debug, Clone)]
pub struct UnknownFrame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

/// A decoded frame
#[derive(Debug, Clone)]
pub enum Frame {
    Headers(HeadersFrame),
    Data(DataFrame),
    Settings(SettingsFrame),
    WindowUpdate(WindowUpdateFrame),
    GoAway(GoawayFrame),
    RstStream(RstStreamFrame),
    PushPromise(PushPromiseFrame),
    Ping(PingFrame),
    Unknown(UnknownFrame),
}

impl Frame {
    /// Stream the frame belongs to (0 for connection-level frames)
    pub fn stream_id(&self) -> u32 {
        match self {
            Frame::Headers(f) => f.stream_id,
            Frame::Data(f) => f.stream_id,
            Frame::Settings(_) | Frame::Ping(_) | Frame::GoAway(_) => 0,
            Frame::WindowUpdate(f) => f.stream_id,
            Frame::RstStream(f) => f.stream_id,
            Frame::PushPromise(f) => f.stream_id,
            Frame::Unknown(f) => f.header.stream_id,
        }
    }

    /// Frame type name
    pub fn name(&self) -> &'static str {
        match self {
            Frame::Headers(_) => FrameType::Headers.name(),
            Frame::Data(_) => FrameType::Data.name(),
            Frame::Settings(_) => FrameType::Settings.name(),
            Frame::WindowUpdate(_) => FrameType::WindowUpdate.name(),
            Frame::GoAway(_) => FrameType::Goaway.name(),
            Frame::RstStream(_) => FrameType::RstStream.name(),
            Frame::PushPromise(_) => FrameType::PushPromise.name(),
            Frame::Ping(_) => FrameType::Ping.name(),
            Frame::Unknown(f) => f.header.kind().map_or("UNKNOWN", |kind| kind.name()),
        }
    }

    /// Whether the frame carries END_STREAM
    pub fn is_end_stream(&self) -> bool {
        match self {
            Frame::Headers(f) => f.end_stream,
            Frame::Data(f) => f.end_stream,
            _ => false,
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stream={}", self.name(), self.stream_id())?;
        match self {
            Frame::Headers(h) => write!(f, " fields={} end_stream={}", h.fields.len(), h.end_stream),
            Frame::Data(d) => write!(f, " len={} end_stream={}", d.data.len(), d.end_stream),
            Frame::Settings(s) if s.ack => write!(f, " ack"),
            Frame::Settings(s) => write!(f, " [{}]", s.settings),
            Frame::WindowUpdate(w) => write!(f, " increment={}", w.size_increment),
            Frame::GoAway(g) => write!(
                f,
                " last_stream={} error={}",
                g.last_stream_id,
                ErrorCode::from(g.error_code)
            ),
            Frame::RstStream(r) => write!(f, " error={}", ErrorCode::from(r.error_code)),
            Frame::PushPromise(p) => write!(f, " promised={}", p.promised_stream_id),
            Frame::Ping(p) => write!(f, " ack={}", p.ack),
            Frame::Unknown(u) => write!(
                f,
                " type=0x{:x} flags=0x{:x} len={}",
                u.header.frame_type,
                u.header.flags.as_u8(),
                u.payload.len()
            ),
        }
    }
}
