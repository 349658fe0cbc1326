//! HTTP/2 errors

use std::fmt;

/// Failures on the HTTP/2 side of an upgraded connection
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport failure, deadline or cancellation below the framing layer
    #[error(transparent)]
    Http(#[from] crate::http::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Length field disagrees with the frame type or the size limit
    #[error("Frame size error: {0}")]
    FrameSize(String),

    /// HPACK block could not be decoded
    #[error("Compression error: {0}")]
    Compression(String),

    /// A frame type the client does not handle
    #[error("Unsupported frame {kind} on stream {stream_id}")]
    UnsupportedFrame { kind: String, stream_id: u32 },

    #[error("Invalid settings value: {0}")]
    InvalidSettings(String),

    /// Pseudo-header missing, malformed or out of place
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
}

/// Error code carried by GOAWAY and RST_STREAM
///
/// Peers may send codes outside the registered range, so any `u32` is a
/// valid value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub u32);

const NAMES: [&str; 14] = [
    "NO_ERROR",
    "PROTOCOL_ERROR",
    "INTERNAL_ERROR",
    "FLOW_CONTROL_ERROR",
    "SETTINGS_TIMEOUT",
    "STREAM_CLOSED",
    "FRAME_SIZE_ERROR",
    "REFUSED_STREAM",
    "CANCEL",
    "COMPRESSION_ERROR",
    "CONNECT_ERROR",
    "ENHANCE_YOUR_CALM",
    "INADEQUATE_SECURITY",
    "HTTP_1_1_REQUIRED",
];

impl ErrorCode {
    pub const NO_ERROR: ErrorCode = ErrorCode(0x0);
    pub const CANCEL: ErrorCode = ErrorCode(0x8);

    /// Registered name, if the code has one
    pub fn name(self) -> Option<&'static str> {
        NAMES.get(self.0 as usize).copied()
    }
}

impl From<u32> for ErrorCode {
    fn from(code: u32) -> Self {
        ErrorCode(code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name().unwrap_or("UNKNOWN"), self.0)
    }
}

/// Result type for HTTP/2 operations
pub type Result<T> = std::result::Result<T, Error>;
