//! Stream assembly
//!
//! Collects the HEADERS and DATA of the single response stream into one
//! [`AssembledResponse`]. Nothing is handed out until the stream is
//! finalized, either because the peer ended it or because the connection was
//! torn down first.

use super::error::{Error, ErrorCode, Result};
use super::frames::HeaderField;
use crate::http::{Headers, HttpResponse, Status, Version};
use bytes::{Bytes, BytesMut};
use std::fmt;

/// Why a stream stopped before END_STREAM
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortCause {
    /// The peer sent GOAWAY
    GoAway { last_stream_id: u32, error_code: u32 },
    /// The peer reset a stream
    RstStream { stream_id: u32, error_code: u32 },
    /// The local side cancelled the exchange
    Cancelled,
}

impl fmt::Display for AbortCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortCause::GoAway {
                last_stream_id,
                error_code,
            } => write!(
                f,
                "GOAWAY (last stream {}, {})",
                last_stream_id,
                ErrorCode::from(*error_code)
            ),
            AbortCause::RstStream {
                stream_id,
                error_code,
            } => write!(
                f,
                "RST_STREAM on stream {} ({})",
                stream_id,
                ErrorCode::from(*error_code)
            ),
            AbortCause::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// How a stream was finalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeReason {
    /// END_STREAM arrived; the response is complete
    StreamEnded,
    /// The stream was cut short; the response holds what arrived so far
    ConnectionAborted(AbortCause),
}

impl fmt::Display for FinalizeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalizeReason::StreamEnded => write!(f, "stream ended"),
            FinalizeReason::ConnectionAborted(cause) => write!(f, "connection aborted: {}", cause),
        }
    }
}

/// Accumulated state of one stream
#[derive(Debug, Clone)]
pub struct StreamState {
    stream_id: u32,
    status: Status,
    headers: Headers,
    body: BytesMut,
    ended: bool,
}

impl StreamState {
    /// Stream ID
    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    /// Status taken from `:status`
    pub fn status(&self) -> Status {
        self.status
    }

    /// Headers collected so far
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Body bytes collected so far
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Whether END_STREAM was seen
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    fn fold_fields<'a>(&mut self, fields: impl Iterator<Item = &'a HeaderField>) {
        for field in fields {
            self.headers.insert(&field.name, field.value.clone());
        }
    }
}

/// A response rebuilt from an HTTP/2 stream
#[derive(Debug, Clone)]
pub struct AssembledResponse {
    stream_id: u32,
    status: Status,
    headers: Headers,
    body: Bytes,
    reason: FinalizeReason,
}

impl AssembledResponse {
    /// Protocol tag of every assembled response
    pub const PROTO: &'static str = "HTTP/2.0";

    /// Protocol version
    pub fn version(&self) -> Version {
        Version::Http2
    }

    /// Stream the response arrived on
    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    /// Response status
    pub fn status(&self) -> Status {
        self.status
    }

    /// Response headers with canonical names
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Response body
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// How the stream was finalized
    pub fn reason(&self) -> &FinalizeReason {
        &self.reason
    }

    /// Whether the stream was cut short
    pub fn is_partial(&self) -> bool {
        self.reason != FinalizeReason::StreamEnded
    }

    /// Convert to an HTTP response tagged HTTP/2.0
    pub fn into_http_response(self) -> HttpResponse {
        HttpResponse::builder()
            .version(Version::Http2)
            .status(self.status)
            .headers(self.headers)
            .body(self.body.to_vec())
            .build()
    }
}

/// Builds the response of a single stream
///
/// The first HEADERS opens the stream and must carry exactly one `:status`.
/// Interim 1xx heads are dropped. Later HEADERS on the same stream are
/// trailers and fold into the header map.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    stream: Option<StreamState>,
    finalized: bool,
}

impl StreamAssembler {
    /// Create an assembler with no stream
    pub fn new() -> Self {
        StreamAssembler::default()
    }

    /// The stream being assembled, if HEADERS arrived
    pub fn stream(&self) -> Option<&StreamState> {
        self.stream.as_ref()
    }

    /// ID of the stream being assembled
    pub fn active_stream_id(&self) -> Option<u32> {
        self.stream.as_ref().map(|s| s.stream_id)
    }

    /// Whether `finalize` already produced a response
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Apply a decoded HEADERS block; returns whether the stream ended
    pub fn on_headers(&mut self, stream_id: u32, fields: &[HeaderField], end_stream: bool) -> Result<bool> {
        self.check_open()?;

        let mut statuses = fields.iter().filter(|f| f.name == ":status");
        let status = statuses.next();
        if statuses.next().is_some() {
            return Err(Error::Protocol(format!(
                "Repeated :status on stream {}",
                stream_id
            )));
        }
        let regular = fields.iter().filter(|f| !f.is_pseudo());

        match &mut self.stream {
            None => {
                let Some(status) = status else {
                    return Err(Error::Protocol(format!(
                        "First HEADERS on stream {} lacks :status",
                        stream_id
                    )));
                };
                let status = parse_status(&status.value)?;

                if status.is_informational() && !end_stream {
                    tracing::debug!(stream_id, status = status.code(), "Skipping interim response");
                    return Ok(false);
                }

                let mut state = StreamState {
                    stream_id,
                    status,
                    headers: Headers::new(),
                    body: BytesMut::new(),
                    ended: end_stream,
                };
                state.fold_fields(regular);
                self.stream = Some(state);
            }
            Some(state) => {
                Self::check_stream(state, stream_id)?;
                if status.is_some() {
                    return Err(Error::Protocol(format!(
                        ":status in trailers on stream {}",
                        stream_id
                    )));
                }
                state.fold_fields(regular);
                state.ended |= end_stream;
            }
        }

        Ok(end_stream)
    }

    /// Append a DATA payload; returns whether the stream ended
    pub fn on_data(&mut self, stream_id: u32, data: &[u8], end_stream: bool) -> Result<bool> {
        self.check_open()?;

        let Some(state) = &mut self.stream else {
            return Err(Error::Protocol(format!(
                "DATA on stream {} before HEADERS",
                stream_id
            )));
        };
        Self::check_stream(state, stream_id)?;

        state.body.extend_from_slice(data);
        state.ended |= end_stream;
        Ok(end_stream)
    }

    /// Freeze the stream into a response
    ///
    /// Returns `Ok(None)` if no HEADERS ever arrived. A stream is finalized
    /// at most once.
    pub fn finalize(&mut self, stream_id: u32, reason: FinalizeReason) -> Result<Option<AssembledResponse>> {
        self.check_open()?;

        let Some(state) = self.stream.take() else {
            return Ok(None);
        };
        if state.stream_id != stream_id {
            let active = state.stream_id;
            self.stream = Some(state);
            return Err(Error::Protocol(format!(
                "Cannot finalize stream {}, active stream is {}",
                stream_id, active
            )));
        }
        if reason == FinalizeReason::StreamEnded && !state.ended {
            let id = state.stream_id;
            self.stream = Some(state);
            return Err(Error::Protocol(format!(
                "Stream {} finalized as ended before END_STREAM",
                id
            )));
        }

        self.finalized = true;
        Ok(Some(AssembledResponse {
            stream_id: state.stream_id,
            status: state.status,
            headers: state.headers,
            body: state.body.freeze(),
            reason,
        }))
    }

    fn check_open(&self) -> Result<()> {
        if self.finalized {
            return Err(Error::Protocol("Stream already finalized".to_string()));
        }
        Ok(())
    }

    fn check_stream(state: &StreamState, stream_id: u32) -> Result<()> {
        if state.stream_id != stream_id {
            return Err(Error::Protocol(format!(
                "Frame for stream {} while stream {} is active",
                stream_id, state.stream_id
            )));
        }
        if state.ended {
            return Err(Error::Protocol(format!(
                "Frame for stream {} after END_STREAM",
                stream_id
            )));
        }
        Ok(())
    }
}

fn parse_status(value: &str) -> Result<Status> {
    value
        .parse::<Status>()
        .map_err(|_| Error::InvalidHeader(format!("Bad :status {:?}", value)))
}
