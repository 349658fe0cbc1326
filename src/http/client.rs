//! HTTP/1.1 client
//!
//! The client sends one request and reads the response head separately from
//! its body. That split is what the upgrade needs: after a `101` the body
//! readers are never touched and the connection moves on to HTTP/2 framing.

use super::parser::{content_length, is_chunked, parse_status_line, read_headers};
use super::reader::SessionReader;
use super::session::{HttpSession, SessionOps};
use super::{chunked, Error, Headers, HttpRequest, HttpResponse, Result, Status, Version};
use std::time::Duration;

/// Largest response body the client buffers
pub const MAX_BODY_LEN: usize = 16 * 1024 * 1024;

/// Status line and headers of a response
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub version: Version,
    pub status: Status,
    pub reason: String,
    pub headers: Headers,
}

impl ResponseHead {
    /// Combine the head with a body into a full response
    pub fn into_response(self, body: Vec<u8>) -> HttpResponse {
        HttpResponse::builder()
            .version(self.version)
            .status(self.status)
            .reason(self.reason)
            .headers(self.headers)
            .body(body)
            .build()
    }
}

/// HTTP client
///
/// Provides methods for sending requests and receiving responses.
pub struct HttpClient<S: SessionOps> {
    reader: SessionReader<S>,
}

impl<S: SessionOps> HttpClient<S> {
    /// Create a new HTTP client with a session
    pub fn new(session: S) -> Self {
        HttpClient {
            reader: SessionReader::new(HttpSession::new(session)),
        }
    }

    /// Create a client over an existing reader, keeping its buffered bytes
    pub fn from_reader(reader: SessionReader<S>) -> Self {
        HttpClient { reader }
    }

    /// Set the timeout for operations
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.reader.session_mut().set_timeout(timeout);
    }

    /// Send an HTTP request
    pub fn send_request(&mut self, request: &HttpRequest) -> Result<()> {
        self.reader.write_all(&request.to_wire())?;
        self.reader.flush()
    }

    /// Receive the status line and headers
    ///
    /// Bytes after the blank line stay buffered in the reader.
    pub fn receive_head(&mut self) -> Result<ResponseHead> {
        let line = self.reader.read_line()?;
        let (version, status, reason) = parse_status_line(&line)?;
        let headers = read_headers(&mut self.reader)?;

        Ok(ResponseHead {
            version,
            status,
            reason,
            headers,
        })
    }

    /// Receive the body belonging to `head`
    ///
    /// Chunked coding wins over Content-Length. Without either, the body runs
    /// to EOF. Responses to HEAD and bodiless statuses read nothing.
    pub fn receive_body(&mut self, head: &ResponseHead, is_head_request: bool) -> Result<Vec<u8>> {
        if is_head_request || head.status.is_bodiless() {
            return Ok(Vec::new());
        }

        if is_chunked(&head.headers) {
            return Ok(chunked::read_chunked_body(&mut self.reader, MAX_BODY_LEN)?.to_vec());
        }

        match content_length(&head.headers)? {
            Some(len) if len > MAX_BODY_LEN => return Err(Error::TooLarge(MAX_BODY_LEN)),
            Some(len) => return Ok(self.reader.read_exact(len)?.to_vec()),
            None => {}
        }

        Ok(self.reader.read_to_end(MAX_BODY_LEN)?.to_vec())
    }

    /// Receive a complete response
    pub fn receive_response(&mut self, is_head_request: bool) -> Result<HttpResponse> {
        let head = self.receive_head()?;
        let body = self.receive_body(&head, is_head_request)?;
        Ok(head.into_response(body))
    }

    /// Get a reference to the underlying reader
    pub fn reader(&self) -> &SessionReader<S> {
        &self.reader
    }

    /// Give up the client, keeping the connection and anything buffered
    pub fn into_reader(self) -> SessionReader<S> {
        self.reader
    }

    /// Close the connection
    pub fn close(&mut self) -> Result<()> {
        self.reader.close()
    }
}
