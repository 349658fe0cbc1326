//! HTTP/1.1 server side
//!
//! Used by the proxy front end to accept plain HTTP/1.1 requests and write
//! relayed responses back.

use super::parser::{content_length, is_chunked, parse_request_line, read_headers};
use super::reader::SessionReader;
use super::session::{HttpSession, SessionOps};
use super::{chunked, Error, HttpRequest, HttpResponse, Result, Status};
use std::time::Duration;

/// Largest request body the server buffers
pub const MAX_REQUEST_BODY_LEN: usize = 16 * 1024 * 1024;

/// HTTP server
///
/// Provides methods for receiving requests and sending responses.
pub struct HttpServer<S: SessionOps> {
    reader: SessionReader<S>,
}

impl<S: SessionOps> HttpServer<S> {
    /// Create a new HTTP server with a session
    pub fn new(session: S) -> Self {
        HttpServer {
            reader: SessionReader::new(HttpSession::new(session)),
        }
    }

    /// Set the timeout for operations
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.reader.session_mut().set_timeout(timeout);
    }

    /// Receive the next request with its body
    ///
    /// Returns `Ok(None)` when the peer closed cleanly between requests.
    pub fn receive_request(&mut self) -> Result<Option<HttpRequest>> {
        let line = match self.reader.read_line() {
            Ok(line) => line,
            Err(Error::ConnectionClosed) if self.reader.buffered().is_empty() => return Ok(None),
            Err(e) => return Err(e),
        };

        let (method, uri, version) = parse_request_line(&line)?;
        let headers = read_headers(&mut self.reader)?;

        let body = if is_chunked(&headers) {
            chunked::read_chunked_body(&mut self.reader, MAX_REQUEST_BODY_LEN)?.to_vec()
        } else {
            match content_length(&headers)? {
                Some(len) if len > MAX_REQUEST_BODY_LEN => {
                    return Err(Error::TooLarge(MAX_REQUEST_BODY_LEN))
                }
                Some(len) => self.reader.read_exact(len)?.to_vec(),
                None => Vec::new(),
            }
        };

        Ok(Some(
            HttpRequest::builder()
                .method(method)
                .uri(uri)
                .version(version)
                .headers(headers)
                .body(body)
                .build(),
        ))
    }

    /// Send an HTTP response
    pub fn send_response(&mut self, response: &HttpResponse) -> Result<()> {
        self.reader.write_all(&response.to_wire())?;
        self.reader.flush()
    }

    /// Send a plain-text error response
    pub fn send_error(&mut self, status: Status, message: &str) -> Result<()> {
        let response = HttpResponse::builder()
            .status(status)
            .header("Content-Type", "text/plain; charset=utf-8")
            .header("Content-Length", message.len().to_string())
            .body(message.as_bytes().to_vec())
            .build();

        self.send_response(&response)
    }

    /// Close the connection
    pub fn close(&mut self) -> Result<()> {
        self.reader.close()
    }
}
