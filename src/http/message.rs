//! HTTP message types
//!
//! Requests and responses as they cross the HTTP/1.1 side of the probe: the
//! upgrade request sent upstream, the response read back when the upgrade is
//! refused, and the messages a proxy front end receives and relays.

use super::{Error, Headers, Result, CRLF};
use std::fmt;
use std::io::Write;
use std::str::FromStr;

macro_rules! methods {
    ($($variant:ident => $token:literal,)+) => {
        /// Request methods the probe can send or accept
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Method {
            $($variant,)+
        }

        impl Method {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Method::$variant => $token,)+
                }
            }
        }

        impl FromStr for Method {
            type Err = Error;

            /// Method tokens are case-sensitive
            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($token => Ok(Method::$variant),)+
                    _ => Err(Error::InvalidMethod(s.to_string())),
                }
            }
        }
    };
}

methods! {
    Get => "GET",
    Head => "HEAD",
    Post => "POST",
    Put => "PUT",
    Delete => "DELETE",
    Connect => "CONNECT",
    Options => "OPTIONS",
    Trace => "TRACE",
    Patch => "PATCH",
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol version of a message
///
/// `Http2` only tags responses reassembled from HTTP/2 frames; nothing in
/// the crate writes an HTTP/2 message in HTTP/1.1 syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Version {
    Http10,
    #[default]
    Http11,
    Http2,
}

impl Version {
    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
            Version::Http2 => "HTTP/2.0",
        }
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "HTTP/1.0" => Ok(Version::Http10),
            "HTTP/1.1" => Ok(Version::Http11),
            "HTTP/2.0" | "HTTP/2" => Ok(Version::Http2),
            _ => Err(Error::InvalidVersion(s.to_string())),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason phrases, sorted by code
const REASONS: &[(u16, &str)] = &[
    (100, "Continue"),
    (101, "Switching Protocols"),
    (200, "OK"),
    (201, "Created"),
    (202, "Accepted"),
    (204, "No Content"),
    (206, "Partial Content"),
    (301, "Moved Permanently"),
    (302, "Found"),
    (304, "Not Modified"),
    (307, "Temporary Redirect"),
    (308, "Permanent Redirect"),
    (400, "Bad Request"),
    (401, "Unauthorized"),
    (403, "Forbidden"),
    (404, "Not Found"),
    (405, "Method Not Allowed"),
    (408, "Request Timeout"),
    (413, "Payload Too Large"),
    (421, "Misdirected Request"),
    (426, "Upgrade Required"),
    (429, "Too Many Requests"),
    (500, "Internal Server Error"),
    (501, "Not Implemented"),
    (502, "Bad Gateway"),
    (503, "Service Unavailable"),
    (504, "Gateway Timeout"),
    (505, "HTTP Version Not Supported"),
];

/// Three-digit response status in the range 100..=599
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(u16);

impl Status {
    pub const SWITCHING_PROTOCOLS: Status = Status(101);
    pub const OK: Status = Status(200);
    pub const BAD_REQUEST: Status = Status(400);
    pub const NOT_FOUND: Status = Status(404);
    pub const BAD_GATEWAY: Status = Status(502);

    pub fn new(code: u16) -> Result<Self> {
        if (100..600).contains(&code) {
            Ok(Status(code))
        } else {
            Err(Error::InvalidStatus(code.to_string()))
        }
    }

    pub fn code(&self) -> u16 {
        self.0
    }

    /// Registered reason phrase, or "Unknown"
    pub fn reason_phrase(&self) -> &'static str {
        REASONS
            .binary_search_by_key(&self.0, |&(code, _)| code)
            .map(|i| REASONS[i].1)
            .unwrap_or("Unknown")
    }

    /// 1xx
    pub fn is_informational(&self) -> bool {
        self.0 < 200
    }

    /// Whether a response with this status never carries a body
    pub fn is_bodiless(&self) -> bool {
        self.is_informational() || self.0 == 204 || self.0 == 304
    }
}

impl FromStr for Status {
    type Err = Error;

    /// Parse the digits of a status line or an HTTP/2 `:status` value
    fn from_str(s: &str) -> Result<Self> {
        if s.len() != 3 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidStatus(s.to_string()));
        }
        s.parse::<u16>()
            .map_err(|_| Error::InvalidStatus(s.to_string()))
            .and_then(Status::new)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.0, self.reason_phrase())
    }
}

/// Serialize a start line, header block and body
fn encode(start_line: fmt::Arguments<'_>, headers: &Headers, body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128 + body.len());
    // Writes into a Vec cannot fail
    let _ = write!(buf, "{}{}", start_line, CRLF);
    for (name, value) in headers.iter() {
        let _ = write!(buf, "{}: {}{}", name, value, CRLF);
    }
    buf.extend_from_slice(CRLF.as_bytes());
    buf.extend_from_slice(body);
    buf
}

/// HTTP/1.x request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: Method,
    uri: String,
    version: Version,
    headers: Headers,
    body: Vec<u8>,
}

impl Default for HttpRequest {
    fn default() -> Self {
        HttpRequest {
            method: Method::Get,
            uri: "/".to_string(),
            version: Version::default(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }
}

impl HttpRequest {
    /// Start a `GET / HTTP/1.1` request with no headers
    pub fn builder() -> HttpRequestBuilder {
        HttpRequestBuilder {
            request: HttpRequest::default(),
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Serialize exactly as stored; framing headers are the caller's job
    pub fn to_wire(&self) -> Vec<u8> {
        encode(
            format_args!("{} {} {}", self.method, self.uri, self.version),
            &self.headers,
            &self.body,
        )
    }
}

pub struct HttpRequestBuilder {
    request: HttpRequest,
}

impl HttpRequestBuilder {
    pub fn method(mut self, method: Method) -> Self {
        self.request.method = method;
        self
    }

    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.request.uri = uri.into();
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.request.version = version;
        self
    }

    /// Set a header, replacing any earlier value of the same name
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.request.headers.insert(name, value);
        self
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.request.headers = headers;
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.request.body = body;
        self
    }

    pub fn build(self) -> HttpRequest {
        self.request
    }
}

/// HTTP response, either read off the wire or reassembled from HTTP/2 frames
#[derive(Debug, Clone)]
pub struct HttpResponse {
    version: Version,
    status: Status,
    reason: String,
    headers: Headers,
    body: Vec<u8>,
}

impl HttpResponse {
    /// Start a `200 OK` response
    pub fn builder() -> HttpResponseBuilder {
        HttpResponseBuilder {
            version: Version::default(),
            status: Status::OK,
            reason: None,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Reason phrase as received, or the registered one
    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn to_wire(&self) -> Vec<u8> {
        encode(
            format_args!("{} {} {}", self.version, self.status.code(), self.reason),
            &self.headers,
            &self.body,
        )
    }
}

pub struct HttpResponseBuilder {
    version: Version,
    status: Status,
    reason: Option<String>,
    headers: Headers,
    body: Vec<u8>,
}

impl HttpResponseBuilder {
    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    /// Override the registered reason phrase
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Set a header, replacing any earlier value of the same name
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn build(self) -> HttpResponse {
        let reason = self
            .reason
            .unwrap_or_else(|| self.status.reason_phrase().to_string());
        HttpResponse {
            version: self.version,
            status: self.status,
            reason,
            headers: self.headers,
            body: self.body,
        }
    }
}
