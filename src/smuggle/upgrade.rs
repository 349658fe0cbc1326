//! HTTP/1.1 side of the h2c upgrade
//!
//! [`UpgradeRequest`] builds the request carrying `Upgrade: h2c`,
//! `Connection: Upgrade, HTTP2-Settings` and the base64url `HTTP2-Settings`
//! payload. [`negotiate`] sends it and classifies the answer: a `101` hands
//! the connection over, with anything already buffered past the header
//! block, and anything else comes back as a complete HTTP/1.1 response.

use crate::http::h2::Settings;
use crate::http::reader::SessionReader;
use crate::http::session::SessionOps;
use crate::http::{Headers, HttpClient, HttpRequest, HttpResponse, Method, Result, Status};
use crate::http::client::ResponseHead;

/// Header names that make up the upgrade
pub const UPGRADE_HEADER_NAMES: [&str; 3] = ["Connection", "Upgrade", "HTTP2-Settings"];

/// Replace the connection-level headers of `headers` with the h2c upgrade set
pub fn apply_upgrade_headers(headers: &mut Headers, settings: &Settings) {
    headers.set("Connection", "Upgrade, HTTP2-Settings");
    headers.set("Upgrade", "h2c");
    headers.set("HTTP2-Settings", settings.to_header_value());
}

/// Builder for an h2c upgrade request
#[derive(Debug, Clone)]
pub struct UpgradeRequest {
    authority: String,
    path: String,
    method: Method,
    settings: Settings,
    headers: Headers,
    body: Vec<u8>,
}

impl UpgradeRequest {
    /// Request for `path` on `authority`, which also becomes the Host header
    pub fn new(authority: impl Into<String>, path: impl Into<String>) -> Self {
        UpgradeRequest {
            authority: authority.into(),
            path: path.into(),
            method: Method::Get,
            settings: Settings::upgrade_defaults(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Settings advertised in the `HTTP2-Settings` header
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Add an extra header
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Add extra headers, keeping the ones already set
    pub fn headers(mut self, headers: Headers) -> Self {
        for (name, value) in headers.iter() {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Build the request
    ///
    /// Extra headers cannot override Host or the upgrade headers.
    pub fn build(self) -> HttpRequest {
        let mut headers = Headers::new();
        headers.set("Host", self.authority);
        for (name, value) in self.headers.iter() {
            if !name.eq_ignore_ascii_case("Host") {
                headers.insert(name, value);
            }
        }
        apply_upgrade_headers(&mut headers, &self.settings);

        if !self.body.is_empty() {
            headers.set("Content-Length", self.body.len().to_string());
        }

        HttpRequest::builder()
            .method(self.method)
            .uri(self.path)
            .headers(headers)
            .body(self.body)
            .build()
    }
}

/// Result of the HTTP/1.1 exchange
pub enum UpgradeOutcome<S: SessionOps> {
    /// The peer refused; the whole HTTP/1.1 response was read
    NotUpgraded { response: HttpResponse },
    /// The peer switched protocols; `reader` owns the connection
    Upgraded {
        head: ResponseHead,
        reader: SessionReader<S>,
    },
}

impl<S: SessionOps> UpgradeOutcome<S> {
    pub fn is_upgraded(&self) -> bool {
        matches!(self, UpgradeOutcome::Upgraded { .. })
    }
}

/// Send the upgrade request and classify the response
///
/// Nothing HTTP/2 happens here. On `101` the body readers are never touched,
/// so bytes past the header block stay buffered for the frame reader.
pub fn negotiate<S: SessionOps>(
    mut client: HttpClient<S>,
    request: &HttpRequest,
) -> Result<UpgradeOutcome<S>> {
    client.send_request(request)?;
    let head = client.receive_head()?;

    if head.status == Status::SWITCHING_PROTOCOLS {
        if !head.headers.has_token("Upgrade", "h2c") {
            tracing::debug!(
                upgrade = head.headers.get("Upgrade").unwrap_or(""),
                "101 without Upgrade: h2c"
            );
        }
        let reader = client.into_reader();
        tracing::debug!(buffered = reader.buffered().len(), "Switching protocols");
        return Ok(UpgradeOutcome::Upgraded { head, reader });
    }

    let body = client.receive_body(&head, request.method() == Method::Head)?;
    tracing::info!(
        status = head.status.code(),
        body_len = body.len(),
        "Upgrade refused"
    );
    Ok(UpgradeOutcome::NotUpgraded {
        response: head.into_response(body),
    })
}
