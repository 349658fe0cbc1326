//! Sneaky reverse proxy
//!
//! Accepts plain HTTP/1.1 clients and forwards each request to a fixed
//! upstream as an h2c upgrade. Whatever the upstream answers, over HTTP/1.1
//! or smuggled HTTP/2, is written back to the client as an HTTP/1.1 response.

use super::transport::RoundTrip;
use super::upgrade::{apply_upgrade_headers, UPGRADE_HEADER_NAMES};
use super::Result;
use crate::http::h2::Settings;
use crate::http::session::{FdSessionOps, DEFAULT_IO_TIMEOUT};
use crate::http::{self, Headers, HttpRequest, HttpResponse, HttpServer, Status, Version};
use crate::net;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Headers that only concern a single hop
const HOP_BY_HOP: [&str; 8] = [
    "Keep-Alive",
    "Proxy-Connection",
    "Proxy-Authenticate",
    "Proxy-Authorization",
    "TE",
    "Trailer",
    "Transfer-Encoding",
    "Content-Length",
];

/// Remove hop-by-hop headers, including those named by `Connection`
///
/// `Content-Length` goes too; the caller sets it for the body it writes.
pub fn strip_hop_by_hop(headers: &mut Headers) {
    let named: Vec<String> = headers
        .get_all("Connection")
        .iter()
        .flat_map(|v| v.split(','))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    for name in named {
        headers.remove(&name);
    }
    for name in UPGRADE_HEADER_NAMES.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Rewrites inbound requests into h2c upgrade requests for the upstream
#[derive(Debug, Clone)]
pub struct UpgradeDirector {
    upstream: String,
    settings: Settings,
    headers: Headers,
}

impl UpgradeDirector {
    /// Director for requests going to `upstream` (`host:port`)
    pub fn new(upstream: impl Into<String>) -> Self {
        UpgradeDirector {
            upstream: upstream.into(),
            settings: Settings::upgrade_defaults(),
            headers: Headers::new(),
        }
    }

    /// Settings advertised in the `HTTP2-Settings` header
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Add a header to every forwarded request
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Rewrite `request` in place
    ///
    /// The inbound Host moves to `X-Forwarded-Host`, Host becomes the
    /// upstream, and the connection headers become the h2c upgrade set.
    pub fn direct(&self, request: &mut HttpRequest) {
        let body_len = request.body().len();
        let headers = request.headers_mut();

        let inbound_host = headers.get("Host").unwrap_or_default().to_string();
        strip_hop_by_hop(headers);

        headers.insert("X-Forwarded-Host", inbound_host);
        headers.insert("X-Origin-Host", self.upstream.as_str());
        headers.set("Host", self.upstream.as_str());
        for (name, value) in self.headers.iter() {
            headers.insert(name, value);
        }
        apply_upgrade_headers(headers, &self.settings);

        if body_len > 0 {
            headers.set("Content-Length", body_len.to_string());
        }
    }
}

/// Turn an upstream response into what the client receives
pub fn relay_response(mut response: HttpResponse) -> HttpResponse {
    response.set_version(Version::Http11);

    let body_len = response.body().len();
    let bodiless = response.status().is_bodiless();
    let headers = response.headers_mut();
    strip_hop_by_hop(headers);
    if !bodiless {
        headers.set("Content-Length", body_len.to_string());
    }
    headers.set("Connection", "close");

    response
}

/// Reverse proxy serving one request per client connection
pub struct SneakyProxy<T: RoundTrip + 'static> {
    listener: TcpListener,
    director: Arc<UpgradeDirector>,
    transport: Arc<T>,
    io_timeout: Option<Duration>,
}

impl<T: RoundTrip + 'static> SneakyProxy<T> {
    /// Listen on `addr`
    pub fn bind(addr: &str, director: UpgradeDirector, transport: T) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(net::Error::from)?;
        tracing::info!(addr = %listener.local_addr().map_err(net::Error::from)?, "Proxy listening");

        Ok(SneakyProxy {
            listener,
            director: Arc::new(director),
            transport: Arc::new(transport),
            io_timeout: Some(DEFAULT_IO_TIMEOUT),
        })
    }

    /// Bound on client reads and writes
    pub fn set_io_timeout(&mut self, timeout: Option<Duration>) {
        self.io_timeout = timeout;
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever, one thread each
    pub fn serve(&self) -> Result<()> {
        for stream in self.listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    continue;
                }
            };

            let director = Arc::clone(&self.director);
            let transport = Arc::clone(&self.transport);
            let io_timeout = self.io_timeout;
            thread::spawn(move || {
                let peer = stream.peer_addr().ok();
                if let Err(e) = handle_connection(stream, &director, transport.as_ref(), io_timeout) {
                    tracing::debug!(?peer, error = %e, "Client connection failed");
                }
            });
        }
        Ok(())
    }
}

fn handle_connection<T: RoundTrip + ?Sized>(
    stream: TcpStream,
    director: &UpgradeDirector,
    transport: &T,
    io_timeout: Option<Duration>,
) -> http::Result<()> {
    let mut server = HttpServer::new(FdSessionOps::new(stream));
    server.set_timeout(io_timeout);

    let Some(mut request) = server.receive_request()? else {
        return Ok(());
    };

    tracing::info!(method = %request.method().as_str(), uri = request.uri(), "Proxying");
    director.direct(&mut request);

    match transport.round_trip(request) {
        Ok(response) => server.send_response(&relay_response(response))?,
        Err(e) => {
            tracing::warn!(error = %e, "Upstream round trip failed");
            server.send_error(Status::BAD_GATEWAY, &format!("{}\n", e))?;
        }
    }

    server.close()
}
