//! One upgrade exchange over one connection

use super::config::ProbeConfig;
use super::upgrade::{self, UpgradeOutcome};
use super::{ConnectionPhase, Error, Result};
use crate::http::h2::{handshake, AssembledResponse, H2Client, Outcome};
use crate::http::reader::SessionReader;
use crate::http::session::{FdSessionOps, HttpSession, SessionOps};
use crate::http::{HttpClient, HttpRequest, HttpResponse, Status};
use crate::net;

/// What the upstream answered
#[derive(Debug, Clone)]
pub enum ExchangeResult {
    /// The upgrade was refused; the HTTP/1.1 response as received
    Http1(HttpResponse),
    /// The response reassembled from HTTP/2 frames, possibly partial
    Http2(AssembledResponse),
}

impl ExchangeResult {
    pub fn status(&self) -> Status {
        match self {
            ExchangeResult::Http1(response) => response.status(),
            ExchangeResult::Http2(response) => response.status(),
        }
    }

    /// Whether the connection was upgraded
    pub fn is_upgraded(&self) -> bool {
        matches!(self, ExchangeResult::Http2(_))
    }

    /// Whether the HTTP/2 stream was cut short by GOAWAY, RST_STREAM or
    /// cancellation
    pub fn is_partial(&self) -> bool {
        match self {
            ExchangeResult::Http1(_) => false,
            ExchangeResult::Http2(response) => response.is_partial(),
        }
    }

    /// Convert to a plain response
    pub fn into_http_response(self) -> HttpResponse {
        match self {
            ExchangeResult::Http1(response) => response,
            ExchangeResult::Http2(response) => response.into_http_response(),
        }
    }
}

/// Upgrade exchange
///
/// Owns the configuration and the phase of a single connection. Each call to
/// [`run`](Exchange::run) or [`send`](Exchange::send) dials a fresh
/// connection; an `Exchange` is meant to be used once.
#[derive(Debug)]
pub struct Exchange {
    config: ProbeConfig,
    phase: ConnectionPhase,
    frames_read: usize,
}

impl Exchange {
    pub fn new(config: ProbeConfig) -> Self {
        Exchange {
            config,
            phase: ConnectionPhase::default(),
            frames_read: 0,
        }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Current connection phase
    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// HTTP/2 frames read after the upgrade
    pub fn frames_read(&self) -> usize {
        self.frames_read
    }

    /// Send the configured upgrade request
    pub fn run(&mut self) -> Result<ExchangeResult> {
        let request = self.config.upgrade_request();
        self.send(&request)
    }

    /// Dial the upstream and send `request`
    ///
    /// The request is sent as is; it should already carry the upgrade
    /// headers.
    pub fn send(&mut self, request: &HttpRequest) -> Result<ExchangeResult> {
        let stream = match net::dial(self.config.authority(), self.config.connect_timeout()) {
            Ok(stream) => stream,
            Err(e) => {
                self.advance(ConnectionPhase::Failed);
                return Err(e.into());
            }
        };

        match self.config.tls() {
            Some(tls) => match tls.connect(stream) {
                Ok(ops) => {
                    tracing::debug!(
                        version = ops.version(),
                        alpn = ?ops.alpn_protocol().map(String::from_utf8_lossy),
                        "TLS established"
                    );
                    self.run_over(ops, request)
                }
                Err(e) => {
                    self.advance(ConnectionPhase::Failed);
                    Err(e.into())
                }
            },
            None => self.run_over(FdSessionOps::new(stream), request),
        }
    }

    /// Run the exchange over an already established connection
    pub fn run_over<S: SessionOps>(&mut self, ops: S, request: &HttpRequest) -> Result<ExchangeResult> {
        let result = self.drive(ops, request);
        if let Err(e) = &result {
            tracing::debug!(phase = %self.phase, error = %e, "Exchange failed");
            self.advance(ConnectionPhase::Failed);
        }
        result
    }

    fn drive<S: SessionOps>(&mut self, ops: S, request: &HttpRequest) -> Result<ExchangeResult> {
        let mut session = HttpSession::new(ops);
        session.set_timeout(self.config.io_timeout());
        session.set_cancel(self.config.cancel().cloned());
        let client = HttpClient::from_reader(SessionReader::new(session));

        tracing::info!(
            authority = self.config.authority(),
            uri = request.uri(),
            tls = self.config.tls().is_some(),
            "Requesting h2c upgrade"
        );
        self.advance(ConnectionPhase::UpgradeRequested);

        let mut reader = match upgrade::negotiate(client, request).map_err(Error::Negotiation)? {
            UpgradeOutcome::NotUpgraded { response } => {
                self.advance(ConnectionPhase::Closed);
                return Ok(ExchangeResult::Http1(response));
            }
            UpgradeOutcome::Upgraded { reader, .. } => reader,
        };

        tracing::info!("Upgraded to h2c");
        self.advance(ConnectionPhase::Http2Handshaking);
        handshake::perform(&mut reader, self.config.handshake()).map_err(Error::HandshakeWrite)?;
        self.advance(ConnectionPhase::Http2Active);

        let mut client = H2Client::new(reader);
        let outcome = client.run();
        self.frames_read = client.frames_read();

        match outcome.map_err(Error::FrameDecode)? {
            Outcome::Response(response) => {
                let mut reader = client.into_reader();
                if let Err(e) = reader.close() {
                    tracing::debug!(error = %e, "Close after response failed");
                }
                self.advance(ConnectionPhase::Closed);
                tracing::info!(
                    status = response.status().code(),
                    body_len = response.body().len(),
                    reason = %response.reason(),
                    "Smuggled response"
                );
                Ok(ExchangeResult::Http2(response))
            }
            Outcome::Aborted(cause) => Err(Error::ConnectionAborted(cause)),
            Outcome::Incomplete(partial) => Err(Error::StreamIncomplete {
                frames_read: self.frames_read,
                partial: partial.map(Box::new),
            }),
        }
    }

    fn advance(&mut self, next: ConnectionPhase) {
        if !self.phase.can_advance_to(next) {
            tracing::debug!(from = %self.phase, to = %next, "Ignoring phase transition");
            return;
        }
        tracing::debug!(from = %self.phase, to = %next, "Phase");
        self.phase = next;
    }
}
