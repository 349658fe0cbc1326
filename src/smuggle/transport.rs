//! Request in, response out

use super::config::ProbeConfig;
use super::exchange::{Exchange, ExchangeResult};
use super::Result;
use crate::http::{HttpRequest, HttpResponse};

/// Set on responses whose HTTP/2 stream was cut short; carries the reason
pub const PARTIAL_HEADER: &str = "X-Smuggle-Partial";

/// Something that turns one request into one response
///
/// Implementations are shared between proxy connection threads.
pub trait RoundTrip: Send + Sync {
    fn round_trip(&self, request: HttpRequest) -> Result<HttpResponse>;
}

impl<F> RoundTrip for F
where
    F: Fn(HttpRequest) -> Result<HttpResponse> + Send + Sync,
{
    fn round_trip(&self, request: HttpRequest) -> Result<HttpResponse> {
        self(request)
    }
}

/// Round trip through an h2c upgrade on a fresh upstream connection
///
/// A refused upgrade yields the upstream's HTTP/1.1 response unmodified. An
/// upgraded one yields the reassembled HTTP/2 response, which may be partial
/// when the upstream sent GOAWAY or RST_STREAM mid-stream. Partial responses
/// carry [`PARTIAL_HEADER`] so they cannot pass for complete ones.
#[derive(Debug, Clone)]
pub struct SmuggleTransport {
    config: ProbeConfig,
}

impl SmuggleTransport {
    pub fn new(config: ProbeConfig) -> Self {
        SmuggleTransport { config }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Like [`RoundTrip::round_trip`], keeping which protocol answered
    pub fn exchange(&self, request: &HttpRequest) -> Result<ExchangeResult> {
        Exchange::new(self.config.clone()).send(request)
    }
}

impl RoundTrip for SmuggleTransport {
    fn round_trip(&self, request: HttpRequest) -> Result<HttpResponse> {
        let result = self.exchange(&request)?;
        let partial = match &result {
            ExchangeResult::Http2(response) if response.is_partial() => {
                Some(response.reason().to_string())
            }
            _ => None,
        };

        let mut response = result.into_http_response();
        if let Some(reason) = partial {
            tracing::warn!(
                uri = request.uri(),
                status = response.status().code(),
                %reason,
                "Relaying partial response"
            );
            response.headers_mut().set(PARTIAL_HEADER, reason);
        }
        Ok(response)
    }
}
