//! Exchange configuration

use super::upgrade::UpgradeRequest;
use super::{Error, Result};
use crate::http::h2::{HandshakeConfig, Settings};
use crate::http::session::{CancelFlag, DEFAULT_IO_TIMEOUT};
use crate::http::tls::TlsConfig;
use crate::http::{Headers, HttpRequest, Method, DEFAULT_HTTP_PORT};
use std::time::Duration;

/// Default connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default HTTPS port, used when a TLS authority has none
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// Everything one exchange needs, built with [`ProbeConfig::builder`]
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    authority: String,
    path: String,
    method: Method,
    tls: Option<TlsConfig>,
    connect_timeout: Option<Duration>,
    io_timeout: Option<Duration>,
    upgrade_settings: Settings,
    headers: Headers,
    body: Vec<u8>,
    handshake: HandshakeConfig,
    cancel: Option<CancelFlag>,
}

impl ProbeConfig {
    /// Create a configuration builder
    pub fn builder() -> ProbeConfigBuilder {
        ProbeConfigBuilder::default()
    }

    /// Upstream `host:port`
    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn tls(&self) -> Option<&TlsConfig> {
        self.tls.as_ref()
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout
    }

    /// Settings advertised in the `HTTP2-Settings` header
    pub fn upgrade_settings(&self) -> &Settings {
        &self.upgrade_settings
    }

    /// Extra request headers
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn handshake(&self) -> &HandshakeConfig {
        &self.handshake
    }

    pub fn cancel(&self) -> Option<&CancelFlag> {
        self.cancel.as_ref()
    }

    /// The upgrade request this configuration describes
    pub fn upgrade_request(&self) -> HttpRequest {
        UpgradeRequest::new(&self.authority, &self.path)
            .method(self.method)
            .settings(self.upgrade_settings.clone())
            .headers(self.headers.clone())
            .body(self.body.clone())
            .build()
    }
}

/// Builder for [`ProbeConfig`]
#[derive(Debug)]
pub struct ProbeConfigBuilder {
    authority: Option<String>,
    path: String,
    method: Method,
    tls: Option<TlsConfig>,
    connect_timeout: Option<Duration>,
    io_timeout: Option<Duration>,
    upgrade_settings: Settings,
    headers: Headers,
    body: Vec<u8>,
    handshake: HandshakeConfig,
    cancel: Option<CancelFlag>,
}

impl Default for ProbeConfigBuilder {
    fn default() -> Self {
        ProbeConfigBuilder {
            authority: None,
            path: "/".to_string(),
            method: Method::Get,
            tls: None,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            io_timeout: Some(DEFAULT_IO_TIMEOUT),
            upgrade_settings: Settings::upgrade_defaults(),
            headers: Headers::new(),
            body: Vec::new(),
            handshake: HandshakeConfig::default(),
            cancel: None,
        }
    }
}

impl ProbeConfigBuilder {
    /// Upstream `host:port`; the port defaults to 80, or 443 with TLS
    pub fn authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = Some(authority.into());
        self
    }

    /// Request path
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Request method
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Wrap the connection in TLS
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Bound on establishing the TCP connection; `None` waits forever
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Bound on every read and write; `None` waits forever
    pub fn io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Settings advertised in the `HTTP2-Settings` upgrade header
    pub fn upgrade_settings(mut self, settings: Settings) -> Self {
        self.upgrade_settings = settings;
        self
    }

    /// Add an extra request header
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Request body
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// SETTINGS and connection window sent after the upgrade
    pub fn handshake(mut self, handshake: HandshakeConfig) -> Self {
        self.handshake = handshake;
        self
    }

    /// Flag that aborts the exchange while it waits on the peer
    pub fn cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<ProbeConfig> {
        let authority = self
            .authority
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| Error::Config("Missing upstream authority".to_string()))?;

        let default_port = if self.tls.is_some() {
            DEFAULT_HTTPS_PORT
        } else {
            DEFAULT_HTTP_PORT
        };
        let authority = with_default_port(authority.trim(), default_port);

        if !self.path.starts_with('/') {
            return Err(Error::Config(format!(
                "Request path must start with '/': {}",
                self.path
            )));
        }

        self.upgrade_settings
            .validate()
            .map_err(|e| Error::Config(format!("Upgrade settings: {}", e)))?;
        self.handshake
            .settings
            .validate()
            .map_err(|e| Error::Config(format!("Handshake settings: {}", e)))?;

        Ok(ProbeConfig {
            authority,
            path: self.path,
            method: self.method,
            tls: self.tls,
            connect_timeout: self.connect_timeout,
            io_timeout: self.io_timeout,
            upgrade_settings: self.upgrade_settings,
            headers: self.headers,
            body: self.body,
            handshake: self.handshake,
            cancel: self.cancel,
        })
    }
}

fn with_default_port(authority: &str, port: u16) -> String {
    let has_port = match authority.rfind(']') {
        Some(end) => authority[end..].contains(':'),
        None => authority.contains(':'),
    };

    if has_port {
        authority.to_string()
    } else {
        format!("{}:{}", authority, port)
    }
}
