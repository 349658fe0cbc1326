//! Client side of the HTTP/2 connection start after an h2c upgrade

use super::codec::FrameCodec;
use super::error::Result;
use super::settings::Settings;
use super::{CONNECTION_PREFACE, CONNECTION_STREAM_ID, DEFAULT_CONNECTION_WINDOW_INCREMENT};
use crate::http::reader::SessionReader;
use crate::http::session::SessionOps;

/// What the client announces right after the upgrade
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfig {
    /// Parameters of the first SETTINGS frame
    pub settings: Settings,
    /// Increment of the connection-level WINDOW_UPDATE; 0 sends none
    pub connection_window_increment: u32,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        HandshakeConfig {
            settings: Settings::handshake_defaults(),
            connection_window_increment: DEFAULT_CONNECTION_WINDOW_INCREMENT,
        }
    }
}

/// Bytes of the handshake burst: preface, SETTINGS, WINDOW_UPDATE
pub fn handshake_bytes(config: &HandshakeConfig) -> Vec<u8> {
    let mut burst = Vec::with_capacity(CONNECTION_PREFACE.len() + 64);
    burst.extend_from_slice(CONNECTION_PREFACE);
    burst.extend_from_slice(&FrameCodec::encode_settings(&config.settings));
    if config.connection_window_increment > 0 {
        burst.extend_from_slice(&FrameCodec::encode_window_update(
            CONNECTION_STREAM_ID,
            config.connection_window_increment,
        ));
    }
    burst
}

/// Write the handshake as one burst and flush it
///
/// Nothing is read here; the peer's SETTINGS is handled by the dispatcher.
pub fn perform<S: SessionOps>(reader: &mut SessionReader<S>, config: &HandshakeConfig) -> Result<()> {
    let burst = handshake_bytes(config);

    tracing::debug!(
        settings = %config.settings,
        window_increment = config.connection_window_increment,
        bytes = burst.len(),
        "Sending HTTP/2 preface"
    );

    reader.write_all(&burst)?;
    reader.flush()?;
    Ok(())
}
