//! HTTP/2 settings management
//!
//! This module implements HTTP/2 SETTINGS parameters as defined in RFC 7540
//! Section 6.5, and the `HTTP2-Settings` upgrade header token of Section
//! 3.2.1.
//!
//! Parameters keep the order they were set in. The wire payload is written in
//! that order, so a settings value round-trips to the exact bytes a peer sent.

use super::error::{Error, Result};
use base64::prelude::*;
use std::fmt;

/// Size of one identifier/value pair on the wire
pub const SETTING_ENTRY_LEN: usize = 6;

/// Registered SETTINGS identifiers (RFC 7540 Section 6.5.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SettingsParameter {
    HeaderTableSize = 0x1,
    EnablePush = 0x2,
    MaxConcurrentStreams = 0x3,
    InitialWindowSize = 0x4,
    MaxFrameSize = 0x5,
    MaxHeaderListSize = 0x6,
}

/// Indexed by identifier minus one
const PARAMETERS: [(SettingsParameter, &str); 6] = [
    (SettingsParameter::HeaderTableSize, "HEADER_TABLE_SIZE"),
    (SettingsParameter::EnablePush, "ENABLE_PUSH"),
    (SettingsParameter::MaxConcurrentStreams, "MAX_CONCURRENT_STREAMS"),
    (SettingsParameter::InitialWindowSize, "INITIAL_WINDOW_SIZE"),
    (SettingsParameter::MaxFrameSize, "MAX_FRAME_SIZE"),
    (SettingsParameter::MaxHeaderListSize, "MAX_HEADER_LIST_SIZE"),
];

impl SettingsParameter {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(value: u16) -> Option<Self> {
        let index = usize::from(value).checked_sub(1)?;
        PARAMETERS.get(index).map(|&(param, _)| param)
    }

    pub fn name(&self) -> &'static str {
        PARAMETERS[*self as usize - 1].1
    }
}

impl fmt::Display for SettingsParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.as_u16())
    }
}

/// HTTP/2 settings
///
/// An ordered list of (identifier, value) pairs. Identifiers this crate does
/// not know are kept as-is so logging and re-encoding stay faithful.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    params: Vec<(u16, u32)>,
}

impl Settings {
    /// Create empty settings
    pub fn new() -> Self {
        Settings { params: Vec::new() }
    }

    /// Create a settings builder
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::new()
    }

    /// Settings advertised in the `HTTP2-Settings` upgrade header by default:
    /// MAX_CONCURRENT_STREAMS 100, INITIAL_WINDOW_SIZE 1 GiB, ENABLE_PUSH 0
    pub fn upgrade_defaults() -> Self {
        let mut settings = Settings::new();
        settings.set(SettingsParameter::MaxConcurrentStreams.as_u16(), 100);
        settings.set(SettingsParameter::InitialWindowSize.as_u16(), 1 << 30);
        settings.set(SettingsParameter::EnablePush.as_u16(), 0);
        settings
    }

    /// Settings sent in the first SETTINGS frame after the preface by
    /// default: ENABLE_PUSH 0, INITIAL_WINDOW_SIZE 4 MiB
    pub fn handshake_defaults() -> Self {
        let mut settings = Settings::new();
        settings.set(SettingsParameter::EnablePush.as_u16(), 0);
        settings.set(
            SettingsParameter::InitialWindowSize.as_u16(),
            super::DEFAULT_STREAM_WINDOW,
        );
        settings
    }

    /// Set a parameter, replacing an earlier value in place
    pub fn set(&mut self, id: u16, value: u32) {
        match self.params.iter_mut().find(|(existing, _)| *existing == id) {
            Some(entry) => entry.1 = value,
            None => self.params.push((id, value)),
        }
    }

    /// Get a parameter value
    pub fn get(&self, param: SettingsParameter) -> Option<u32> {
        let id = param.as_u16();
        self.params
            .iter()
            .find(|(existing, _)| *existing == id)
            .map(|(_, value)| *value)
    }

    /// Iterate over (identifier, value) pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (u16, u32)> + '_ {
        self.params.iter().copied()
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Check if no parameter is set
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Validate settings values
    pub fn validate(&self) -> Result<()> {
        if let Some(enable_push) = self.get(SettingsParameter::EnablePush) {
            if enable_push > 1 {
                return Err(Error::InvalidSettings(format!(
                    "ENABLE_PUSH must be 0 or 1, got {}",
                    enable_push
                )));
            }
        }

        if let Some(initial_window_size) = self.get(SettingsParameter::InitialWindowSize) {
            if initial_window_size > super::MAX_WINDOW_SIZE {
                return Err(Error::InvalidSettings(format!(
                    "Initial window size {} exceeds maximum (2^31-1)",
                    initial_window_size
                )));
            }
        }

        if let Some(max_frame_size) = self.get(SettingsParameter::MaxFrameSize) {
            if !(16384..=16777215).contains(&max_frame_size) {
                return Err(Error::InvalidSettings(format!(
                    "Max frame size {} outside valid range (16384-16777215)",
                    max_frame_size
                )));
            }
        }

        Ok(())
    }

    /// Encode as a SETTINGS frame payload
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.params.len() * SETTING_ENTRY_LEN);
        for (id, value) in &self.params {
            buf.extend_from_slice(&id.to_be_bytes());
            buf.extend_from_slice(&value.to_be_bytes());
        }
        buf
    }

    /// Decode a SETTINGS frame payload
    pub fn parse_payload(payload: &[u8]) -> Result<Self> {
        if payload.len() % SETTING_ENTRY_LEN != 0 {
            return Err(Error::FrameSize(format!(
                "SETTINGS payload length {} is not a multiple of {}",
                payload.len(),
                SETTING_ENTRY_LEN
            )));
        }

        let mut settings = Settings::new();
        for entry in payload.chunks_exact(SETTING_ENTRY_LEN) {
            let id = u16::from_be_bytes([entry[0], entry[1]]);
            let value = u32::from_be_bytes([entry[2], entry[3], entry[4], entry[5]]);
            settings.set(id, value);
        }
        Ok(settings)
    }

    /// Value for the `HTTP2-Settings` header: base64url without padding
    pub fn to_header_value(&self) -> String {
        BASE64_URL_SAFE_NO_PAD.encode(self.encode_payload())
    }

    /// Decode an `HTTP2-Settings` header value
    ///
    /// Trailing padding is tolerated.
    pub fn from_header_value(value: &str) -> Result<Self> {
        let bytes = BASE64_URL_SAFE_NO_PAD
            .decode(value.trim().trim_end_matches('='))
            .map_err(|e| Error::InvalidSettings(format!("Bad HTTP2-Settings token: {}", e)))?;
        Self::parse_payload(&bytes)
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (id, value) in &self.params {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            match SettingsParameter::from_u16(*id) {
                Some(param) => write!(f, "{}={}", param.name(), value)?,
                None => write!(f, "0x{:x}={}", id, value)?,
            }
        }
        Ok(())
    }
}

/// Builder for HTTP/2 settings
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    /// Create a new settings builder
    pub fn new() -> Self {
        SettingsBuilder {
            settings: Settings::new(),
        }
    }

    fn param(mut self, param: SettingsParameter, value: u32) -> Self {
        self.settings.set(param.as_u16(), value);
        self
    }

    /// Set header table size
    pub fn header_table_size(self, size: u32) -> Self {
        self.param(SettingsParameter::HeaderTableSize, size)
    }

    /// Set enable push
    pub fn enable_push(self, enable: bool) -> Self {
        self.param(SettingsParameter::EnablePush, enable as u32)
    }

    /// Set max concurrent streams
    pub fn max_concurrent_streams(self, max: u32) -> Self {
        self.param(SettingsParameter::MaxConcurrentStreams, max)
    }

    /// Set initial window size
    pub fn initial_window_size(self, size: u32) -> Self {
        self.param(SettingsParameter::InitialWindowSize, size)
    }

    /// Set max frame size
    pub fn max_frame_size(self, size: u32) -> Self {
        self.param(SettingsParameter::MaxFrameSize, size)
    }

    /// Set max header list size
    pub fn max_header_list_size(self, size: u32) -> Self {
        self.param(SettingsParameter::MaxHeaderListSize, size)
    }

    /// Build the settings
    pub fn build(self) -> Result<Settings> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}
