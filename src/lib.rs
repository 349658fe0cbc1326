//! h2csmuggler - h2c upgrade smuggling probe
//!
//! This crate drives an HTTP/1.1 `Upgrade: h2c` exchange and, once the peer
//! answers `101 Switching Protocols`, keeps talking raw HTTP/2 frames on the
//! same byte stream. The frames are reassembled into a single response that
//! can be inspected directly or handed back to an HTTP/1.1 reverse proxy.

pub mod http;
pub mod net;
pub mod smuggle;
