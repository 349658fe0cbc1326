//! Scripted h2c upstream used by the integration tests
//!
//! An `H2Peer` plays the server side of one connection step by step: read
//! the upgrade request, answer it, read the client preface, then write
//! whatever frames the test wants.

#![allow(dead_code)]

use h2csmuggler::http::h2::{FrameCodec, Settings, CONNECTION_PREFACE, UPGRADE_STREAM_ID};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};

pub const SWITCHING_PROTOCOLS: &[u8] =
    b"HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\nUpgrade: h2c\r\n\r\n";

/// A frame as read off the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub frame_type: u8,
    pub flags: u8,
    pub stream_id: u32,
    pub payload: Vec<u8>,
}

/// Server side of one scripted connection
pub struct H2Peer<S: Read + Write> {
    pub stream: S,
    encoder: hpack::Encoder<'static>,
}

impl<S: Read + Write> H2Peer<S> {
    pub fn new(stream: S) -> Self {
        H2Peer {
            stream,
            encoder: hpack::Encoder::new(),
        }
    }

    /// Read up to and including the blank line ending the request head
    pub fn read_request_head(&mut self) -> String {
        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            let n = self.stream.read(&mut byte).unwrap();
            assert_eq!(n, 1, "client closed inside the request head");
            head.push(byte[0]);
        }
        String::from_utf8(head).unwrap()
    }

    pub fn send(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).unwrap();
        self.stream.flush().unwrap();
    }

    pub fn switch_protocols(&mut self) {
        self.send(SWITCHING_PROTOCOLS);
    }

    /// Read the client preface and return the frames that followed it
    pub fn read_client_handshake(&mut self) -> (RawFrame, RawFrame) {
        let mut preface = [0u8; 24];
        self.stream.read_exact(&mut preface).unwrap();
        assert_eq!(&preface[..], CONNECTION_PREFACE);

        let settings = self.read_frame();
        let window_update = self.read_frame();
        (settings, window_update)
    }

    pub fn read_frame(&mut self) -> RawFrame {
        let mut header = [0u8; 9];
        self.stream.read_exact(&mut header).unwrap();

        let length = u32::from_be_bytes([0, header[0], header[1], header[2]]) as usize;
        let mut payload = vec![0u8; length];
        self.stream.read_exact(&mut payload).unwrap();

        RawFrame {
            frame_type: header[3],
            flags: header[4],
            stream_id: u32::from_be_bytes([header[5], header[6], header[7], header[8]]) & 0x7fff_ffff,
            payload,
        }
    }

    /// Upgrade and consume the client handshake
    pub fn accept_upgrade(&mut self) -> String {
        let head = self.read_request_head();
        self.switch_protocols();
        self.read_client_handshake();
        head
    }

    pub fn settings(&mut self) {
        self.send(&FrameCodec::encode_settings(&Settings::upgrade_defaults()));
    }

    pub fn settings_ack(&mut self) {
        self.send(&FrameCodec::encode_settings_ack());
    }

    pub fn headers(&mut self, fields: &[(&str, &str)], end_stream: bool) {
        let block = FrameCodec::encode_header_block(&mut self.encoder, fields);
        self.send(&FrameCodec::encode_headers(UPGRADE_STREAM_ID, &block, end_stream, true, None));
    }

    pub fn data(&mut self, data: &[u8], end_stream: bool) {
        self.send(&FrameCodec::encode_data(UPGRADE_STREAM_ID, data, end_stream, None));
    }

    pub fn goaway(&mut self, error_code: u32) {
        self.send(&FrameCodec::encode_goaway(UPGRADE_STREAM_ID, error_code, b""));
    }

    pub fn rst_stream(&mut self, error_code: u32) {
        self.send(&FrameCodec::encode_rst_stream(UPGRADE_STREAM_ID, error_code));
    }

    /// Read until the client closes
    pub fn drain(&mut self) -> Vec<u8> {
        let mut rest = Vec::new();
        let _ = self.stream.read_to_end(&mut rest);
        rest
    }
}

/// Serve one connection on a loopback port with `script`
pub fn spawn_upstream<F, T>(script: F) -> (SocketAddr, JoinHandle<T>)
where
    F: FnOnce(H2Peer<TcpStream>) -> T + Send + 'static,
    T: Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        script(H2Peer::new(stream))
    });

    (addr, handle)
}

/// Settings carried in a SETTINGS frame payload
pub fn settings_entries(payload: &[u8]) -> Vec<(u16, u32)> {
    payload
        .chunks(6)
        .map(|e| {
            (
                u16::from_be_bytes([e[0], e[1]]),
                u32::from_be_bytes([e[2], e[3], e[4], e[5]]),
            )
        })
        .collect()
}
